use crate::models::{CastMember, MediaItem};
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Home,
    Trending,
    Search,
    Random,
    Favorites,
    About,
}

impl FromStr for Tab {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "home" => Ok(Tab::Home),
            "trending" => Ok(Tab::Trending),
            "search" => Ok(Tab::Search),
            "random" => Ok(Tab::Random),
            "favorites" => Ok(Tab::Favorites),
            "about" => Ok(Tab::About),
            _ => Err(anyhow!("unknown tab '{}'", s)),
        }
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Tab::Home => "home",
            Tab::Trending => "trending",
            Tab::Search => "search",
            Tab::Random => "random",
            Tab::Favorites => "favorites",
            Tab::About => "about",
        };
        f.write_str(name)
    }
}

/// Monotonic token issued per load. Only the newest one may write results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Generation(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detail {
    pub item: MediaItem,
    pub cast: Vec<CastMember>,
}

#[derive(Debug, Clone)]
pub enum Action {
    SelectTab(Tab),
    SetQuery(String),
    ResultsLoaded {
        generation: Generation,
        items: Vec<MediaItem>,
    },
    LoadFailed {
        generation: Generation,
        error: String,
    },
    ToggleFavorite(MediaItem),
    OpenDetail(Detail),
    CloseDetail,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ViewState {
    pub active_tab: Tab,
    pub query: String,
    pub results: Vec<MediaItem>,
    /// Set when the latest load failed. `results` is empty in that case,
    /// same as for a load that matched nothing.
    pub error: Option<String>,
    pub loading: bool,
    pub favorites: Vec<MediaItem>,
    pub detail: Option<Detail>,
    pub latest: Generation,
}

impl ViewState {
    /// Starts a load for `tab` and returns the token its results must carry.
    pub fn begin(&mut self, tab: Tab) -> Generation {
        self.latest = Generation(self.latest.0 + 1);
        self.active_tab = tab;
        self.loading = true;
        self.error = None;
        self.latest
    }

    /// Applies `action`. Returns `false` when it was discarded because a
    /// newer load has been started since.
    pub fn apply(&mut self, action: Action) -> bool {
        match action {
            Action::SelectTab(tab) => {
                self.active_tab = tab;
                true
            }
            Action::SetQuery(query) => {
                self.query = query;
                true
            }
            Action::ResultsLoaded { generation, items } => {
                if !self.is_current(generation) {
                    return false;
                }
                self.results = items;
                self.error = None;
                self.loading = false;
                true
            }
            Action::LoadFailed { generation, error } => {
                if !self.is_current(generation) {
                    return false;
                }
                self.results.clear();
                self.error = Some(error);
                self.loading = false;
                true
            }
            Action::ToggleFavorite(item) => {
                if let Some(pos) = self.favorites.iter().position(|f| f.id == item.id) {
                    self.favorites.remove(pos);
                } else {
                    self.favorites.push(item);
                }
                true
            }
            Action::OpenDetail(detail) => {
                self.detail = Some(detail);
                true
            }
            Action::CloseDetail => {
                self.detail = None;
                true
            }
        }
    }

    pub fn is_favorite(&self, id: i64) -> bool {
        self.favorites.iter().any(|f| f.id == id)
    }

    fn is_current(&self, generation: Generation) -> bool {
        if generation != self.latest {
            debug!(
                "Discarding stale results for generation {} (latest {})",
                generation.0, self.latest.0
            );
            return false;
        }
        true
    }
}
