use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

const POSTER_BASE: &str = "https://image.tmdb.org/t/p/w300";
const POSTER_PLACEHOLDER: &str = "https://via.placeholder.com/300x450?text=No+Image";
const EXCERPT_CHARS: usize = 100;
const NO_DESCRIPTION: &str = "No description available.";

/// One catalog entry as handed to the view layer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MediaItem {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    pub poster_path: Option<String>,
    #[serde(default)]
    pub rating: f64,
    pub release_date: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<u32>,
}

/// Wire record from a paginated TMDB listing. Every field is optional; the
/// pipeline decides what is usable.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct RawMediaItem {
    pub id: Option<i64>,
    pub title: Option<String>,
    /// TV-shaped records (trending) carry `name` instead of `title`.
    pub name: Option<String>,
    pub overview: Option<String>,
    pub poster_path: Option<String>,
    pub vote_average: Option<f64>,
    pub release_date: Option<String>,
    pub first_air_date: Option<String>,
    #[serde(default)]
    pub genre_ids: Vec<u32>,
}

impl RawMediaItem {
    /// Returns `None` for records without an id or a usable title.
    pub fn into_media_item(self) -> Option<MediaItem> {
        let id = self.id?;
        let title = self
            .title
            .or(self.name)
            .filter(|t| !t.trim().is_empty())?;
        let release_date = self
            .release_date
            .filter(|d| !d.is_empty())
            .or(self.first_air_date.filter(|d| !d.is_empty()));
        Some(MediaItem {
            id,
            title,
            overview: self.overview.unwrap_or_default(),
            poster_path: self.poster_path.filter(|p| !p.is_empty()),
            rating: self.vote_average.unwrap_or(0.0),
            release_date,
            genre_ids: self.genre_ids,
        })
    }
}

/// One page of a paginated listing.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ResultPage {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default, deserialize_with = "lenient_results")]
    pub results: Vec<RawMediaItem>,
}

impl ResultPage {
    pub fn new(page: u32, total_pages: u32, results: Vec<RawMediaItem>) -> Self {
        Self {
            page,
            total_pages,
            results,
        }
    }

    /// True when the source reports no page after this one.
    pub fn is_last(&self) -> bool {
        self.results.is_empty() || (self.total_pages > 0 && self.page >= self.total_pages)
    }
}

// A record with a wrongly typed field must not sink the whole page.
fn lenient_results<'de, D>(deserializer: D) -> Result<Vec<RawMediaItem>, D::Error>
where
    D: Deserializer<'de>,
{
    let values = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(values
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<RawMediaItem>(v) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!("Dropping unreadable result record: {}", e);
                None
            }
        })
        .collect())
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Genre {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CastMember {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub character: String,
    pub profile_path: Option<String>,
}

/// Display projection of a [`MediaItem`]: absolute poster URL (or the
/// placeholder) and a truncated overview.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MediaCard {
    pub id: i64,
    pub title: String,
    pub excerpt: String,
    pub poster_url: String,
    pub rating: f64,
    pub release_date: Option<String>,
}

impl From<&MediaItem> for MediaCard {
    fn from(item: &MediaItem) -> Self {
        Self {
            id: item.id,
            title: item.title.clone(),
            excerpt: overview_excerpt(&item.overview),
            poster_url: poster_url(item.poster_path.as_deref()),
            rating: item.rating,
            release_date: item.release_date.clone(),
        }
    }
}

pub fn poster_url(path: Option<&str>) -> String {
    match path {
        Some(p) => format!("{POSTER_BASE}{p}"),
        None => POSTER_PLACEHOLDER.to_string(),
    }
}

pub fn overview_excerpt(overview: &str) -> String {
    if overview.trim().is_empty() {
        return NO_DESCRIPTION.to_string();
    }
    let head: String = overview.chars().take(EXCERPT_CHARS).collect();
    format!("{head}...")
}
