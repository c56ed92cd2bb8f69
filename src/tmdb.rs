use crate::config::Config;
use crate::models::{CastMember, Genre, ResultPage};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

pub const TMDB_BASE: &str = "https://api.themoviedb.org/3";
const CREDITS_LIMIT: usize = 12;

#[async_trait]
pub trait TmdbApi: Send + Sync {
    async fn search_movies(&self, query: &str, page: u32) -> Result<ResultPage>;
    async fn discover_movies(&self, query: &DiscoverQuery, page: u32) -> Result<ResultPage>;
    async fn trending_movies(&self, window: TrendingWindow, page: u32) -> Result<ResultPage>;
    async fn popular_movies(&self, page: u32) -> Result<ResultPage>;
    async fn genres(&self) -> Result<Vec<Genre>>;
    /// Top-billed cast, at most twelve entries.
    async fn credits(&self, movie_id: i64) -> Result<Vec<CastMember>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendingWindow {
    Day,
    Week,
}

impl TrendingWindow {
    pub fn as_path(&self) -> &'static str {
        match self {
            TrendingWindow::Day => "day",
            TrendingWindow::Week => "week",
        }
    }
}

impl FromStr for TrendingWindow {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "day" => Ok(TrendingWindow::Day),
            "week" => Ok(TrendingWindow::Week),
            _ => Err(anyhow!("trending window must be 'day' or 'week'")),
        }
    }
}

impl fmt::Display for TrendingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

/// Filters understood by `discover/movie`. Unset fields are left out of the
/// query string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoverQuery {
    pub sort_by: Option<String>,
    /// Inclusive `YYYY-MM-DD` bounds on the primary release date.
    pub release_from: Option<String>,
    pub release_to: Option<String>,
    pub min_vote_count: Option<u32>,
    pub region: Option<String>,
    pub original_language: Option<String>,
    pub with_genre: Option<u32>,
    pub without_genre: Option<u32>,
}

impl DiscoverQuery {
    pub fn year_range(from: i32, to: i32) -> Self {
        Self {
            release_from: Some(format!("{from:04}-01-01")),
            release_to: Some(format!("{to:04}-12-31")),
            ..Self::default()
        }
    }

    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(v) = &self.sort_by {
            params.push(("sort_by", v.clone()));
        }
        if let Some(v) = &self.release_from {
            params.push(("primary_release_date.gte", v.clone()));
        }
        if let Some(v) = &self.release_to {
            params.push(("primary_release_date.lte", v.clone()));
        }
        if let Some(v) = self.min_vote_count {
            params.push(("vote_count.gte", v.to_string()));
        }
        if let Some(v) = &self.region {
            params.push(("region", v.clone()));
        }
        if let Some(v) = &self.original_language {
            params.push(("with_original_language", v.clone()));
        }
        if let Some(v) = self.with_genre {
            params.push(("with_genres", v.to_string()));
        }
        if let Some(v) = self.without_genre {
            params.push(("without_genres", v.to_string()));
        }
        params
    }
}

#[derive(Debug, Clone)]
enum Auth {
    /// v3 key, sent as the `api_key` query parameter.
    ApiKey(String),
    /// v4 read access token, sent as a bearer header.
    Bearer(String),
}

impl Auth {
    fn from_credential(credential: &str) -> Self {
        let credential = credential.trim().to_string();
        if credential.starts_with("eyJ") {
            Auth::Bearer(credential)
        } else {
            Auth::ApiKey(credential)
        }
    }
}

#[derive(Debug, Clone)]
pub struct TmdbClient {
    client: Client,
    auth: Auth,
    base_url: String,
    language: String,
}

impl TmdbClient {
    pub fn new(credential: &str, base_url: &str, language: &str) -> Result<Self> {
        if credential.trim().is_empty() {
            bail!("TMDB credential is empty");
        }
        let user_agent = format!("reelscout/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(20))
            .user_agent(user_agent)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            auth: Auth::from_credential(credential),
            base_url: base_url.trim_end_matches('/').to_string(),
            language: language.to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.tmdb_api_key, &config.tmdb_base_url, &config.language)
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let mut url = format!(
            "{}{}?language={}",
            self.base_url,
            path,
            urlencoding::encode(&self.language)
        );
        for (key, value) in params {
            url.push('&');
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        if let Auth::ApiKey(key) = &self.auth {
            url.push_str("&api_key=");
            url.push_str(&urlencoding::encode(key));
        }
        url
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &str) -> Result<T> {
        debug!("GET {}", redact(url));
        let mut req = self.client.get(url);
        if let Auth::Bearer(token) = &self.auth {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.context("request failed")?;
        let status = res.status();
        let text = res.text().await.context("reading body failed")?;
        if !status.is_success() {
            return Err(anyhow!("{} -> {} {}", redact(url), status, text));
        }
        let parsed: T = serde_json::from_str(&text).context("JSON parse failed")?;
        Ok(parsed)
    }

    async fn get_page(&self, path: &str, mut params: Vec<(&str, String)>, page: u32) -> Result<ResultPage> {
        params.push(("page", page.max(1).to_string()));
        let url = self.url(path, &params);
        self.get_json(&url).await
    }
}

#[async_trait]
impl TmdbApi for TmdbClient {
    async fn search_movies(&self, query: &str, page: u32) -> Result<ResultPage> {
        let params = vec![
            ("query", query.to_string()),
            ("include_adult", "false".to_string()),
        ];
        self.get_page("/search/movie", params, page).await
    }

    async fn discover_movies(&self, query: &DiscoverQuery, page: u32) -> Result<ResultPage> {
        let mut params = query.to_params();
        params.push(("include_adult", "false".to_string()));
        self.get_page("/discover/movie", params, page).await
    }

    async fn trending_movies(&self, window: TrendingWindow, page: u32) -> Result<ResultPage> {
        let path = format!("/trending/movie/{}", window.as_path());
        self.get_page(&path, Vec::new(), page).await
    }

    async fn popular_movies(&self, page: u32) -> Result<ResultPage> {
        self.get_page("/movie/popular", Vec::new(), page).await
    }

    async fn genres(&self) -> Result<Vec<Genre>> {
        #[derive(Deserialize)]
        struct GenreList {
            #[serde(default)]
            genres: Vec<Genre>,
        }

        let url = self.url("/genre/movie/list", &[]);
        let data: GenreList = self.get_json(&url).await?;
        Ok(data.genres)
    }

    async fn credits(&self, movie_id: i64) -> Result<Vec<CastMember>> {
        #[derive(Deserialize)]
        struct Credits {
            #[serde(default)]
            cast: Vec<CastMember>,
        }

        let url = self.url(&format!("/movie/{movie_id}/credits"), &[]);
        let data: Credits = self.get_json(&url).await?;
        Ok(top_cast(data.cast))
    }
}

pub fn top_cast(mut cast: Vec<CastMember>) -> Vec<CastMember> {
    cast.truncate(CREDITS_LIMIT);
    cast
}

fn redact(url: &str) -> String {
    match url.find("api_key=") {
        Some(idx) => format!("{}api_key=***", &url[..idx]),
        None => url.to_string(),
    }
}
