use crate::tmdb::TMDB_BASE;
use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

const DEFAULT_CACHE_PATH: &str = "cache/on_this_day.json";
const DEFAULT_BLOCKLIST: &[&str] = &["ufc", "wwe", "aew", "bellator", "pay-per-view"];
const DEFAULT_MIN_VOTES: u32 = 200;
const DEFAULT_ON_THIS_DAY_YEARS: u32 = 30;
const MAX_ON_THIS_DAY_YEARS: u32 = 150;
const DOCUMENTARY_GENRE: u32 = 99;

#[derive(Debug, Clone)]
pub struct Config {
    pub tmdb_api_key: String,
    pub tmdb_base_url: String,
    pub language: String,
    pub region: String,
    pub bind_addr: SocketAddr,
    /// `None` keeps the on-this-day slot in memory only.
    pub cache_path: Option<PathBuf>,
    pub title_blocklist: Vec<String>,
    pub min_vote_count: u32,
    pub on_this_day_years: u32,
    pub excluded_genre: Option<u32>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let tmdb_api_key = env::var("TMDB_API_KEY")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .context("Missing required environment variable: TMDB_API_KEY")?;

        let bind_addr = parse_var("REELSCOUT_BIND")?
            .unwrap_or_else(default_bind);
        let cache_path = match env::var("REELSCOUT_CACHE_PATH") {
            Ok(v) if v.trim().is_empty() || v == "off" => None,
            Ok(v) => Some(PathBuf::from(v)),
            Err(_) => Some(PathBuf::from(DEFAULT_CACHE_PATH)),
        };
        let title_blocklist = match env::var("REELSCOUT_TITLE_BLOCKLIST") {
            Ok(v) => split_list(&v),
            Err(_) => DEFAULT_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
        };
        let excluded_genre = match env::var("REELSCOUT_EXCLUDED_GENRE") {
            Ok(v) if v.trim().is_empty() || v == "none" => None,
            Ok(v) => Some(
                v.trim()
                    .parse()
                    .with_context(|| format!("REELSCOUT_EXCLUDED_GENRE is not a genre id: {v}"))?,
            ),
            Err(_) => Some(DOCUMENTARY_GENRE),
        };
        let on_this_day_years = check_span(
            parse_var("REELSCOUT_ON_THIS_DAY_YEARS")?.unwrap_or(DEFAULT_ON_THIS_DAY_YEARS),
        )?;

        let config = Self {
            tmdb_api_key,
            tmdb_base_url: env::var("TMDB_BASE_URL").unwrap_or_else(|_| TMDB_BASE.to_string()),
            language: env::var("TMDB_LANGUAGE").unwrap_or_else(|_| "en-US".to_string()),
            region: env::var("TMDB_REGION").unwrap_or_else(|_| "US".to_string()),
            bind_addr,
            cache_path,
            title_blocklist,
            min_vote_count: parse_var("REELSCOUT_MIN_VOTES")?.unwrap_or(DEFAULT_MIN_VOTES),
            on_this_day_years,
            excluded_genre,
        };
        info!(
            "Configuration loaded (bind {}, cache {:?}, {} blocklisted terms)",
            config.bind_addr,
            config.cache_path,
            config.title_blocklist.len()
        );
        Ok(config)
    }

    /// Defaults for everything except the credential.
    #[cfg(test)]
    pub fn with_api_key(key: &str) -> Self {
        Self {
            tmdb_api_key: key.to_string(),
            tmdb_base_url: TMDB_BASE.to_string(),
            language: "en-US".to_string(),
            region: "US".to_string(),
            bind_addr: default_bind(),
            cache_path: None,
            title_blocklist: DEFAULT_BLOCKLIST.iter().map(|s| s.to_string()).collect(),
            min_vote_count: DEFAULT_MIN_VOTES,
            on_this_day_years: DEFAULT_ON_THIS_DAY_YEARS,
            excluded_genre: Some(DOCUMENTARY_GENRE),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3147))
}

fn check_span(years: u32) -> Result<u32> {
    if years == 0 || years > MAX_ON_THIS_DAY_YEARS {
        anyhow::bail!(
            "REELSCOUT_ON_THIS_DAY_YEARS must be between 1 and {MAX_ON_THIS_DAY_YEARS}, got {years}"
        );
    }
    Ok(years)
}

fn parse_var<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("Invalid value for {key}: {v}")),
        _ => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
