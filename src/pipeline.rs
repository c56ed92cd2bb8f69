use crate::models::{MediaItem, RawMediaItem};
use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Rating bounds, `min` exclusive and `max` inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingRange {
    pub min: f64,
    pub max: f64,
}

impl Default for RatingRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: 10.0,
        }
    }
}

impl RatingRange {
    pub fn contains(&self, rating: f64) -> bool {
        rating > self.min && rating <= self.max
    }
}

/// Calendar month and day, year-agnostic. Displays and parses as `MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    pub fn new(month: u32, day: u32) -> Result<Self> {
        // 2000 is a leap year, so 02-29 is accepted.
        if NaiveDate::from_ymd_opt(2000, month, day).is_none() {
            return Err(anyhow!("invalid month-day {:02}-{:02}", month, day));
        }
        Ok(Self { month, day })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            month: date.month(),
            day: date.day(),
        }
    }

    pub fn today() -> Self {
        Self::from_date(chrono::Local::now().date_naive())
    }

    /// Month-day of a `YYYY-MM-DD` string; `None` when unparseable.
    pub fn of_release_date(date: &str) -> Option<Self> {
        let mut parts = date.trim().splitn(3, '-');
        let _year = parts.next()?;
        let month = parts.next()?.parse().ok()?;
        let day = parts.next()?.get(..2)?.parse().ok()?;
        Self::new(month, day).ok()
    }

    /// The same month-day in `year`, if that date exists.
    pub fn in_year(&self, year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl FromStr for MonthDay {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (m, d) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| anyhow!("month-day must look like MM-DD, got '{}'", s))?;
        let month = m.parse().map_err(|_| anyhow!("bad month in '{}'", s))?;
        let day = d.parse().map_err(|_| anyhow!("bad day in '{}'", s))?;
        Self::new(month, day)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub require_poster: bool,
    pub require_overview: bool,
    pub rating_range: Option<RatingRange>,
    /// Lowercase substrings matched against the lowercased title.
    pub title_blocklist: Vec<String>,
    pub date_match: Option<MonthDay>,
    /// Applied by the upstream query only.
    pub genre: Option<u32>,
    pub sample_count: Option<usize>,
    pub page_limit: u32,
    pub start_page: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::single_page()
    }
}

impl PipelineConfig {
    pub fn single_page() -> Self {
        Self {
            require_poster: false,
            require_overview: false,
            rating_range: None,
            title_blocklist: Vec::new(),
            date_match: None,
            genre: None,
            sample_count: None,
            page_limit: 1,
            start_page: 1,
        }
    }

    pub fn multi_page() -> Self {
        Self {
            page_limit: 3,
            ..Self::single_page()
        }
    }

    pub fn with_blocklist<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.title_blocklist = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        self
    }

    fn accepts(&self, item: &MediaItem) -> bool {
        if self.require_poster && item.poster_path.is_none() {
            return false;
        }
        if self.require_overview && item.overview.trim().is_empty() {
            return false;
        }
        if let Some(range) = &self.rating_range {
            if !range.contains(item.rating) {
                return false;
            }
        }
        if !self.title_blocklist.is_empty() {
            let title = item.title.to_lowercase();
            if self.title_blocklist.iter().any(|w| title.contains(w.as_str())) {
                return false;
            }
        }
        if let Some(target) = &self.date_match {
            let matches = item
                .release_date
                .as_deref()
                .and_then(MonthDay::of_release_date)
                .is_some_and(|md| md == *target);
            if !matches {
                return false;
            }
        }
        true
    }
}

/// Steps 1-3: concatenate pages in order, drop malformed records, keep the
/// first occurrence of each id, then apply the active filters.
pub fn filter<P>(pages: &[P], config: &PipelineConfig) -> Vec<MediaItem>
where
    P: AsRef<[RawMediaItem]>,
{
    let mut seen = HashSet::new();
    pages
        .iter()
        .flat_map(|p| p.as_ref().iter().cloned())
        .filter_map(RawMediaItem::into_media_item)
        .filter(|item| seen.insert(item.id))
        .filter(|item| config.accepts(item))
        .collect()
}

/// Full pipeline. With `sample_count` set the survivors are sampled without
/// replacement; otherwise they come back in merged order.
pub fn process<P, R>(pages: &[P], config: &PipelineConfig, rng: &mut R) -> Vec<MediaItem>
where
    P: AsRef<[RawMediaItem]>,
    R: Rng,
{
    let survivors = filter(pages, config);
    match config.sample_count {
        Some(count) => sample(survivors, count, rng),
        None => survivors,
    }
}

fn sample<R: Rng>(mut pool: Vec<MediaItem>, count: usize, rng: &mut R) -> Vec<MediaItem> {
    let mut picked = Vec::with_capacity(count.min(pool.len()));
    while picked.len() < count && !pool.is_empty() {
        let idx = rng.gen_range(0..pool.len());
        picked.push(pool.swap_remove(idx));
    }
    picked
}
