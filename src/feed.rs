use crate::models::{MediaItem, ResultPage};
use crate::pipeline::{self, MonthDay, PipelineConfig};
use crate::tmdb::{DiscoverQuery, TmdbApi, TrendingWindow};
use anyhow::Result;
use rand::Rng;
use tracing::{debug, info};

/// Upstream listing behind one browse mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Feed {
    Search { query: String },
    Discover(DiscoverQuery),
    Trending(TrendingWindow),
    Popular,
    /// Page `n` is the discover listing for the month-day in `years[n - 1]`.
    OnThisDay { month_day: MonthDay, years: Vec<i32> },
}

impl Feed {
    pub fn label(&self) -> &'static str {
        match self {
            Feed::Search { .. } => "search",
            Feed::Discover(_) => "discover",
            Feed::Trending(_) => "trending",
            Feed::Popular => "popular",
            Feed::OnThisDay { .. } => "on-this-day",
        }
    }

    /// Years ending at `latest`, newest first, skipping years in which the
    /// month-day does not exist.
    pub fn on_this_day(month_day: MonthDay, latest: i32, span: u32) -> Self {
        let span = i32::try_from(span).unwrap_or(i32::MAX);
        let years = (0..span)
            .map_while(|offset| latest.checked_sub(offset))
            .filter(|year| month_day.in_year(*year).is_some())
            .collect();
        Feed::OnThisDay { month_day, years }
    }

    /// Pages the feed can serve at most, when known up front.
    fn page_count(&self) -> Option<u32> {
        match self {
            Feed::OnThisDay { years, .. } => Some(u32::try_from(years.len()).unwrap_or(u32::MAX)),
            _ => None,
        }
    }

    async fn fetch(&self, tmdb: &dyn TmdbApi, page: u32, genre: Option<u32>) -> Result<ResultPage> {
        match self {
            Feed::Search { query } => tmdb.search_movies(query, page).await,
            Feed::Discover(query) => {
                let mut query = query.clone();
                if genre.is_some() {
                    query.with_genre = genre;
                }
                tmdb.discover_movies(&query, page).await
            }
            Feed::Trending(window) => tmdb.trending_movies(*window, page).await,
            Feed::Popular => tmdb.popular_movies(page).await,
            Feed::OnThisDay { month_day, years } => {
                let Some(date) = years
                    .get(page.saturating_sub(1) as usize)
                    .and_then(|year| month_day.in_year(*year))
                else {
                    return Ok(ResultPage::default());
                };
                let day = date.format("%Y-%m-%d").to_string();
                let query = DiscoverQuery {
                    sort_by: Some("popularity.desc".to_string()),
                    release_from: Some(day.clone()),
                    release_to: Some(day),
                    with_genre: genre,
                    ..DiscoverQuery::default()
                };
                let mut fetched = tmdb.discover_movies(&query, 1).await?;
                // Each year is its own single-page listing.
                fetched.page = page;
                fetched.total_pages = u32::try_from(years.len()).unwrap_or(u32::MAX);
                Ok(fetched)
            }
        }
    }
}

/// Fetches pages of `feed` one after another and runs the pipeline over
/// them. Without sampling every page up to `page_limit` is merged; with
/// sampling, fetching stops as soon as the filtered pool can satisfy the
/// requested count. Running out of pages yields a short result. A start page
/// past the end of the listing is redrawn once from the pages that exist.
pub async fn collect<R: Rng>(
    tmdb: &dyn TmdbApi,
    feed: &Feed,
    config: &PipelineConfig,
    rng: &mut R,
) -> Result<Vec<MediaItem>> {
    let mut pages: Vec<Vec<_>> = Vec::new();
    let limit = match feed.page_count() {
        Some(n) => config.page_limit.min(n),
        None => config.page_limit,
    };
    let mut page_no = config.start_page.max(1);
    let mut redrawn = false;

    while (pages.len() as u32) < limit {
        let page = feed.fetch(tmdb, page_no, config.genre).await?;
        if pages.is_empty()
            && !redrawn
            && page.results.is_empty()
            && page.total_pages > 0
            && page_no > page.total_pages
        {
            redrawn = true;
            let retry = rng.gen_range(1..=page.total_pages);
            debug!(
                "{} start page {} is past the last page {}, retrying page {}",
                feed.label(),
                page_no,
                page.total_pages,
                retry
            );
            page_no = retry;
            continue;
        }
        let last = page.is_last();
        debug!(
            "{} page {} returned {} records",
            feed.label(),
            page_no,
            page.results.len()
        );
        pages.push(page.results);

        if let Some(wanted) = config.sample_count {
            if pipeline::filter(&pages, config).len() >= wanted {
                break;
            }
        }
        if last {
            break;
        }
        page_no += 1;
    }

    let items = pipeline::process(&pages, config, rng);
    info!(
        "{}: {} page(s) fetched, {} item(s) kept",
        feed.label(),
        pages.len(),
        items.len()
    );
    Ok(items)
}
