use crate::cache::SlotCache;
use crate::config::Config;
use crate::feed::{self, Feed};
use crate::models::{MediaCard, MediaItem};
use crate::pipeline::{MonthDay, PipelineConfig, RatingRange};
use crate::state::{Action, Detail, Generation, Tab, ViewState};
use crate::tmdb::{DiscoverQuery, TmdbApi, TmdbClient, TrendingWindow};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Datelike;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

const MAX_BODY_BYTES: usize = 64 * 1024;
const DEFAULT_SAMPLE: usize = 3;
const MAX_SAMPLE: usize = 20;
// Random mode starts somewhere in the first pages of the popular list.
const RANDOM_PAGE_SPREAD: u32 = 10;
const EARLIEST_YEAR: i32 = 1874;

#[derive(Clone)]
pub struct AppState {
    pub tmdb: Arc<dyn TmdbApi>,
    pub view: Arc<Mutex<ViewState>>,
    pub on_this_day: Arc<Mutex<SlotCache<Vec<MediaItem>>>>,
    pub settings: Arc<BrowseSettings>,
}

/// Per-deployment knobs that shape the pipeline configurations.
#[derive(Debug, Clone)]
pub struct BrowseSettings {
    pub title_blocklist: Vec<String>,
    pub min_vote_count: u32,
    pub region: String,
    pub excluded_genre: Option<u32>,
    pub on_this_day_years: u32,
}

impl From<&Config> for BrowseSettings {
    fn from(config: &Config) -> Self {
        Self {
            title_blocklist: config.title_blocklist.clone(),
            min_vote_count: config.min_vote_count,
            region: config.region.clone(),
            excluded_genre: config.excluded_genre,
            on_this_day_years: config.on_this_day_years,
        }
    }
}

impl AppState {
    pub fn new(
        tmdb: Arc<dyn TmdbApi>,
        on_this_day: SlotCache<Vec<MediaItem>>,
        settings: BrowseSettings,
    ) -> Self {
        Self {
            tmdb,
            view: Arc::new(Mutex::new(ViewState::default())),
            on_this_day: Arc::new(Mutex::new(on_this_day)),
            settings: Arc::new(settings),
        }
    }
}

pub async fn run_server(config: Config) -> Result<()> {
    let tmdb: Arc<dyn TmdbApi> = Arc::new(TmdbClient::from_config(&config)?);
    let cache = match &config.cache_path {
        Some(path) => SlotCache::open(path).await,
        None => SlotCache::in_memory(),
    };
    let state = AppState::new(tmdb, cache, BrowseSettings::from(&config));

    let app = build_router(state).layer(TraceLayer::new_for_http());

    info!("Listening on {}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/state", get(view_state))
        .route("/tabs/:tab", post(select_tab))
        .route("/search", get(search))
        .route("/trending", get(trending))
        .route("/top-rated", get(top_rated))
        .route("/random", get(random))
        .route("/on-this-day", get(on_this_day))
        .route("/genres", get(genres))
        .route("/movies/:id/credits", get(credits))
        .route("/detail", delete(close_detail))
        .route("/favorites", get(favorites).post(toggle_favorite))
        .route("/about", get(about))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

/// Body of every list endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse {
    pub generation: Generation,
    /// `false` when a newer load superseded this one before it finished.
    pub applied: bool,
    pub items: Vec<MediaCard>,
    pub error: Option<String>,
}

fn bad_request(message: impl std::fmt::Display) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"status": "error", "message": message.to_string()})),
    )
        .into_response()
}

async fn health() -> &'static str {
    "OK"
}

async fn view_state(State(state): State<AppState>) -> Json<ViewState> {
    Json(state.view.lock().await.clone())
}

async fn select_tab(State(state): State<AppState>, Path(tab): Path<String>) -> Response {
    let tab: Tab = match tab.parse() {
        Ok(t) => t,
        Err(e) => return bad_request(e),
    };
    let mut view = state.view.lock().await;
    view.apply(Action::SelectTab(tab));
    debug!("Active tab is now {}", tab);
    Json(view.clone()).into_response()
}

/// Runs one load against the view state: issue a generation, fetch without
/// holding the lock, then apply the outcome if still current. Fetch errors
/// degrade to an empty list.
async fn load<F, Fut>(state: &AppState, tab: Tab, fetch: F) -> ListResponse
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Vec<MediaItem>>>,
{
    let generation = state.view.lock().await.begin(tab);
    let (items, error) = match fetch().await {
        Ok(items) => (items, None),
        Err(e) => {
            warn!("{} load failed: {:#}", tab, e);
            (Vec::new(), Some(format!("{:#}", e)))
        }
    };
    let cards = items.iter().map(MediaCard::from).collect();
    let action = match &error {
        Some(err) => Action::LoadFailed {
            generation,
            error: err.clone(),
        },
        None => Action::ResultsLoaded { generation, items },
    };
    let applied = state.view.lock().await.apply(action);
    ListResponse {
        generation,
        applied,
        items: cards,
        error,
    }
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    page: Option<u32>,
}

async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Json<ListResponse> {
    let query = params.q.trim().to_string();
    state
        .view
        .lock()
        .await
        .apply(Action::SetQuery(query.clone()));

    let config = PipelineConfig {
        start_page: params.page.unwrap_or(1),
        ..PipelineConfig::single_page()
    };
    let tmdb = state.tmdb.clone();
    let res = load(&state, Tab::Search, || async move {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let feed = Feed::Search { query };
        feed::collect(tmdb.as_ref(), &feed, &config, &mut StdRng::from_entropy()).await
    })
    .await;
    Json(res)
}

#[derive(Debug, Deserialize)]
struct TrendingParams {
    window: Option<String>,
}

async fn trending(State(state): State<AppState>, Query(params): Query<TrendingParams>) -> Response {
    let window: TrendingWindow = match params.window.as_deref().unwrap_or("week").parse() {
        Ok(w) => w,
        Err(e) => return bad_request(e),
    };
    let config = PipelineConfig {
        require_poster: true,
        ..PipelineConfig::single_page()
    };
    let tmdb = state.tmdb.clone();
    let res = load(&state, Tab::Trending, || async move {
        let feed = Feed::Trending(window);
        feed::collect(tmdb.as_ref(), &feed, &config, &mut StdRng::from_entropy()).await
    })
    .await;
    Json(res).into_response()
}

#[derive(Debug, Deserialize)]
struct TopRatedParams {
    from: Option<i32>,
    to: Option<i32>,
    genre: Option<u32>,
}

async fn top_rated(State(state): State<AppState>, Query(params): Query<TopRatedParams>) -> Response {
    let this_year = chrono::Local::now().year();
    let to = params.to.unwrap_or(this_year);
    let from = params.from.unwrap_or(to);
    if from > to || from < EARLIEST_YEAR || to > this_year + 1 {
        return bad_request(format!("invalid year range {from}..{to}"));
    }

    let settings = state.settings.clone();
    let query = DiscoverQuery {
        sort_by: Some("vote_average.desc".to_string()),
        min_vote_count: Some(settings.min_vote_count),
        region: Some(settings.region.clone()),
        without_genre: settings.excluded_genre.filter(|g| Some(*g) != params.genre),
        ..DiscoverQuery::year_range(from, to)
    };
    let config = PipelineConfig {
        require_poster: true,
        rating_range: Some(RatingRange::default()),
        genre: params.genre,
        ..PipelineConfig::single_page()
    };
    let tmdb = state.tmdb.clone();
    let res = load(&state, Tab::Home, || async move {
        let feed = Feed::Discover(query);
        feed::collect(tmdb.as_ref(), &feed, &config, &mut StdRng::from_entropy()).await
    })
    .await;
    Json(res).into_response()
}

#[derive(Debug, Deserialize)]
struct RandomParams {
    count: Option<usize>,
    genre: Option<u32>,
}

async fn random(State(state): State<AppState>, Query(params): Query<RandomParams>) -> Response {
    let count = params.count.unwrap_or(DEFAULT_SAMPLE);
    if count == 0 || count > MAX_SAMPLE {
        return bad_request(format!("count must be between 1 and {MAX_SAMPLE}"));
    }
    let mut rng = StdRng::from_entropy();
    let config = PipelineConfig {
        require_poster: true,
        require_overview: true,
        rating_range: Some(RatingRange::default()),
        genre: params.genre,
        sample_count: Some(count),
        start_page: rng.gen_range(1..=RANDOM_PAGE_SPREAD),
        ..PipelineConfig::multi_page()
    }
    .with_blocklist(&state.settings.title_blocklist);
    let feed = match params.genre {
        Some(_) => Feed::Discover(DiscoverQuery {
            sort_by: Some("popularity.desc".to_string()),
            ..DiscoverQuery::default()
        }),
        None => Feed::Popular,
    };
    let tmdb = state.tmdb.clone();
    let res = load(&state, Tab::Random, || async move {
        feed::collect(tmdb.as_ref(), &feed, &config, &mut rng).await
    })
    .await;
    Json(res).into_response()
}

async fn on_this_day(State(state): State<AppState>) -> Json<ListResponse> {
    let today = chrono::Local::now().date_naive();
    let month_day = MonthDay::from_date(today);
    let settings = state.settings.clone();
    let feed = Feed::on_this_day(month_day, today.year(), settings.on_this_day_years);
    let config = PipelineConfig {
        require_poster: true,
        rating_range: Some(RatingRange::default()),
        date_match: Some(month_day),
        page_limit: settings.on_this_day_years,
        ..PipelineConfig::single_page()
    }
    .with_blocklist(&settings.title_blocklist);

    let tmdb = state.tmdb.clone();
    let slot = state.on_this_day.clone();
    let res = load(&state, Tab::Home, || async move {
        // Held for the whole lookup-compute-store so the slot is never
        // filled by two invocations at once.
        let mut cache = slot.lock().await;
        let key = month_day.to_string();
        cache
            .get_or_compute(&key, || async move {
                feed::collect(tmdb.as_ref(), &feed, &config, &mut StdRng::from_entropy()).await
            })
            .await
    })
    .await;
    Json(res)
}

async fn genres(State(state): State<AppState>) -> Response {
    match state.tmdb.genres().await {
        Ok(list) => Json(json!({ "genres": list, "error": null })).into_response(),
        Err(e) => {
            warn!("Genre catalog fetch failed: {:#}", e);
            Json(json!({ "genres": [], "error": format!("{:#}", e) })).into_response()
        }
    }
}

async fn credits(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    let cast = match state.tmdb.credits(id).await {
        Ok(cast) => cast,
        Err(e) => {
            warn!("Credits fetch for {} failed: {:#}", id, e);
            return Json(json!({ "cast": [], "error": format!("{:#}", e) })).into_response();
        }
    };

    let mut view = state.view.lock().await;
    let item = view
        .results
        .iter()
        .chain(view.favorites.iter())
        .find(|i| i.id == id)
        .cloned();
    if let Some(item) = item {
        view.apply(Action::OpenDetail(Detail {
            item,
            cast: cast.clone(),
        }));
    }
    Json(json!({ "cast": cast, "error": null })).into_response()
}

async fn close_detail(State(state): State<AppState>) -> StatusCode {
    state.view.lock().await.apply(Action::CloseDetail);
    StatusCode::NO_CONTENT
}

async fn favorites(State(state): State<AppState>) -> Json<Vec<MediaCard>> {
    let view = state.view.lock().await;
    Json(view.favorites.iter().map(MediaCard::from).collect())
}

async fn toggle_favorite(State(state): State<AppState>, Json(item): Json<MediaItem>) -> Json<serde_json::Value> {
    let mut view = state.view.lock().await;
    let id = item.id;
    view.apply(Action::ToggleFavorite(item));
    let favorite = view.is_favorite(id);
    info!("Movie {} favorite={}", id, favorite);
    Json(json!({ "id": id, "favorite": favorite, "count": view.favorites.len() }))
}

async fn about() -> Json<serde_json::Value> {
    Json(json!({
        "name": "reelscout",
        "version": env!("CARGO_PKG_VERSION"),
        "about": "Browse, search and sample movies from The Movie Database (TMDB).",
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal received (Ctrl+C)");
        }
        _ = terminate => {
            info!("Shutdown signal received (SIGTERM)");
        }
    }
}
