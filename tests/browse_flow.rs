use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use reelscout::app::{build_router, AppState, BrowseSettings, ListResponse};
use reelscout::cache::SlotCache;
use reelscout::models::{CastMember, Genre, MediaItem, RawMediaItem, ResultPage};
use reelscout::pipeline::MonthDay;
use reelscout::state::{Tab, ViewState};
use reelscout::tmdb::{DiscoverQuery, TmdbApi, TrendingWindow};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tower::util::ServiceExt;

#[derive(Default)]
struct FakeTmdb {
    search_pages: Vec<ResultPage>,
    popular_pages: Vec<ResultPage>,
    discover_page: ResultPage,
    /// When set, discover honours `page` instead of always serving `discover_page`.
    discover_pages: Vec<ResultPage>,
    fail: AtomicBool,
    discover_calls: AtomicUsize,
    discover_queries: Mutex<Vec<DiscoverQuery>>,
    search_calls: AtomicUsize,
}

impl FakeTmdb {
    fn check(&self) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("upstream unavailable");
        }
        Ok(())
    }
}

fn pick(pages: &[ResultPage], page: u32) -> ResultPage {
    pages
        .get(page.saturating_sub(1) as usize)
        .cloned()
        .unwrap_or_else(|| ResultPage::new(page, pages.len() as u32, Vec::new()))
}

#[async_trait::async_trait]
impl TmdbApi for FakeTmdb {
    async fn search_movies(&self, _query: &str, page: u32) -> anyhow::Result<ResultPage> {
        self.check()?;
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(pick(&self.search_pages, page))
    }
    async fn discover_movies(&self, query: &DiscoverQuery, page: u32) -> anyhow::Result<ResultPage> {
        self.check()?;
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        self.discover_queries.lock().unwrap().push(query.clone());
        if self.discover_pages.is_empty() {
            return Ok(self.discover_page.clone());
        }
        Ok(pick(&self.discover_pages, page))
    }
    async fn trending_movies(&self, _window: TrendingWindow, page: u32) -> anyhow::Result<ResultPage> {
        self.check()?;
        Ok(pick(&self.search_pages, page))
    }
    async fn popular_movies(&self, page: u32) -> anyhow::Result<ResultPage> {
        self.check()?;
        Ok(pick(&self.popular_pages, page))
    }
    async fn genres(&self) -> anyhow::Result<Vec<Genre>> {
        self.check()?;
        Ok(vec![Genre {
            id: 27,
            name: "Horror".to_string(),
        }])
    }
    async fn credits(&self, _movie_id: i64) -> anyhow::Result<Vec<CastMember>> {
        self.check()?;
        Ok((0..12)
            .map(|i| CastMember {
                id: i,
                name: format!("Actor {i}"),
                character: format!("Role {i}"),
                profile_path: None,
            })
            .collect())
    }
}

fn raw(id: i64, title: &str, poster: bool, release_date: &str) -> RawMediaItem {
    RawMediaItem {
        id: Some(id),
        title: Some(title.to_string()),
        overview: Some(format!("{title} overview")),
        poster_path: poster.then(|| format!("/{id}.jpg")),
        vote_average: Some(7.2),
        release_date: Some(release_date.to_string()),
        ..Default::default()
    }
}

fn settings() -> BrowseSettings {
    BrowseSettings {
        title_blocklist: vec!["ufc".to_string()],
        min_vote_count: 150,
        region: "US".to_string(),
        excluded_genre: Some(99),
        on_this_day_years: 3,
    }
}

fn app_with(tmdb: FakeTmdb) -> (Router, Arc<FakeTmdb>, AppState) {
    let tmdb = Arc::new(tmdb);
    let state = AppState::new(tmdb.clone(), SlotCache::in_memory(), settings());
    (build_router(state.clone()), tmdb, state)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let res = app
        .clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn list(app: &Router, uri: &str) -> ListResponse {
    let (status, value) = get_json(app, uri).await;
    assert_eq!(status, StatusCode::OK, "unexpected status for {uri}: {value}");
    serde_json::from_value(value).expect("list response")
}

async fn view(app: &Router) -> ViewState {
    let (_, value) = get_json(app, "/state").await;
    serde_json::from_value(value).expect("view state")
}

#[tokio::test]
async fn search_dedups_and_sets_view_state() {
    let (app, _tmdb, _) = app_with(FakeTmdb {
        search_pages: vec![ResultPage::new(
            1,
            1,
            vec![
                raw(1, "Alien", false, "1979-05-25"),
                raw(2, "Aliens", true, "1986-07-18"),
                raw(1, "Alien (dup)", true, "1979-05-25"),
            ],
        )],
        ..Default::default()
    });

    let res = list(&app, "/search?q=alien").await;
    assert!(res.applied);
    assert_eq!(res.error, None);
    let ids: Vec<_> = res.items.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(res.items[0].title, "Alien");
    assert!(res.items[0].poster_url.contains("placeholder"));

    let state = view(&app).await;
    assert_eq!(state.active_tab, Tab::Search);
    assert_eq!(state.query, "alien");
    assert_eq!(state.results.len(), 2);
    assert!(!state.loading);
}

#[tokio::test]
async fn empty_search_does_not_hit_upstream() {
    let (app, tmdb, _) = app_with(FakeTmdb::default());
    let res = list(&app, "/search?q=%20%20").await;
    assert!(res.items.is_empty());
    assert_eq!(res.error, None);
    assert_eq!(tmdb.search_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fetch_failure_degrades_to_empty_with_error_signal() {
    let (app, tmdb, _) = app_with(FakeTmdb::default());
    tmdb.fail.store(true, Ordering::SeqCst);

    let res = list(&app, "/trending?window=day").await;
    assert!(res.items.is_empty());
    assert!(res.error.as_deref().unwrap_or_default().contains("upstream unavailable"));

    let state = view(&app).await;
    assert!(state.results.is_empty());
    assert!(state.error.is_some());
}

#[tokio::test]
async fn invalid_inputs_are_rejected() {
    let (app, _, _) = app_with(FakeTmdb::default());
    let (status, _) = get_json(&app, "/trending?window=month").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get_json(&app, "/top-rated?from=2000&to=1990").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = get_json(&app, "/random?count=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let res = app
        .clone()
        .oneshot(Request::post("/tabs/settings").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn random_samples_filtered_popular_pool() {
    let page = |n: i64| {
        let base = (n - 1) * 10;
        let mut items: Vec<_> = (1..=10)
            .map(|i| raw(base + i, &format!("Popular {}", base + i), true, "2015-01-01"))
            .collect();
        items.push(raw(base + 100, "UFC 300: Prelims", true, "2024-04-13"));
        ResultPage::new(n as u32, 50, items)
    };
    let (app, _, _) = app_with(FakeTmdb {
        popular_pages: (1..=12).map(page).collect(),
        ..Default::default()
    });

    let res = list(&app, "/random?count=4").await;
    assert_eq!(res.items.len(), 4);
    let mut ids: Vec<_> = res.items.iter().map(|c| c.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert!(res.items.iter().all(|c| !c.title.to_lowercase().contains("ufc")));
    assert_eq!(view(&app).await.active_tab, Tab::Random);
}

#[tokio::test]
async fn random_by_genre_fills_sample_from_short_listing() {
    let page = |n: i64| {
        let items = (1..=6)
            .map(|i| {
                let id = (n - 1) * 6 + i;
                raw(id, &format!("Horror {id}"), true, "2012-10-31")
            })
            .collect();
        ResultPage::new(n as u32, 2, items)
    };
    let (app, tmdb, _) = app_with(FakeTmdb {
        discover_pages: (1..=2).map(page).collect(),
        ..Default::default()
    });

    // The random start page usually lies past page 2; run a few draws.
    for _ in 0..5 {
        let res = list(&app, "/random?count=3&genre=27").await;
        assert_eq!(res.error, None);
        assert_eq!(res.items.len(), 3);
    }

    let queries = tmdb.discover_queries.lock().unwrap();
    assert!(!queries.is_empty());
    assert!(queries.iter().all(|q| q.with_genre == Some(27)));
    assert!(queries
        .iter()
        .all(|q| q.sort_by.as_deref() == Some("popularity.desc")));
}

#[tokio::test]
async fn top_rated_builds_discover_query() {
    let (app, tmdb, _) = app_with(FakeTmdb {
        discover_page: ResultPage::new(
            1,
            1,
            vec![
                raw(10, "Goodfellas", true, "1990-09-12"),
                raw(11, "Posterless", false, "1991-01-01"),
            ],
        ),
        ..Default::default()
    });

    let res = list(&app, "/top-rated?from=1990&to=1999&genre=80").await;
    let ids: Vec<_> = res.items.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![10]);

    let queries = tmdb.discover_queries.lock().unwrap();
    let q = &queries[0];
    assert_eq!(q.sort_by.as_deref(), Some("vote_average.desc"));
    assert_eq!(q.release_from.as_deref(), Some("1990-01-01"));
    assert_eq!(q.release_to.as_deref(), Some("1999-12-31"));
    assert_eq!(q.min_vote_count, Some(150));
    assert_eq!(q.with_genre, Some(80));
    assert_eq!(q.without_genre, Some(99));
}

#[tokio::test]
async fn on_this_day_is_served_from_slot_cache_on_repeat() {
    let today = MonthDay::today();
    let date = format!("2001-{today}");
    let (app, tmdb, state) = app_with(FakeTmdb {
        discover_page: ResultPage::new(
            1,
            1,
            vec![
                raw(20, "Same Day", true, &date),
                raw(21, "Other Day", true, "2001-13-40"),
            ],
        ),
        ..Default::default()
    });

    let first = list(&app, "/on-this-day").await;
    let ids: Vec<_> = first.items.iter().map(|c| c.id).collect();
    assert_eq!(ids, vec![20]);
    let calls = tmdb.discover_calls.load(Ordering::SeqCst);
    assert!(calls >= 1 && calls <= 3);

    let second = list(&app, "/on-this-day").await;
    assert_eq!(second.items.len(), 1);
    assert_eq!(tmdb.discover_calls.load(Ordering::SeqCst), calls);

    let slot = state.on_this_day.lock().await;
    assert_eq!(slot.stored_key(), Some(today.to_string().as_str()));
}

#[tokio::test]
async fn favorites_toggle_and_list() {
    let (app, _, _) = app_with(FakeTmdb::default());
    let item = MediaItem {
        id: 603,
        title: "The Matrix".to_string(),
        overview: "A hacker learns the truth.".to_string(),
        poster_path: Some("/matrix.jpg".to_string()),
        rating: 8.2,
        release_date: Some("1999-03-31".to_string()),
        genre_ids: vec![28, 878],
    };
    let post = |body: Value| {
        Request::post("/favorites")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    };

    let res = app.clone().oneshot(post(json!(item))).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["favorite"], json!(true));

    let (_, favs) = get_json(&app, "/favorites").await;
    assert_eq!(favs.as_array().map(|a| a.len()), Some(1));
    assert_eq!(favs[0]["poster_url"], json!("https://image.tmdb.org/t/p/w300/matrix.jpg"));

    let res = app.clone().oneshot(post(json!(item))).await.unwrap();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["favorite"], json!(false));
    assert_eq!(body["count"], json!(0));
}

#[tokio::test]
async fn credits_open_detail_for_listed_movie() {
    let (app, _, _) = app_with(FakeTmdb {
        search_pages: vec![ResultPage::new(1, 1, vec![raw(5, "Heat", true, "1995-12-15")])],
        ..Default::default()
    });
    list(&app, "/search?q=heat").await;

    let (status, body) = get_json(&app, "/movies/5/credits").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cast"].as_array().map(|a| a.len()), Some(12));

    let state = view(&app).await;
    let detail = state.detail.expect("detail open");
    assert_eq!(detail.item.id, 5);
    assert_eq!(detail.cast[0].character, "Role 0");

    let res = app
        .clone()
        .oneshot(Request::delete("/detail").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    assert!(view(&app).await.detail.is_none());
}

#[tokio::test]
async fn genres_and_tabs() {
    let (app, _, _) = app_with(FakeTmdb::default());
    let (_, body) = get_json(&app, "/genres").await;
    assert_eq!(body["genres"][0]["name"], json!("Horror"));

    let res = app
        .clone()
        .oneshot(Request::post("/tabs/about").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(view(&app).await.active_tab, Tab::About);

    let (status, body) = get_json(&app, "/about").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], json!("reelscout"));
}
