use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use axum_extra::extract::Query;
use serde::{Deserialize, Serialize};

use super::client_ip::resolve_client_ip;
use super::AppState;
use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::db::{self, MediaItem, Post, PostFilter, PostWithMedia};
use crate::ranking::{SortMode, TopWindow};

/// Create the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts))
        .route(
            "/api/posts/:no",
            get(get_post).delete(delete_post),
        )
        .route("/api/sites", get(list_sites))
        .route("/api/popular", get(popular))
        .route("/api/news", get(news))
        .route("/api/week", get(week))
        .route("/api/trending", get(trending))
        .route("/api/stats/summary", get(stats_summary))
        .route("/api/stats/sites", get(stats_sites))
        .route("/api/stats/recent", get(stats_recent))
        .route("/api/stats/weekly", get(stats_weekly))
        .route("/api/stats/latest", get(stats_latest))
        .route("/api/access-log/log", post(log_access))
        .route("/api/access-log/stats/total-visitors", get(total_visitors))
        .route("/api/access-log/stats/total-access", get(total_access))
        .route("/api/access-log/stats/today", get(today_visitors))
        .route("/api/access-log/stats/daily", get(daily_stats_default))
        .route("/api/access-log/stats/daily/:days", get(daily_stats))
        .route("/api/access-log/recent", get(recent_logs_default))
        .route("/api/access-log/recent/:count", get(recent_logs))
        .route("/api/access-log/top-visitors", get(top_visitors_default))
        .route("/api/access-log/top-visitors/:count", get(top_visitors))
        .route("/healthz", get(health))
}

// ========== Envelopes ==========

/// Paging envelope for list endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub data: Vec<T>,
    pub page: i64,
    pub page_size: i64,
    pub total_count: i64,
    pub total_pages: i64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl<T> PagedResult<T> {
    #[must_use]
    pub fn new(data: Vec<T>, page: i64, page_size: i64, total_count: i64) -> Self {
        let total_pages = if total_count == 0 {
            0
        } else {
            (total_count + page_size - 1) / page_size
        };
        Self {
            data,
            page,
            page_size,
            total_count,
            total_pages,
            has_next_page: page < total_pages,
            has_previous_page: page > 1,
        }
    }
}

/// Unpaged envelope for digest-style endpoints.
#[derive(Debug, Serialize)]
pub struct DataResult<T> {
    pub data: T,
}

/// Build a JSON error response. Server-side failures always get the same
/// generic message; details stay in the logs.
fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "message": message }))).into_response()
}

fn internal_error() -> Response {
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

/// Clamp paging inputs: page below 1 becomes 1, page size outside
/// [1, 100] becomes the default. Malformed paging is never a 400.
fn clamp_paging(page: Option<i64>, page_size: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    let page_size = match page_size.unwrap_or(DEFAULT_PAGE_SIZE) {
        s if (1..=MAX_PAGE_SIZE).contains(&s) => s,
        _ => DEFAULT_PAGE_SIZE,
    };
    (page, page_size)
}

fn clamp_count(count: Option<i64>, default: i64, max: i64) -> i64 {
    match count.unwrap_or(default) {
        c if (1..=max).contains(&c) => c,
        _ => default,
    }
}

/// Parse a y/n query flag. Anything other than y or n means "no filter".
fn parse_yn(value: Option<&str>) -> Option<bool> {
    match value {
        Some("y" | "Y") => Some(true),
        Some("n" | "N") => Some(false),
        _ => None,
    }
}

/// Attach media records to a page of posts with a single batch query.
async fn enrich_with_media(
    state: &AppState,
    posts: Vec<Post>,
) -> anyhow::Result<Vec<PostWithMedia>> {
    let nos: Vec<i64> = posts.iter().map(|p| p.no).collect();
    let mut media = db::media_for_posts(state.db.pool(), &nos).await?;

    Ok(posts
        .into_iter()
        .map(|post| {
            let media = media
                .remove(&post.no)
                .unwrap_or_default()
                .into_iter()
                .map(MediaItem::from)
                .collect();
            PostWithMedia { post, media }
        })
        .collect())
}

// ========== Posts ==========

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListParams {
    page: Option<i64>,
    page_size: Option<i64>,
    site: Option<String>,
    #[serde(default)]
    sites: Vec<String>,
    sort_by: Option<String>,
    window: Option<String>,
    keyword: Option<String>,
    author: Option<String>,
    is_news_yn: Option<String>,
    max_no: Option<i64>,
    media_only: Option<bool>,
}

async fn list_posts(State(state): State<AppState>, Query(params): Query<PostListParams>) -> Response {
    let (page, page_size) = clamp_paging(params.page, params.page_size);

    let filter = PostFilter {
        keyword: params.keyword,
        author: params.author,
        site: params.site,
        sites: params.sites,
        news: parse_yn(params.is_news_yn.as_deref()),
        max_no: params.max_no,
        media_only: params.media_only.unwrap_or(false),
        sort: params.sort_by.as_deref().map(SortMode::parse).unwrap_or_default(),
        window: params.window.as_deref().map(TopWindow::parse).unwrap_or_default(),
    };

    serve_post_page(&state, &filter, page, page_size).await
}

/// Shared body of the feed and news list handlers.
async fn serve_post_page(
    state: &AppState,
    filter: &PostFilter,
    page: i64,
    page_size: i64,
) -> Response {
    let (posts, total) = match db::list_posts(state.db.pool(), filter, page, page_size).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Failed to fetch posts: {e:#}");
            return internal_error();
        }
    };

    let enriched = match enrich_with_media(state, posts).await {
        Ok(enriched) => enriched,
        Err(e) => {
            tracing::error!("Failed to fetch post media: {e:#}");
            return internal_error();
        }
    };

    Json(PagedResult::new(enriched, page, page_size, total)).into_response()
}

async fn get_post(State(state): State<AppState>, Path(no): Path<i64>) -> Response {
    let post = match db::get_post(state.db.pool(), no).await {
        Ok(Some(post)) => post,
        Ok(None) => {
            return json_error(StatusCode::NOT_FOUND, "Post not found");
        }
        Err(e) => {
            tracing::error!("Failed to fetch post: {e:#}");
            return internal_error();
        }
    };

    let media = match db::media_for_post(state.db.pool(), no).await {
        Ok(media) => media.into_iter().map(MediaItem::from).collect(),
        Err(e) => {
            tracing::error!("Failed to fetch post media: {e:#}");
            return internal_error();
        }
    };

    Json(PostWithMedia { post, media }).into_response()
}

async fn delete_post(State(state): State<AppState>, Path(no): Path<i64>) -> Response {
    match db::delete_post(state.db.pool(), no).await {
        Ok(true) => {
            tracing::info!(no, "Post deleted");
            Json(serde_json::json!({ "message": "Post deleted" })).into_response()
        }
        Ok(false) => json_error(StatusCode::NOT_FOUND, "Post not found"),
        Err(e) => {
            tracing::error!("Failed to delete post: {e:#}");
            internal_error()
        }
    }
}

async fn list_sites(State(state): State<AppState>) -> Response {
    match db::list_sites(state.db.pool()).await {
        Ok(sites) => Json(DataResult { data: sites }).into_response(),
        Err(e) => {
            tracing::error!("Failed to list sites: {e:#}");
            internal_error()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CountParams {
    count: Option<i64>,
}

async fn popular(State(state): State<AppState>, Query(params): Query<CountParams>) -> Response {
    let count = clamp_count(params.count, 10, 50);

    match db::popular_posts(state.db.pool(), count).await {
        Ok(posts) => Json(DataResult { data: posts }).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch popular posts: {e:#}");
            internal_error()
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsParams {
    page: Option<i64>,
    page_size: Option<i64>,
    keyword: Option<String>,
    sort_by: Option<String>,
}

async fn news(State(state): State<AppState>, Query(params): Query<NewsParams>) -> Response {
    let (page, page_size) = clamp_paging(params.page, params.page_size);

    let filter = PostFilter {
        keyword: params.keyword,
        news: Some(true),
        sort: params
            .sort_by
            .as_deref()
            .map_or(SortMode::New, SortMode::parse),
        ..PostFilter::default()
    };

    serve_post_page(&state, &filter, page, page_size).await
}

#[derive(Debug, Deserialize)]
pub struct WeekParams {
    yyyy: Option<i32>,
    mm: Option<u32>,
    w: Option<u32>,
    d: Option<u32>,
}

/// Posts per site in the week digest.
const DIGEST_POSTS_PER_SITE: usize = 5;

async fn week(State(state): State<AppState>, Query(params): Query<WeekParams>) -> Response {
    let (Some(yyyy), Some(mm), Some(w)) = (params.yyyy, params.mm, params.w) else {
        return json_error(StatusCode::BAD_REQUEST, "yyyy, mm and w are required");
    };

    let Some((start, end)) = db::week_digest_range(yyyy, mm, w, params.d) else {
        return json_error(StatusCode::BAD_REQUEST, "Requested week is out of range");
    };

    match db::week_digest(state.db.pool(), &start, &end, DIGEST_POSTS_PER_SITE).await {
        Ok(digests) => Json(DataResult { data: digests }).into_response(),
        Err(e) => {
            tracing::error!("Failed to build week digest: {e:#}");
            internal_error()
        }
    }
}

async fn trending(State(state): State<AppState>) -> Response {
    match db::trending_communities(state.db.pool()).await {
        Ok(communities) => Json(DataResult { data: communities }).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch trending communities: {e:#}");
            internal_error()
        }
    }
}

// ========== Stats ==========

async fn stats_summary(State(state): State<AppState>) -> Response {
    match db::stats_summary(state.db.pool()).await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch stats summary: {e:#}");
            internal_error()
        }
    }
}

async fn stats_sites(State(state): State<AppState>) -> Response {
    match db::site_stats(state.db.pool()).await {
        Ok(stats) => Json(DataResult { data: stats }).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch site stats: {e:#}");
            internal_error()
        }
    }
}

async fn stats_recent(State(state): State<AppState>, Query(params): Query<CountParams>) -> Response {
    let count = clamp_count(params.count, 20, 100);

    match db::recent_posts(state.db.pool(), count).await {
        Ok(posts) => Json(DataResult { data: posts }).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch recent posts: {e:#}");
            internal_error()
        }
    }
}

async fn stats_weekly(State(state): State<AppState>) -> Response {
    match db::weekly_crawl_histogram(state.db.pool()).await {
        Ok(histogram) => Json(DataResult { data: histogram }).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch weekly crawl histogram: {e:#}");
            internal_error()
        }
    }
}

async fn stats_latest(State(state): State<AppState>) -> Response {
    match db::latest_crawl(state.db.pool()).await {
        Ok(latest) => Json(serde_json::json!({ "latestCrawl": latest })).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch latest crawl timestamp: {e:#}");
            internal_error()
        }
    }
}

// ========== Access log ==========

async fn log_access(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let Some(ip) = resolve_client_ip(&headers, Some(addr.ip())) else {
        return json_error(
            StatusCode::BAD_REQUEST,
            "Could not determine client IP address",
        );
    };

    match db::record_access(state.db.pool(), &ip.to_string()).await {
        Ok(()) => Json(serde_json::json!({ "message": "Access logged successfully" }))
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to record access: {e:#}");
            internal_error()
        }
    }
}

async fn total_visitors(State(state): State<AppState>) -> Response {
    match db::total_visitors(state.db.pool()).await {
        Ok(count) => Json(serde_json::json!({ "totalVisitors": count })).into_response(),
        Err(e) => {
            tracing::error!("Failed to count visitors: {e:#}");
            internal_error()
        }
    }
}

async fn total_access(State(state): State<AppState>) -> Response {
    match db::total_access_count(state.db.pool()).await {
        Ok(count) => Json(serde_json::json!({ "totalAccess": count })).into_response(),
        Err(e) => {
            tracing::error!("Failed to sum access counts: {e:#}");
            internal_error()
        }
    }
}

async fn today_visitors(State(state): State<AppState>) -> Response {
    match db::today_visitors(state.db.pool()).await {
        Ok(count) => Json(serde_json::json!({ "todayVisitors": count })).into_response(),
        Err(e) => {
            tracing::error!("Failed to count today's visitors: {e:#}");
            internal_error()
        }
    }
}

async fn daily_stats_default(State(state): State<AppState>) -> Response {
    daily_stats_inner(&state, 7).await
}

async fn daily_stats(State(state): State<AppState>, Path(days): Path<i64>) -> Response {
    daily_stats_inner(&state, days).await
}

async fn daily_stats_inner(state: &AppState, days: i64) -> Response {
    let days = clamp_count(Some(days), 7, 90);

    match db::daily_visit_stats(state.db.pool(), days).await {
        Ok(series) => Json(DataResult { data: series }).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch daily visit stats: {e:#}");
            internal_error()
        }
    }
}

async fn recent_logs_default(State(state): State<AppState>) -> Response {
    recent_logs_inner(&state, 10).await
}

async fn recent_logs(State(state): State<AppState>, Path(count): Path<i64>) -> Response {
    recent_logs_inner(&state, count).await
}

async fn recent_logs_inner(state: &AppState, count: i64) -> Response {
    let count = clamp_count(Some(count), 10, 100);

    match db::recent_access_logs(state.db.pool(), count).await {
        Ok(logs) => Json(DataResult { data: logs }).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch recent access logs: {e:#}");
            internal_error()
        }
    }
}

async fn top_visitors_default(State(state): State<AppState>) -> Response {
    top_visitors_inner(&state, 10).await
}

async fn top_visitors(State(state): State<AppState>, Path(count): Path<i64>) -> Response {
    top_visitors_inner(&state, count).await
}

async fn top_visitors_inner(state: &AppState, count: i64) -> Response {
    let count = clamp_count(Some(count), 10, 100);

    match db::top_visitors(state.db.pool(), count).await {
        Ok(visitors) => Json(DataResult { data: visitors }).into_response(),
        Err(e) => {
            tracing::error!("Failed to fetch top visitors: {e:#}");
            internal_error()
        }
    }
}

async fn health() -> &'static str {
    "OK"
}
