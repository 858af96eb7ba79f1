use crate::constants::{
    DEFAULT_PAGE, DEFAULT_PAGE_LIMIT, RESPONSE_MAX_AGE_SECS, RESPONSE_SWR_SECS,
};
use crate::models::EnrichedStock;
use crate::server::AppState;
use crate::services::{HealthReport, PerformanceSample, SnapshotStats};
use axum::{
    extract::{Query, State},
    http::{header::CACHE_CONTROL, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, instrument};

/// Query parameters for the /picks endpoint.
///
/// Numeric parameters arrive as raw strings so malformed values fall back to
/// defaults instead of rejecting the request.
#[derive(Debug, Deserialize, Clone)]
pub struct PicksQuery {
    pub limit: Option<String>,
    pub page: Option<String>,
    pub tag: Option<String>,
    pub market: Option<String>,
    pub sentiment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PicksResponse {
    pub success: bool,
    pub data: PicksData,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceBlock>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PicksData {
    pub stocks: Vec<EnrichedStock>,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub has_more: bool,
}

/// Diagnostic block attached to responses in non-production builds only.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceBlock {
    pub db_query_time_ms: u64,
    pub cache_status: &'static str,
    pub total_response_time_ms: u64,
    pub items_returned: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

fn parse_count(raw: Option<&str>, default: usize) -> usize {
    raw.and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

/// Sort by last mention, newest first. `sort_by` is stable, so records
/// mentioned on the same instant keep their original order.
fn sort_by_latest_mention(stocks: &mut [EnrichedStock]) {
    stocks.sort_by(|a, b| b.last_mentioned_at.cmp(&a.last_mentioned_at));
}

/// Conjunctive filters: tag substring-matches any tag on the record;
/// market and sentiment match exactly, with "all" meaning no filter.
fn apply_filters(
    stocks: Vec<EnrichedStock>,
    tag: Option<&str>,
    market: Option<&str>,
    sentiment: Option<&str>,
) -> Vec<EnrichedStock> {
    stocks
        .into_iter()
        .filter(|stock| {
            if let Some(tag) = tag.filter(|t| !t.is_empty()) {
                if !stock.tags.iter().any(|t| t.contains(tag)) {
                    return false;
                }
            }
            if let Some(market) = market.filter(|m| !m.is_empty() && !m.eq_ignore_ascii_case("all"))
            {
                if !stock.market.as_str().eq_ignore_ascii_case(market) {
                    return false;
                }
            }
            if let Some(sentiment) =
                sentiment.filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
            {
                if !stock.sentiment.as_str().eq_ignore_ascii_case(sentiment) {
                    return false;
                }
            }
            true
        })
        .collect()
}

/// Slice out one page. Returns (page items, post-filter total, has_more).
fn paginate(stocks: Vec<EnrichedStock>, page: usize, limit: usize) -> (Vec<EnrichedStock>, usize, bool) {
    let total = stocks.len();
    // Saturating math: limit/page come straight from the query string, and
    // absurdly large values must clamp to an empty page, not overflow.
    let offset = page.saturating_sub(1).saturating_mul(limit);
    let has_more = offset.saturating_add(limit) < total;

    let items = stocks
        .into_iter()
        .skip(offset)
        .take(limit)
        .collect();

    (items, total, has_more)
}

fn cacheable_ok(body: PicksResponse) -> Response {
    (
        StatusCode::OK,
        [(
            CACHE_CONTROL,
            format!(
                "public, max-age={}, s-maxage={}, stale-while-revalidate={}",
                RESPONSE_MAX_AGE_SECS, RESPONSE_MAX_AGE_SECS, RESPONSE_SWR_SECS
            ),
        )],
        Json(body),
    )
        .into_response()
}

fn uncacheable_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(CACHE_CONTROL, "no-store".to_string())],
        Json(ErrorResponse {
            success: false,
            error: ErrorBody {
                message: message.to_string(),
            },
        }),
    )
        .into_response()
}

/// GET /picks - ranked, filterable, paginated pick list
///
/// Examples:
/// - /picks (default limit=10, page=1)
/// - /picks?limit=5&page=2
/// - /picks?tag=ai&market=NASDAQ&sentiment=positive
#[instrument(skip(app_state))]
pub async fn get_picks_handler(
    State(app_state): State<AppState>,
    Query(params): Query<PicksQuery>,
) -> Response {
    let start = Instant::now();
    debug!("Received request for picks with params: {:?}", params);

    let limit = parse_count(params.limit.as_deref(), DEFAULT_PAGE_LIMIT);
    let page = parse_count(params.page.as_deref(), DEFAULT_PAGE);

    let pipeline = app_state.pipeline.clone();
    let db_start = Instant::now();
    let result = app_state
        .snapshot
        .get_or_compute(|| async move { pipeline.run().await })
        .await;
    let db_query_time_ms = db_start.elapsed().as_millis() as u64;

    let (snapshot, cache_hit) = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            // Full detail goes to the log, never into the response body.
            error!(error = %e, "Aggregation pipeline failed");
            let elapsed = start.elapsed().as_millis() as u64;
            app_state
                .metrics
                .record(PerformanceSample::new(elapsed, false))
                .await;
            return uncacheable_error("Failed to load stock picks");
        }
    };

    let mut stocks = (*snapshot).clone();
    sort_by_latest_mention(&mut stocks);
    let stocks = apply_filters(
        stocks,
        params.tag.as_deref(),
        params.market.as_deref(),
        params.sentiment.as_deref(),
    );
    let (items, total, has_more) = paginate(stocks, page, limit);
    let items_returned = items.len();

    let total_response_time_ms = start.elapsed().as_millis() as u64;
    app_state
        .metrics
        .record(PerformanceSample::new(total_response_time_ms, cache_hit))
        .await;

    let performance = if cfg!(debug_assertions) {
        Some(PerformanceBlock {
            db_query_time_ms,
            cache_status: if cache_hit { "HIT" } else { "MISS" },
            total_response_time_ms,
            items_returned,
        })
    } else {
        None
    };

    cacheable_ok(PicksResponse {
        success: true,
        data: PicksData {
            stocks: items,
            total,
            page,
            limit,
            has_more,
        },
        performance,
    })
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: crate::services::HealthState,
    pub uptime_secs: u64,
    pub snapshot_cache: SnapshotStats,
    pub price_cache_entries: usize,
    pub metrics: HealthReport,
    pub current_system_time: String,
}

/// GET /health - cache and performance health snapshot
pub async fn health_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    let report = app_state.metrics.health_status().await;

    Json(HealthResponse {
        status: report.status,
        uptime_secs: app_state.started_at.elapsed().as_secs(),
        snapshot_cache: app_state.snapshot.stats().await,
        price_cache_entries: app_state.quotes.cached_entry_count().await,
        metrics: report,
        current_system_time: Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub averages: Option<crate::services::metrics::MetricAverages>,
    pub health: HealthReport,
}

/// GET /metrics - rolling averages over the last 10 minutes
pub async fn metrics_handler(State(app_state): State<AppState>) -> impl IntoResponse {
    Json(MetricsResponse {
        averages: app_state.metrics.averages(10).await,
        health: app_state.metrics.health_status().await,
    })
}
