use std::sync::Arc;

use alfalyzer_market_data::{
    BatchQuotes, DiagnosticsReport, MarketDataError, Quote, SearchResult, ServiceStatus, Symbol,
    DEFAULT_CANARY,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{ApiError, ApiResult},
    main_lib::AppState,
};

fn market_error(state: &AppState, err: MarketDataError) -> ApiError {
    ApiError::from_market(err, state.expose_error_details)
}

#[derive(Serialize)]
struct QuoteResponse {
    #[serde(flatten)]
    quote: Quote,
    #[serde(rename = "_timestamp")]
    responded_at: DateTime<Utc>,
    #[serde(rename = "_cached")]
    cached: bool,
}

async fn get_quote(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<QuoteResponse>> {
    let resolved = state
        .resolver
        .resolve(&symbol)
        .await
        .map_err(|e| market_error(&state, e))?;
    Ok(Json(QuoteResponse {
        quote: resolved.quote,
        responded_at: Utc::now(),
        cached: resolved.cached,
    }))
}

#[derive(Deserialize)]
struct BatchRequest {
    symbols: Vec<String>,
}

async fn get_batch_quotes(
    State(state): State<Arc<AppState>>,
    body: Result<Json<BatchRequest>, JsonRejection>,
) -> ApiResult<Json<BatchQuotes>> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let batch = state
        .resolver
        .resolve_batch(&body.symbols)
        .await
        .map_err(|e| market_error(&state, e))?;
    Ok(Json(batch))
}

#[derive(Deserialize)]
struct SearchQuery {
    query: Option<String>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
    count: usize,
    #[serde(rename = "_cached")]
    cached: bool,
}

async fn search_symbols(
    State(state): State<Arc<AppState>>,
    Query(q): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let query = q
        .query
        .ok_or_else(|| ApiError::BadRequest("query parameter is required".to_string()))?;
    let outcome = state
        .resolver
        .search(&query)
        .await
        .map_err(|e| market_error(&state, e))?;
    Ok(Json(SearchResponse {
        count: outcome.count(),
        cached: outcome.cached,
        results: outcome.results,
    }))
}

/// Unauthenticated connectivity check. 503 when no provider answers.
async fn test_providers(
    State(state): State<Arc<AppState>>,
) -> ApiResult<(StatusCode, Json<DiagnosticsReport>)> {
    let canary = Symbol::parse(DEFAULT_CANARY).map_err(|e| ApiError::Internal(e.to_string()))?;
    let report = state.reporter.diagnostics(&canary).await;
    let status = if report.success {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(report)))
}

async fn get_status(State(state): State<Arc<AppState>>) -> Json<ServiceStatus> {
    Json(state.reporter.status())
}

#[derive(Deserialize)]
struct DiagnosticsQuery {
    symbol: Option<String>,
}

async fn run_diagnostics(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DiagnosticsQuery>,
) -> ApiResult<Json<DiagnosticsReport>> {
    let raw = q.symbol.as_deref().unwrap_or(DEFAULT_CANARY);
    let canary = Symbol::parse(raw).map_err(|e| market_error(&state, e))?;
    Ok(Json(state.reporter.diagnostics(&canary).await))
}

#[derive(Deserialize)]
struct WarmRequest {
    symbols: Option<Vec<String>>,
}

#[derive(Serialize)]
struct WarmResponse {
    accepted: Vec<String>,
    count: usize,
    message: &'static str,
}

/// Fire-and-forget: returns as soon as the warm task is spawned.
async fn warm_cache(
    State(state): State<Arc<AppState>>,
    body: Option<Json<WarmRequest>>,
) -> (StatusCode, Json<WarmResponse>) {
    let requested = body.and_then(|Json(b)| b.symbols);
    let (accepted, _task) = state.warmer.spawn_warm(requested.as_deref());
    let accepted: Vec<String> = accepted.into_iter().map(|s| s.to_string()).collect();
    (
        StatusCode::ACCEPTED,
        Json(WarmResponse {
            count: accepted.len(),
            accepted,
            message: "Cache warming started",
        }),
    )
}

pub fn public_router() -> Router<Arc<AppState>> {
    Router::new().route("/market-data/test", get(test_providers))
}

pub fn protected_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/market-data/quote/{symbol}", get(get_quote))
        .route("/market-data/quotes/batch", post(get_batch_quotes))
        .route("/market-data/search", get(search_symbols))
        .route("/market-data/status", get(get_status))
        .route("/market-data/diagnostics", get(run_diagnostics))
        .route("/market-data/warm-cache", post(warm_cache))
}
