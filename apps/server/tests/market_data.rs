use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use alfalyzer_market_data::{
    MarketDataError, MarketDataProvider, ProviderDescriptor, Quote, SearchResult, Symbol,
};
use alfalyzer_server::{api::app_router, build_state_with_providers, config::Config};
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use tower::ServiceExt;

/// base64 of 32 bytes of `k`.
const SECRET_B64: &str = "a2tra2tra2tra2tra2tra2tra2tra2tra2tra2tra2s=";

#[derive(Clone, Copy)]
enum Outcome {
    Price(f64),
    NotFound,
    Down,
}

struct FakeProvider {
    descriptor: ProviderDescriptor,
    outcome: Outcome,
    calls: AtomicUsize,
}

#[async_trait]
impl MarketDataProvider for FakeProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Quote, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let provider = self.descriptor.id.to_string();
        match self.outcome {
            Outcome::Price(price) => Ok(Quote::builder(symbol.as_str(), price)
                .previous_close(Some(price - 2.0))
                .volume(Some(1_000.0))
                .build()
                .unwrap()),
            Outcome::NotFound => Err(MarketDataError::SymbolNotFound {
                provider,
                symbol: symbol.to_string(),
            }),
            Outcome::Down => Err(MarketDataError::ProviderTransportError {
                provider,
                message: "connection refused".to_string(),
            }),
        }
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>, MarketDataError> {
        Ok(vec![
            SearchResult::new("AAPL", "Apple Inc", "Common Stock", "NASDAQ"),
            SearchResult::new("APLE", "Apple Hospitality REIT", "REIT", "NYSE"),
        ])
    }
}

fn fake(id: &'static str, priority: u8, outcome: Outcome) -> Arc<FakeProvider> {
    Arc::new(FakeProvider {
        descriptor: ProviderDescriptor::new(id, id, "http://localhost")
            .with_priority(priority)
            .with_search(true),
        outcome,
        calls: AtomicUsize::new(0),
    })
}

fn build_router(vars: &[(&str, &str)], providers: Vec<Arc<FakeProvider>>) -> Router {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let config = Config::from_lookup(|name| vars.get(name).cloned()).unwrap();
    let providers = providers
        .into_iter()
        .map(|p| p as Arc<dyn MarketDataProvider>)
        .collect();
    let state = build_state_with_providers(&config, providers);
    app_router(state, &config)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn quote_is_served_then_cached() {
    let primary = fake("PRIMARY", 1, Outcome::Price(187.5));
    let app = build_router(&[], vec![primary.clone()]);

    let (status, json) = send(&app, get("/api/market-data/quote/aapl")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["symbol"], "AAPL");
    assert_eq!(json["price"], 187.5);
    assert_eq!(json["provider"], "PRIMARY");
    assert_eq!(json["_cached"], false);
    assert!(json["_timestamp"].is_string());

    let (status, json) = send(&app, get("/api/market-data/quote/AAPL")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["_cached"], true);
    assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn quote_falls_back_to_next_provider() {
    let down = fake("DOWN", 1, Outcome::Down);
    let backup = fake("BACKUP", 2, Outcome::Price(10.0));
    let app = build_router(&[], vec![down, backup]);

    let (status, json) = send(&app, get("/api/market-data/quote/MSFT")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["provider"], "BACKUP");
}

#[tokio::test]
async fn malformed_symbol_is_rejected() {
    let primary = fake("PRIMARY", 1, Outcome::Price(1.0));
    let app = build_router(&[], vec![primary.clone()]);

    let (status, json) = send(&app, get("/api/market-data/quote/TOOLONGSYMBOL1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "INVALID_SYMBOL");
    assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_symbol_is_404_without_details_in_production() {
    let app = build_router(
        &[],
        vec![fake("A", 1, Outcome::NotFound), fake("B", 2, Outcome::NotFound)],
    );

    let (status, json) = send(&app, get("/api/market-data/quote/ZZZZ")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "QUOTE_NOT_FOUND");
    assert!(json.get("details").is_none());
}

#[tokio::test]
async fn outage_is_503_with_details_in_development() {
    let app = build_router(
        &[("MDS_ENV", "development")],
        vec![fake("A", 1, Outcome::Down), fake("B", 2, Outcome::NotFound)],
    );

    let (status, json) = send(&app, get("/api/market-data/quote/AAPL")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "MARKET_DATA_UNAVAILABLE");
    assert_eq!(json["code"], 503);
    assert!(json["details"]["A"].is_string());
    assert!(json["details"]["B"].is_string());
}

#[tokio::test]
async fn batch_reports_invalid_symbols_per_entry() {
    let app = build_router(&[], vec![fake("A", 1, Outcome::Price(5.0))]);

    let (status, json) = send(
        &app,
        post_json(
            "/api/market-data/quotes/batch",
            serde_json::json!({ "symbols": ["AAPL", "BAD!"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["quotes"].as_array().unwrap().len(), 1);
    assert_eq!(json["errors"]["BAD!"], "Invalid symbol format");
}

#[tokio::test]
async fn batch_limits_are_enforced() {
    let app = build_router(&[], vec![fake("A", 1, Outcome::Price(5.0))]);
    let symbols: Vec<String> = (0..21).map(|i| format!("S{i}")).collect();

    let (status, json) = send(
        &app,
        post_json(
            "/api/market-data/quotes/batch",
            serde_json::json!({ "symbols": symbols }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "INVALID_REQUEST");

    let (status, _) = send(
        &app,
        post_json("/api/market-data/quotes/batch", serde_json::json!({ "tickers": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn search_returns_results_and_count() {
    let app = build_router(&[], vec![fake("A", 1, Outcome::Price(5.0))]);

    let (status, json) = send(&app, get("/api/market-data/search?query=apple")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["count"], 2);
    assert_eq!(json["results"][0]["symbol"], "AAPL");
    assert_eq!(json["results"][0]["type"], "Common Stock");

    let (status, _) = send(&app, get("/api/market-data/search")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_and_test_endpoints() {
    let app = build_router(
        &[],
        vec![fake("A", 1, Outcome::Price(5.0)), fake("B", 2, Outcome::Down)],
    );

    let (status, json) = send(&app, get("/api/market-data/test")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["passed"], 1);
    assert_eq!(json["total"], 2);

    let (status, json) = send(&app, get("/api/market-data/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["providers"].as_array().unwrap().len(), 2);
    assert_eq!(json["quotas"].as_array().unwrap().len(), 2);
    assert!(json["cacheStats"]["capacity"].is_number());
}

#[tokio::test]
async fn warm_cache_accepts_defaults() {
    let app = build_router(&[], vec![fake("A", 1, Outcome::Price(5.0))]);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/market-data/warm-cache")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["count"], 8);

    let (status, json) = send(
        &app,
        post_json(
            "/api/market-data/warm-cache",
            serde_json::json!({ "symbols": ["msft", "BAD!"] }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["accepted"], serde_json::json!(["MSFT"]));
}

#[tokio::test]
async fn health_endpoints_are_public() {
    let app = build_router(&[("MDS_JWT_SECRET", SECRET_B64)], vec![]);

    let response = app.clone().oneshot(get("/api/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"ok");

    let (status, json) = send(&app, get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["server"], "alfalyzer-market-data");
}

#[tokio::test]
async fn bearer_token_guards_market_data_routes() {
    #[derive(serde::Serialize)]
    struct Claims {
        sub: &'static str,
        exp: usize,
    }

    let app = build_router(
        &[("MDS_JWT_SECRET", SECRET_B64)],
        vec![fake("A", 1, Outcome::Price(5.0))],
    );

    let (status, json) = send(&app, get("/api/market-data/quote/AAPL")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "UNAUTHORIZED");

    // The connectivity test stays open for health checks
    let (status, _) = send(&app, get("/api/market-data/test")).await;
    assert_eq!(status, StatusCode::OK);

    let claims = Claims {
        sub: "alfalyzer-web",
        exp: (chrono::Utc::now().timestamp() + 600) as usize,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(&[b'k'; 32]),
    )
    .unwrap();

    let request = Request::builder()
        .uri("/api/market-data/quote/AAPL")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["symbol"], "AAPL");

    let request = Request::builder()
        .uri("/api/market-data/quote/AAPL")
        .header(header::AUTHORIZATION, "Bearer not-a-token")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
