//! HTTP surface driven through the router with scripted providers.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use augur::dashboard::{build_router, ApiState, AppState};
use augur::engine::Orchestrator;
use augur::llm::ModelProvider;
use augur::pipeline::CorrectionPolicy;
use augur::store::{HistoryStore, PortfolioBook, ResultCache};
use augur::types::Provider;

use crate::mock_provider::ScriptedProvider;

const TSLA: &str = r#"{"ticker":"TSLA","asset_type":"stock","current_price":396.1,
    "price_currency":"usd","target_date":"2025-09-19","predicted_price":410,
    "reasoning":"Delivery numbers and   robotaxi news."}"#;

fn state(providers: Vec<Arc<dyn ModelProvider>>, max_corrections: u32) -> AppState {
    let orchestrator = Orchestrator::new(
        providers,
        CorrectionPolicy {
            max_corrections,
            call_retries: 0,
            retry_backoff: Duration::ZERO,
        },
        "2025-09-19",
        ResultCache::with_ttl_secs(300),
        HistoryStore::new(20),
    );
    let mut csv = std::env::temp_dir();
    csv.push(format!("augur_it_api_{}.csv", uuid::Uuid::new_v4()));
    Arc::new(ApiState {
        orchestrator,
        portfolios: PortfolioBook::new(dec!(100000)),
        csv_path: csv.to_string_lossy().to_string(),
    })
}

async fn get_json(state: &AppState, uri: &str) -> (StatusCode, serde_json::Value) {
    let resp = build_router(state.clone())
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_json(state: &AppState, uri: &str, body: &str) -> (StatusCode, serde_json::Value) {
    let resp = build_router(state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_repeat_request_is_served_from_cache() {
    let openai = ScriptedProvider::new(Provider::OpenAi).always(TSLA);
    let shared: Arc<dyn ModelProvider> = Arc::new(openai.clone());
    let state = state(vec![shared], 0);

    let (status, first) = get_json(&state, "/predict/tsla").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["results"]["openai"]["price_currency"], "USD");
    assert_eq!(
        first["results"]["openai"]["reasoning"],
        "Delivery numbers and robotaxi news."
    );
    assert!(first["results"]["openai"]["_elapsed_seconds"].is_number());

    let (_, second) = get_json(&state, "/predict/TSLA?provider=openai").await;
    assert_eq!(openai.calls(), 1);
    assert_eq!(first["results"], second["results"]);
}

#[tokio::test]
async fn test_one_provider_failing_does_not_hide_the_other() {
    let xai = ScriptedProvider::new(Provider::Xai).fail("HTTP 500");
    let openai = ScriptedProvider::new(Provider::OpenAi).always(TSLA);
    let providers: Vec<Arc<dyn ModelProvider>> = vec![Arc::new(xai), Arc::new(openai)];
    let state = state(providers, 0);

    let (status, json) = get_json(&state, "/predict/TSLA?provider=both").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["results"]["xai"]["error"].as_str().unwrap().contains("HTTP 500"));
    assert_eq!(json["results"]["openai"]["predicted_price"], 410.0);
    assert_eq!(json["history"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_corrected_single_prediction() {
    let xai = ScriptedProvider::new(Provider::Xai)
        .reply(r#"{"ticker":"TSLA","current_price":"396","predicted_price":410}"#)
        .reply(TSLA);
    let shared: Arc<dyn ModelProvider> = Arc::new(xai.clone());
    let state = state(vec![shared], 2);

    let (_, json) = get_json(&state, "/predict/TSLA?provider=xai").await;
    assert_eq!(json["results"]["xai"]["current_price"], 396.1);
    assert_eq!(xai.calls(), 2);
    assert!(xai.prompts()[1].contains("TSLA"));
}

#[tokio::test]
async fn test_paper_trading_round_trip() {
    let state = state(Vec::new(), 0);

    let (status, json) = post_json(
        &state,
        "/trade",
        r#"{"userId":"user1","ticker":"TSLA","action":"buy","shares":10,"price":180.50}"#,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cash"], 98195.0);

    let (status, json) = post_json(
        &state,
        "/trade",
        r#"{"userId":"user1","ticker":"TSLA","action":"sell","shares":11,"price":190}"#,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let (_, json) = get_json(&state, "/portfolio/user1").await;
    assert_eq!(json["positions"]["TSLA"]["shares"], 10);

    let (_, json) = post_json(
        &state,
        "/trade",
        r#"{"userId":"user1","ticker":"TSLA","action":"sell","shares":10,"price":190.00}"#,
    )
    .await;
    assert_eq!(json["cash"], 100095.0);
    assert!(json["positions"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_unconfigured_provider_reports_error() {
    let state = state(Vec::new(), 0);
    let (status, json) = get_json(&state, "/predict/BTC?provider=xai").await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["results"]["xai"]["error"].is_string());
}
