//! End-to-end pipeline scenarios.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use augur::config::AppConfig;
use augur::engine::{run_prediction_cycle, BatchScheduler, Orchestrator};
use augur::llm::ModelProvider;
use augur::pipeline::{CorrectionController, CorrectionPolicy, Defect, LineBatch, SingleJson};
use augur::prompt::PromptBuilder;
use augur::storage;
use augur::store::{HistoryStore, ResultCache};
use augur::types::{HistoryPoint, Provider, ProviderSelection};

use crate::mock_provider::ScriptedProvider;

fn prompts() -> PromptBuilder {
    PromptBuilder::new("2025-09-19", NaiveDate::from_ymd_opt(2025, 9, 1).unwrap())
}

fn policy(max_corrections: u32, call_retries: u32) -> CorrectionPolicy {
    CorrectionPolicy {
        max_corrections,
        call_retries,
        retry_backoff: Duration::ZERO,
    }
}

fn tickers(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_partial_batch_recovered_in_one_correction() {
    let provider = ScriptedProvider::new(Provider::Xai)
        .reply("AAA|10|12|20\nBBB|about five|6|20")
        .reply("BBB|5|6|20\nCCC|7|7|0");
    let contract = LineBatch::new(prompts());

    let outcome = CorrectionController::new(&contract, &provider, policy(2, 0))
        .run(&tickers(&["AAA", "BBB", "CCC"]))
        .await
        .unwrap();

    assert!(outcome.is_complete(), "defects: {:?}", outcome.defects);
    assert_eq!(outcome.attempts, 2);
    let got: Vec<(&str, _)> = outcome
        .records
        .iter()
        .map(|q| (q.ticker.as_str(), q.current_price))
        .collect();
    assert_eq!(got, vec![("AAA", dec!(10)), ("BBB", dec!(5)), ("CCC", dec!(7))]);

    let sent = provider.prompts();
    assert!(sent[0].contains("AAA, BBB, CCC"));
    assert!(sent[1].contains("ONLY for these assets: BBB, CCC"));
    assert!(sent[1].contains("non-numeric price in line: 'BBB|about five|6|20'"));
    assert!(!sent[1].contains("ONLY for these assets: AAA"));
}

#[tokio::test]
async fn test_non_improving_responses_stop_at_bound() {
    let provider = ScriptedProvider::new(Provider::Xai).always("I am unable to provide prices.");
    let contract = LineBatch::new(prompts());

    let outcome = CorrectionController::new(&contract, &provider, policy(2, 0))
        .run(&tickers(&["AAA", "BBB"]))
        .await
        .unwrap();

    assert_eq!(provider.calls(), 3);
    assert!(!outcome.is_complete());
    assert!(outcome.records.is_empty());
    assert!(outcome.defects.contains(&Defect::Missing(tickers(&["AAA", "BBB"]))));
}

#[tokio::test]
async fn test_strictly_improving_converges() {
    let provider = ScriptedProvider::new(Provider::OpenAi)
        .reply("AAA|1|2|100")
        .reply("BBB|1|2|100")
        .reply("CCC|1|2|100");
    let contract = LineBatch::new(prompts());

    let outcome = CorrectionController::new(&contract, &provider, policy(2, 0))
        .run(&tickers(&["AAA", "BBB", "CCC"]))
        .await
        .unwrap();

    assert!(outcome.is_complete());
    assert!(outcome.attempts <= 3);
}

#[tokio::test]
async fn test_transport_retries_are_transparent() {
    let provider = ScriptedProvider::new(Provider::Xai)
        .fail("HTTP 503")
        .fail("connection reset")
        .reply("AAA|10|12|20");
    let contract = LineBatch::new(prompts());

    let outcome = CorrectionController::new(&contract, &provider, policy(2, 2))
        .run(&tickers(&["AAA"]))
        .await
        .unwrap();

    assert!(outcome.is_complete());
    assert_eq!(outcome.attempts, 1);
    assert_eq!(provider.calls(), 3);
}

#[tokio::test]
async fn test_valid_single_json_has_no_defects() {
    let provider = ScriptedProvider::new(Provider::OpenAi).reply(
        r#"```json
{"ticker":"ETH","asset_type":"crypto","current_price":4312.55,"price_currency":"USD",
 "price_timestamp":"2025-09-01T12:00:00Z","target_date":"2025-09-19",
 "predicted_price":4500,"reasoning":"Staking inflows and ETF demand."}
```"#,
    );
    let contract = SingleJson::new(prompts());

    let outcome = CorrectionController::new(&contract, &provider, policy(2, 0))
        .run(&tickers(&["ETH"]))
        .await
        .unwrap();

    assert!(outcome.is_complete());
    let record = &outcome.records[0];
    assert_eq!(record.ticker, "ETH");
    assert_eq!(record.current_price, dec!(4312.55));
    assert_eq!(record.predicted_price, dec!(4500));
    assert!(!record.reasoning.is_empty());
}

#[tokio::test]
async fn test_orchestrator_history_and_cache() {
    let xai = ScriptedProvider::new(Provider::Xai).always(
        r#"{"ticker":"TSLA","asset_type":"stock","current_price":396,"target_date":"2025-09-19",
            "predicted_price":410,"reasoning":"Deliveries."}"#,
    );
    let shared: Arc<dyn ModelProvider> = Arc::new(xai.clone());
    let orchestrator = Orchestrator::new(
        vec![shared],
        policy(0, 0),
        "2025-09-19",
        ResultCache::with_ttl_secs(300),
        HistoryStore::new(20),
    );

    let sel = ProviderSelection::One(Provider::Xai);
    let first = orchestrator.predict("TSLA", sel).await;
    let second = orchestrator.predict("TSLA", sel).await;

    assert_eq!(xai.calls(), 1);
    assert_eq!(first.results, second.results);
    assert_eq!(second.history.len(), 1);
}

#[test]
fn test_history_buffer_keeps_last_twenty() {
    let store = HistoryStore::new(20);
    for i in 0..25 {
        store.append(
            "BTC",
            HistoryPoint {
                timestamp: i,
                current_price: dec!(1),
                predicted_price: dec!(2),
            },
        );
    }
    let stamps: Vec<i64> = store.snapshot("BTC").iter().map(|p| p.timestamp).collect();
    assert_eq!(stamps, (5..25).collect::<Vec<_>>());
}

#[test]
fn test_cache_ttl_boundary() {
    let cache: ResultCache<&str> = ResultCache::with_ttl_secs(300);
    let t = Utc::now();
    cache.put_at("TSLA", "openai", "payload", t);
    let eps = ChronoDuration::milliseconds(10);
    assert_eq!(cache.get_at("TSLA", "openai", t + cache.ttl() - eps), Some("payload"));
    assert_eq!(cache.get_at("TSLA", "openai", t + cache.ttl() + eps), None);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_continues_after_failed_batch() {
    let provider = ScriptedProvider::new(Provider::Xai)
        .fail("HTTP 429")
        .reply("CCC|7|8|14.29\nDDD|3|3.3|10");
    let scheduler = BatchScheduler::new(2, Duration::from_secs(10), policy(0, 0));

    let report = scheduler
        .run(&provider, &prompts(), &tickers(&["AAA", "BBB", "CCC", "DDD"]))
        .await;

    assert_eq!(report.batches.len(), 2);
    assert!(report.batches[0].error.is_some());
    let got: Vec<&str> = report.quotes.iter().map(|q| q.ticker.as_str()).collect();
    assert_eq!(got, vec!["CCC", "DDD"]);
}

#[tokio::test]
async fn test_prediction_cycle_appends_csv() {
    let mut path = std::env::temp_dir();
    path.push(format!("augur_it_cycle_{}.csv", uuid::Uuid::new_v4()));
    let path = path.to_string_lossy().to_string();

    let cfg = AppConfig::from_toml_str(&format!(
        r#"
        [pipeline]
        target_date = "2025-09-19"
        batch_size = 2
        batch_cooldown_secs = 0
        max_corrections = 0
        call_retries = 0
        [universe]
        stocks = ["TSLA"]
        crypto = [" btc"]
        [storage]
        csv_path = "{path}"
        "#
    ))
    .unwrap();

    let provider = ScriptedProvider::new(Provider::Xai).reply("TSLA|400|420|5\nBTC|60000|66000|10");
    let written = run_prediction_cycle(&cfg, &provider).await.unwrap();
    assert_eq!(written, 2);

    let rows = storage::read_predictions(&path).unwrap();
    assert_eq!(rows.len(), 2);
    let btc = rows.iter().find(|r| r.ticker == "BTC").unwrap();
    assert_eq!(btc.asset_type, "Crypto");
    assert_eq!(btc.target_price, dec!(66000));
    assert_eq!(btc.target_date, "2025-09-19");
    let tsla = rows.iter().find(|r| r.ticker == "TSLA").unwrap();
    assert_eq!(tsla.asset_type, "Stock");
    assert_eq!(tsla.prediction_date, btc.prediction_date);

    // An empty cycle writes nothing.
    let silent = ScriptedProvider::new(Provider::Xai).always("no data");
    assert_eq!(run_prediction_cycle(&cfg, &silent).await.unwrap(), 0);
    assert_eq!(storage::read_predictions(&path).unwrap().len(), 2);

    std::fs::remove_file(&path).unwrap();
}
