//! Batch scheduler and the periodic prediction cycle.
//!
//! The universe is split into contiguous batches that run one after the
//! other against the same provider, with a cool-down between batches. A
//! failed batch is logged and skipped; the cycle keeps whatever the other
//! batches produced.

use anyhow::Result;
use chrono::Utc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{AppConfig, PipelineConfig};
use crate::llm::ModelProvider;
use crate::pipeline::contract::LineBatch;
use crate::pipeline::correction::{CorrectionController, CorrectionPolicy};
use crate::prompt::PromptBuilder;
use crate::storage::{self, PredictionRow};
use crate::types::{AssetClass, BatchQuote};

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

/// Contiguous, order-preserving batches. A zero size is treated as one.
pub fn partition(universe: &[String], batch_size: usize) -> Vec<Vec<String>> {
    universe
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub index: usize,
    pub tickers: Vec<String>,
    pub accepted: usize,
    pub attempts: u32,
    pub defects: Vec<String>,
    /// Set when the batch produced nothing because its initial call failed.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerReport {
    /// Accepted quotes from every batch, in universe order.
    pub quotes: Vec<BatchQuote>,
    pub batches: Vec<BatchSummary>,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch_size: usize,
    cooldown: Duration,
    policy: CorrectionPolicy,
}

impl BatchScheduler {
    pub fn new(batch_size: usize, cooldown: Duration, policy: CorrectionPolicy) -> Self {
        Self {
            batch_size,
            cooldown,
            policy,
        }
    }

    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self::new(cfg.batch_size, cfg.batch_cooldown(), cfg.correction_policy())
    }

    pub async fn run(
        &self,
        provider: &dyn ModelProvider,
        prompts: &PromptBuilder,
        universe: &[String],
    ) -> SchedulerReport {
        let batches = partition(universe, self.batch_size);
        let total = batches.len();
        let contract = LineBatch::new(prompts.clone());
        let controller = CorrectionController::new(&contract, provider, self.policy);
        let mut report = SchedulerReport::default();

        for (index, tickers) in batches.into_iter().enumerate() {
            info!(
                batch = index + 1,
                of = total,
                tickers = %tickers.join(","),
                "Processing batch"
            );

            let summary = match controller.run(&tickers).await {
                Ok(outcome) => {
                    if !outcome.is_complete() {
                        warn!(
                            batch = index + 1,
                            accepted = outcome.records.len(),
                            defects = ?outcome.defect_messages(),
                            "Batch finished with outstanding defects"
                        );
                    }
                    let summary = BatchSummary {
                        index,
                        tickers,
                        accepted: outcome.records.len(),
                        attempts: outcome.attempts,
                        defects: outcome.defect_messages(),
                        error: None,
                    };
                    report.quotes.extend(outcome.records);
                    summary
                }
                Err(e) => {
                    error!(batch = index + 1, error = %e, "Batch failed, skipping");
                    BatchSummary {
                        index,
                        tickers,
                        accepted: 0,
                        attempts: 1,
                        defects: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            report.batches.push(summary);

            if index + 1 < total && !self.cooldown.is_zero() {
                info!(secs = self.cooldown.as_secs_f64(), "Cooling down before next batch");
                tokio::time::sleep(self.cooldown).await;
            }
        }

        report
    }
}

// ---------------------------------------------------------------------------
// Prediction cycle
// ---------------------------------------------------------------------------

/// Flatten accepted quotes into CSV rows for one cycle.
pub fn to_rows(
    quotes: &[BatchQuote],
    crypto: &[String],
    prediction_date: &str,
    target_date: &str,
) -> Vec<PredictionRow> {
    quotes
        .iter()
        .map(|q| {
            let asset_type = if crypto.iter().any(|c| c.eq_ignore_ascii_case(&q.ticker)) {
                AssetClass::Crypto
            } else {
                AssetClass::Stock
            };
            PredictionRow {
                ticker: q.ticker.clone(),
                asset_type: asset_type.to_string(),
                prediction_date: prediction_date.to_string(),
                target_date: target_date.to_string(),
                target_price: q.target_price,
                percentage_change: q.percentage_change,
                current_price_at_prediction: q.current_price,
            }
        })
        .collect()
}

/// Run the whole universe through the scheduler and append the result to
/// the CSV sink. Returns the number of rows written.
pub async fn run_prediction_cycle(cfg: &AppConfig, provider: &dyn ModelProvider) -> Result<usize> {
    if cfg.universe.is_empty() {
        warn!("Universe is empty, nothing to predict");
        return Ok(0);
    }
    let universe = cfg.universe.all_tickers();

    info!(
        provider = %provider.provider(),
        tickers = universe.len(),
        batch_size = cfg.pipeline.batch_size,
        "Starting prediction cycle"
    );

    let prompts = PromptBuilder::for_today(cfg.pipeline.target_date.clone());
    let scheduler = BatchScheduler::from_config(&cfg.pipeline);
    let report = scheduler.run(provider, &prompts, &universe).await;

    if report.quotes.is_empty() {
        warn!("No predictions were generated in this cycle");
        return Ok(0);
    }

    let prediction_date = Utc::now().to_rfc3339();
    let rows = to_rows(
        &report.quotes,
        &cfg.universe.crypto,
        &prediction_date,
        &cfg.pipeline.target_date,
    );
    let written = storage::append_predictions(&cfg.storage.csv_path, &rows)?;

    info!(
        written,
        expected = universe.len(),
        batches = report.batches.len(),
        failed_batches = report.batches.iter().filter(|b| b.error.is_some()).count(),
        "Prediction cycle complete"
    );
    Ok(written)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
