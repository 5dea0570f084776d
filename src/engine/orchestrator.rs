//! Multi-provider orchestrator.
//!
//! Runs the single-subject pipeline against every selected provider at
//! once and combines the results only after all of them have finished.
//! Successful payloads are cached per (ticker, selection) and every
//! successful provider result is appended to the ticker's history.

use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::llm::ModelProvider;
use crate::pipeline::contract::SingleJson;
use crate::pipeline::correction::{CorrectionController, CorrectionPolicy};
use crate::prompt::PromptBuilder;
use crate::store::{HistoryStore, ResultCache};
use crate::types::{HistoryPoint, PredictionRecord, Provider, ProviderSelection};

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

/// Why a provider produced no record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderFailure {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub defects: Vec<String>,
    #[serde(rename = "_elapsed_seconds")]
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProviderResult {
    Record(PredictionRecord),
    Failure(ProviderFailure),
}

impl ProviderResult {
    pub fn record(&self) -> Option<&PredictionRecord> {
        match self {
            ProviderResult::Record(r) => Some(r),
            ProviderResult::Failure(_) => None,
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        match self {
            ProviderResult::Record(r) => r.elapsed_seconds,
            ProviderResult::Failure(f) => f.elapsed_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionPayload {
    pub ticker: String,
    pub target_date: String,
    /// Keyed by provider label (`xai`, `openai`).
    pub results: BTreeMap<String, ProviderResult>,
    pub history: Vec<HistoryPoint>,
}

impl PredictionPayload {
    pub fn has_success(&self) -> bool {
        self.results.values().any(|r| r.record().is_some())
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct Orchestrator {
    providers: Vec<Arc<dyn ModelProvider>>,
    policy: CorrectionPolicy,
    target_date: String,
    cache: ResultCache<PredictionPayload>,
    history: HistoryStore,
}

impl Orchestrator {
    pub fn new(
        providers: Vec<Arc<dyn ModelProvider>>,
        policy: CorrectionPolicy,
        target_date: impl Into<String>,
        cache: ResultCache<PredictionPayload>,
        history: HistoryStore,
    ) -> Self {
        Self {
            providers,
            policy,
            target_date: target_date.into(),
            cache,
            history,
        }
    }

    pub fn from_config(cfg: &AppConfig, providers: Vec<Arc<dyn ModelProvider>>) -> Self {
        Self::new(
            providers,
            cfg.pipeline.correction_policy(),
            cfg.pipeline.target_date.clone(),
            ResultCache::with_ttl_secs(cfg.cache.ttl_secs),
            HistoryStore::new(cfg.history.capacity),
        )
    }

    pub fn configured(&self) -> Vec<Provider> {
        self.providers.iter().map(|p| p.provider()).collect()
    }

    fn provider(&self, which: Provider) -> Option<Arc<dyn ModelProvider>> {
        self.providers.iter().find(|p| p.provider() == which).cloned()
    }

    /// Cache-aware prediction used by the API.
    ///
    /// A hit returns the cached payload with a fresh history snapshot. A
    /// miss runs the providers, records history for each success and
    /// caches the payload when at least one provider succeeded.
    pub async fn predict(&self, ticker: &str, selection: ProviderSelection) -> PredictionPayload {
        if let Some(mut cached) = self.cache.get(ticker, selection.key()) {
            debug!(ticker, selection = %selection, "Serving cached prediction");
            cached.history = self.history.snapshot(ticker);
            return cached;
        }

        let mut payload = self.compare(ticker, selection, None).await;

        for record in payload.results.values().filter_map(ProviderResult::record) {
            self.history.append(ticker, HistoryPoint::from(record));
        }
        payload.history = self.history.snapshot(ticker);

        if payload.has_success() {
            self.cache.put(ticker, selection.key(), payload.clone());
        } else {
            warn!(ticker, selection = %selection, "No provider succeeded, result not cached");
        }
        payload
    }

    /// Run the selected providers concurrently, bypassing cache and history.
    pub async fn compare(
        &self,
        ticker: &str,
        selection: ProviderSelection,
        target_date: Option<&str>,
    ) -> PredictionPayload {
        let target_date = target_date.unwrap_or(&self.target_date).to_string();
        let prompts = PromptBuilder::for_today(target_date.clone());
        let subject = vec![ticker.to_string()];

        info!(ticker, selection = %selection, target_date = %target_date, "Running prediction");

        let runs = selection
            .providers()
            .into_iter()
            .map(|which| {
                let prompts = &prompts;
                let subject = &subject;
                async move { (which, self.run_one(which, prompts, subject).await) }
            });
        let results: BTreeMap<String, ProviderResult> = join_all(runs)
            .await
            .into_iter()
            .map(|(which, result)| (which.key().to_string(), result))
            .collect();

        PredictionPayload {
            ticker: ticker.to_string(),
            target_date,
            results,
            history: Vec::new(),
        }
    }

    async fn run_one(&self, which: Provider, prompts: &PromptBuilder, subject: &[String]) -> ProviderResult {
        let start = Instant::now();
        let Some(provider) = self.provider(which) else {
            return ProviderResult::Failure(ProviderFailure {
                error: format!("provider '{which}' is not configured"),
                defects: Vec::new(),
                elapsed_seconds: 0.0,
            });
        };

        let contract = SingleJson::new(prompts.clone());
        let controller = CorrectionController::new(&contract, provider.as_ref(), self.policy);

        match controller.run(subject).await {
            Ok(mut outcome) if outcome.is_complete() && !outcome.records.is_empty() => {
                let mut record = outcome.records.remove(0);
                record.elapsed_seconds = outcome.elapsed_seconds;
                info!(
                    provider = %which,
                    ticker = %record.ticker,
                    current = %record.current_price,
                    predicted = %record.predicted_price,
                    attempts = outcome.attempts,
                    "Prediction accepted"
                );
                ProviderResult::Record(record)
            }
            Ok(outcome) => {
                warn!(provider = %which, defects = ?outcome.defect_messages(), "Prediction rejected");
                ProviderResult::Failure(ProviderFailure {
                    error: format!("no valid prediction after {} attempts", outcome.attempts),
                    defects: outcome.defect_messages(),
                    elapsed_seconds: outcome.elapsed_seconds,
                })
            }
            Err(e) => ProviderResult::Failure(ProviderFailure {
                error: e.to_string(),
                defects: Vec::new(),
                elapsed_seconds: start.elapsed().as_secs_f64(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
