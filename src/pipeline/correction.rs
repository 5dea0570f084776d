//! Corrective retry controller.
//!
//! Drives one output contract against one provider until the accumulated
//! records cover every expected subject or the correction budget runs out.
//! Incomplete coverage is not an error: the caller gets the partial record
//! set back together with the outstanding defects.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::contract::OutputContract;
use super::validator::{validate, validate_merged, Defect, Subject};
use crate::llm::{invoke_with_retries, ModelProvider};
use crate::types::PipelineError;

// ---------------------------------------------------------------------------
// Policy & state
// ---------------------------------------------------------------------------

/// Bounds for one pipeline invocation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionPolicy {
    /// Correction rounds after the initial attempt.
    pub max_corrections: u32,
    /// Transport retries per model call.
    pub call_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for CorrectionPolicy {
    fn default() -> Self {
        Self {
            max_corrections: 2,
            call_retries: 2,
            retry_backoff: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrectionState {
    Initial,
    Correcting { round: u32 },
    Terminal,
}

/// Final result of a pipeline invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome<R> {
    /// Accepted records, in expected-subject order.
    pub records: Vec<R>,
    /// Outstanding defects. Empty means full success.
    pub defects: Vec<Defect>,
    /// Model calls made (initial + corrections).
    pub attempts: u32,
    pub elapsed_seconds: f64,
}

impl<R> PipelineOutcome<R> {
    pub fn is_complete(&self) -> bool {
        self.defects.is_empty()
    }

    pub fn defect_messages(&self) -> Vec<String> {
        self.defects.iter().map(ToString::to_string).collect()
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct CorrectionController<'a, C: OutputContract> {
    contract: &'a C,
    provider: &'a dyn ModelProvider,
    policy: CorrectionPolicy,
}

impl<'a, C: OutputContract> CorrectionController<'a, C> {
    pub fn new(contract: &'a C, provider: &'a dyn ModelProvider, policy: CorrectionPolicy) -> Self {
        Self {
            contract,
            provider,
            policy,
        }
    }

    /// Run the pipeline for `expected`.
    ///
    /// Returns `Err` only when the initial call exhausts its transport
    /// retries. A transport failure during a correction round ends the loop
    /// and is reported as a `CallFailed` defect next to the partial data.
    pub async fn run(&self, expected: &[String]) -> Result<PipelineOutcome<C::Record>, PipelineError> {
        let start = Instant::now();
        let mut merged: HashMap<String, C::Record> = HashMap::new();
        let mut defects: Vec<Defect> = Vec::new();
        let mut attempts = 0u32;
        let mut state = if expected.is_empty() {
            CorrectionState::Terminal
        } else {
            CorrectionState::Initial
        };

        while state != CorrectionState::Terminal {
            let ask: Vec<String> = match state {
                CorrectionState::Correcting { .. } => expected
                    .iter()
                    .filter(|t| !merged.contains_key(t.as_str()))
                    .cloned()
                    .collect(),
                _ => expected.to_vec(),
            };
            let prompt = match state {
                CorrectionState::Correcting { round } => {
                    info!(
                        provider = %self.provider.provider(),
                        round,
                        missing = %ask.join(","),
                        defects = defects.len(),
                        "Requesting correction"
                    );
                    self.contract.correction_prompt(&defects, &ask)
                }
                _ => self.contract.initial_prompt(&ask),
            };

            attempts += 1;
            let reply = match invoke_with_retries(
                self.provider,
                &prompt,
                self.policy.call_retries,
                self.policy.retry_backoff,
            )
            .await
            {
                Ok(reply) => reply,
                Err(e) if state == CorrectionState::Initial => return Err(e),
                Err(e) => {
                    warn!(provider = %self.provider.provider(), error = %e, "Correction call failed, keeping partial results");
                    defects.push(Defect::CallFailed(e.to_string()));
                    break;
                }
            };

            let mut extraction = self.contract.extract(&reply.text, reply.elapsed_seconds);
            if state != CorrectionState::Initial {
                // Already-valid subjects are never overwritten.
                extraction.records.retain(|r| !merged.contains_key(r.subject()));
            }

            let round = validate(extraction.records, extraction.defects, &ask);
            let round_defects: Vec<Defect> = round
                .defects
                .iter()
                .filter(|d| !matches!(d, Defect::Missing(_)))
                .cloned()
                .collect();
            for (subject, record) in round.accepted {
                merged.entry(subject).or_insert(record);
            }

            let full = validate_merged(&merged, expected);
            if full.is_clean() {
                defects.clear();
                state = CorrectionState::Terminal;
                continue;
            }

            defects = round_defects;
            defects.extend(full.defects);
            for d in &defects {
                debug!(provider = %self.provider.provider(), defect = %d, "Validation defect");
            }

            let corrections_done = attempts - 1;
            state = if corrections_done >= self.policy.max_corrections {
                warn!(
                    provider = %self.provider.provider(),
                    attempts,
                    accepted = merged.len(),
                    expected = expected.len(),
                    "Correction budget exhausted, returning partial results"
                );
                CorrectionState::Terminal
            } else {
                CorrectionState::Correcting {
                    round: corrections_done + 1,
                }
            };
        }

        let records = expected.iter().filter_map(|t| merged.remove(t.as_str())).collect();

        Ok(PipelineOutcome {
            records,
            defects,
            attempts,
            elapsed_seconds: start.elapsed().as_secs_f64(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
