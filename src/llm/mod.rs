//! LLM providers for structured price predictions.
//!
//! Defines the `ModelProvider` trait and provides implementations for
//! Grok (xAI) and GPT (OpenAI). Transport retries live here too so the
//! pipeline sees exactly one outcome per logical call.

pub mod grok;
pub mod openai;

use anyhow::Result;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::types::{PipelineError, Provider};

/// System message shared by every provider.
pub const SYSTEM_PROMPT: &str = "You are a markets researcher. You may use web search to ground facts. \
     Return ONLY the structured output described in the user's instructions: \
     no markdown, no commentary, no citations.";

/// Abstraction over a model provider.
///
/// One call to `complete` is one attempt; it returns the raw text the
/// model produced or the transport error that prevented it.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    fn provider(&self) -> Provider;

    /// Model identifier string.
    fn model_name(&self) -> String;
}

/// Raw text from a successful call plus its wall-clock duration.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub elapsed_seconds: f64,
}

/// Call `provider` up to `retries + 1` times with exponential backoff.
///
/// Elapsed time is measured from the first attempt, so it includes time
/// spent on failed attempts and backoff.
pub async fn invoke_with_retries(
    provider: &dyn ModelProvider,
    prompt: &str,
    retries: u32,
    backoff: Duration,
) -> Result<ModelReply, PipelineError> {
    let start = Instant::now();
    let mut last_error = String::new();

    for attempt in 0..=retries {
        if attempt > 0 {
            let delay = backoff_delay(backoff, attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, provider = %provider.provider(), "Retrying model call");
            tokio::time::sleep(delay).await;
        }

        match provider.complete(prompt).await {
            Ok(text) => {
                let elapsed_seconds = start.elapsed().as_secs_f64();
                info!(
                    provider = %provider.provider(),
                    model = %provider.model_name(),
                    attempt,
                    elapsed = format!("{elapsed_seconds:.3}s"),
                    "Model call complete"
                );
                return Ok(ModelReply {
                    text,
                    elapsed_seconds,
                });
            }
            Err(e) => {
                warn!(provider = %provider.provider(), attempt, error = %e, "Model call failed");
                last_error = e.to_string();
            }
        }
    }

    Err(PipelineError::TransportFailure {
        provider: provider.provider().key().to_string(),
        attempts: retries + 1,
        message: last_error,
    })
}

/// Upper bound on the wait between two attempts.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// `base * 2^(attempt - 1)`, capped at [`MAX_RETRY_DELAY`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    if base.is_zero() {
        return Duration::ZERO;
    }
    2u32.checked_pow(attempt.saturating_sub(1))
        .and_then(|factor| base.checked_mul(factor))
        .map_or(MAX_RETRY_DELAY, |delay| delay.min(MAX_RETRY_DELAY))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
