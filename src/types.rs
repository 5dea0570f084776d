//! Shared types for the AUGUR pipeline.
//!
//! These types form the data model used across all modules.
//! They are designed to be stable so that the pipeline, stores and
//! web layer can depend on them without circular references.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Tickers
// ---------------------------------------------------------------------------

/// Normalise a subject identifier: trimmed, uppercase, 1–5 ASCII letters.
pub fn normalize_ticker(raw: &str) -> Option<String> {
    let t = raw.trim().to_ascii_uppercase();
    let valid = (1..=5).contains(&t.len()) && t.chars().all(|c| c.is_ascii_alphabetic());
    valid.then_some(t)
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Asset class reported by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetClass {
    Stock,
    Crypto,
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetClass::Stock => write!(f, "Stock"),
            AssetClass::Crypto => write!(f, "Crypto"),
        }
    }
}

impl std::str::FromStr for AssetClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stock" => Ok(AssetClass::Stock),
            "crypto" => Ok(AssetClass::Crypto),
            _ => Err(anyhow::anyhow!("Unknown asset type: {s}")),
        }
    }
}

/// Model provider identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Xai,
    OpenAi,
}

impl Provider {
    pub const ALL: &'static [Provider] = &[Provider::Xai, Provider::OpenAi];

    /// Stable key used in API payloads and cache keys.
    pub fn key(&self) -> &'static str {
        match self {
            Provider::Xai => "xai",
            Provider::OpenAi => "openai",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xai" | "grok" => Ok(Provider::Xai),
            "openai" | "gpt" => Ok(Provider::OpenAi),
            _ => Err(anyhow::anyhow!("Unknown provider: {s}")),
        }
    }
}

/// Which providers a prediction request should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderSelection {
    One(Provider),
    Both,
}

impl ProviderSelection {
    pub fn providers(&self) -> Vec<Provider> {
        match self {
            ProviderSelection::One(p) => vec![*p],
            ProviderSelection::Both => Provider::ALL.to_vec(),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            ProviderSelection::One(p) => p.key(),
            ProviderSelection::Both => "both",
        }
    }
}

impl Default for ProviderSelection {
    fn default() -> Self {
        ProviderSelection::One(Provider::OpenAi)
    }
}

impl fmt::Display for ProviderSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

impl std::str::FromStr for ProviderSelection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("both") {
            Ok(ProviderSelection::Both)
        } else {
            s.parse::<Provider>().map(ProviderSelection::One)
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A single-subject prediction, validated against the JSON schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub ticker: String,
    pub asset_type: AssetClass,
    pub current_price: Decimal,
    pub price_currency: String,
    #[serde(default)]
    pub price_timestamp: Option<String>,
    pub target_date: String,
    pub predicted_price: Decimal,
    pub reasoning: String,
    /// Wall-clock duration of the model call; attached by us, not the model.
    #[serde(rename = "_elapsed_seconds", default)]
    pub elapsed_seconds: f64,
}

impl fmt::Display for PredictionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) {} {} -> {} by {}",
            self.ticker,
            self.asset_type,
            self.current_price,
            self.price_currency,
            self.predicted_price,
            self.target_date,
        )
    }
}

/// One accepted line of a batch response: `TICKER|CURRENT|TARGET|PCT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchQuote {
    pub ticker: String,
    pub current_price: Decimal,
    pub target_price: Decimal,
    pub percentage_change: Decimal,
}

impl fmt::Display for BatchQuote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.ticker, self.current_price, self.target_price, self.percentage_change
        )
    }
}

/// A point on a subject's prediction trend line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    /// Unix seconds at capture time.
    pub timestamp: i64,
    pub current_price: Decimal,
    pub predicted_price: Decimal,
}

impl From<&PredictionRecord> for HistoryPoint {
    fn from(record: &PredictionRecord) -> Self {
        HistoryPoint {
            timestamp: chrono::Utc::now().timestamp(),
            current_price: record.current_price,
            predicted_price: record.predicted_price,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures of a pipeline step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// Upstream call failed after exhausting retries. Not retried further.
    #[error("Transport failure ({provider}) after {attempts} attempts: {message}")]
    TransportFailure {
        provider: String,
        attempts: u32,
        message: String,
    },

    #[error("No structured output found in model response")]
    NoStructuredOutput,

    #[error("Schema defect: {0}")]
    SchemaDefect(String),
}

/// Trade-domain validation failures. Rejected synchronously, never retried.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TradeError {
    #[error("Missing required trade data: {0}")]
    InvalidTrade(String),

    #[error("Not enough cash to complete purchase: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: Decimal, available: Decimal },

    #[error("Not enough shares to sell: {ticker} requested {requested}, held {held}")]
    InsufficientShares {
        ticker: String,
        requested: u64,
        held: u64,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
