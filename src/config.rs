//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (API keys) are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::pipeline::correction::CorrectionPolicy;
use crate::types::{normalize_ticker, Provider};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub universe: UniverseConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub portfolio: PortfolioConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Date every prediction targets (YYYY-MM-DD).
    pub target_date: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Correction rounds allowed after the initial attempt.
    #[serde(default = "default_max_corrections")]
    pub max_corrections: u32,
    #[serde(default = "default_batch_cooldown_secs")]
    pub batch_cooldown_secs: u64,
    /// Transport retries per model call (total attempts = retries + 1).
    #[serde(default = "default_call_retries")]
    pub call_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

/// Upper bound for `pipeline.call_retries`.
pub const MAX_CALL_RETRIES: u32 = 10;

/// Upper bound for `cache.ttl_secs` (one week).
pub const MAX_CACHE_TTL_SECS: u64 = 7 * 24 * 3600;

fn default_batch_size() -> usize {
    10
}
fn default_max_corrections() -> u32 {
    2
}
fn default_batch_cooldown_secs() -> u64 {
    10
}
fn default_call_retries() -> u32 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    1000
}

impl PipelineConfig {
    pub fn correction_policy(&self) -> CorrectionPolicy {
        CorrectionPolicy {
            max_corrections: self.max_corrections,
            call_retries: self.call_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    pub fn batch_cooldown(&self) -> Duration {
        Duration::from_secs(self.batch_cooldown_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_secs: 300 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { capacity: 20 }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    pub xai: Option<ProviderConfig>,
    pub openai: Option<ProviderConfig>,
}

impl ProvidersConfig {
    pub fn get(&self, provider: Provider) -> Option<&ProviderConfig> {
        match provider {
            Provider::Xai => self.xai.as_ref(),
            Provider::OpenAi => self.openai.as_ref(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub model: String,
    pub api_key_env: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Ignored by providers that reject sampling parameters.
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// The asset universe the scheduled prediction cycle covers.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct UniverseConfig {
    #[serde(default)]
    pub stocks: Vec<String>,
    #[serde(default)]
    pub crypto: Vec<String>,
}

impl UniverseConfig {
    /// Stocks first, then crypto, original order preserved.
    pub fn all_tickers(&self) -> Vec<String> {
        self.stocks.iter().chain(self.crypto.iter()).cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stocks.is_empty() && self.crypto.is_empty()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub provider: Provider,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
            provider: Provider::Xai,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub csv_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            csv_path: "predictions.csv".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PortfolioConfig {
    pub initial_cash: Decimal,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            initial_cash: dec!(100000),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 5000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let mut config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Normalise the universe and reject values the core cannot use.
    fn validate(&mut self) -> Result<()> {
        self.universe.stocks = normalize_universe("stocks", &self.universe.stocks)?;
        self.universe.crypto = normalize_universe("crypto", &self.universe.crypto)?;

        if self.pipeline.call_retries > MAX_CALL_RETRIES {
            bail!(
                "pipeline.call_retries = {} exceeds the maximum of {MAX_CALL_RETRIES}",
                self.pipeline.call_retries
            );
        }
        if self.cache.ttl_secs > MAX_CACHE_TTL_SECS {
            bail!(
                "cache.ttl_secs = {} exceeds the maximum of {MAX_CACHE_TTL_SECS}",
                self.cache.ttl_secs
            );
        }
        Ok(())
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

/// Trimmed, uppercased tickers. Any entry that is not a ticker fails the load.
fn normalize_universe(list: &str, raw: &[String]) -> Result<Vec<String>> {
    raw.iter()
        .map(|entry| match normalize_ticker(entry) {
            Some(t) => Ok(t),
            None => bail!("Invalid ticker in universe.{list}: '{entry}'"),
        })
        .collect()
}
