//! AUGUR: schema-enforced LLM price predictions
//!
//! Entry point. Loads configuration, initialises structured logging and
//! dispatches to one of three commands: `serve` (API + scheduled cycles),
//! `predict` (one ticker, printed) or `cycle` (one batch cycle to CSV).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use augur::config::AppConfig;
use augur::dashboard::{self, ApiState};
use augur::engine::{report, run_prediction_cycle, Orchestrator};
use augur::llm::grok::GrokClient;
use augur::llm::openai::OpenAiClient;
use augur::llm::ModelProvider;
use augur::storage;
use augur::store::PortfolioBook;
use augur::types::{normalize_ticker, Provider, ProviderSelection};

const BANNER: &str = r#"
    _   _   _  ____ _   _ ____
   / \ | | | |/ ___| | | |  _ \
  / _ \| | | | |  _| | | | |_) |
 / ___ \ |_| | |_| | |_| |  _ <
/_/   \_\___/ \____|\___/|_| \_\

  Schema-enforced LLM price predictions
  v0.1.0
"#;

#[derive(Debug, Parser)]
#[command(name = "augur", version, about = "Structured price predictions from LLM providers")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the API server and the scheduled prediction cycle.
    Serve,
    /// Predict one ticker and print the result.
    Predict {
        ticker: String,
        /// xai, openai or both (aliases: grok, gpt).
        #[arg(long, default_value = "both")]
        provider: String,
        /// Overrides `pipeline.target_date`.
        #[arg(long)]
        target_date: Option<String>,
        /// Print a single JSON object instead of the console report.
        #[arg(long)]
        json: bool,
    },
    /// Run one batch prediction cycle and append it to the CSV file.
    Cycle,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli.config)?;

    init_logging();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg).await,
        Command::Predict {
            ticker,
            provider,
            target_date,
            json,
        } => predict(cfg, &ticker, &provider, target_date.as_deref(), json).await,
        Command::Cycle => {
            let provider = scheduled_provider(&cfg)?;
            let written = run_prediction_cycle(&cfg, provider.as_ref()).await?;
            info!(written, path = %cfg.storage.csv_path, "Cycle finished");
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn serve(cfg: AppConfig) -> Result<()> {
    println!("{BANNER}");
    info!(
        target_date = %cfg.pipeline.target_date,
        batch_size = cfg.pipeline.batch_size,
        tickers = cfg.universe.all_tickers().len(),
        "AUGUR starting up"
    );

    let providers = build_providers(&cfg)?;
    if providers.is_empty() {
        warn!("No model provider has an API key; predictions will report errors");
    }

    let state = Arc::new(ApiState {
        orchestrator: Orchestrator::from_config(&cfg, providers.clone()),
        portfolios: PortfolioBook::new(cfg.portfolio.initial_cash),
        csv_path: cfg.storage.csv_path.clone(),
    });
    info!(providers = ?state.orchestrator.configured(), "Orchestrator ready");

    if cfg.dashboard.enabled {
        dashboard::spawn_dashboard(state.clone(), cfg.dashboard.port).await?;
    }

    let scheduled = if cfg.schedule.enabled {
        let found = providers
            .iter()
            .find(|p| p.provider() == cfg.schedule.provider)
            .cloned();
        if found.is_none() {
            warn!(provider = %cfg.schedule.provider, "Scheduled provider not configured, cycles disabled");
        }
        found
    } else {
        None
    };

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let Some(provider) = scheduled else {
        info!("Scheduler disabled. Press Ctrl+C to stop.");
        shutdown.await.context("Failed to listen for shutdown signal")?;
        info!("AUGUR shut down cleanly.");
        return Ok(());
    };

    if storage::is_empty(&cfg.storage.csv_path) {
        info!(path = %cfg.storage.csv_path, "No predictions on disk, running initial cycle");
        if let Err(e) = run_prediction_cycle(&cfg, provider.as_ref()).await {
            error!(error = %e, "Initial cycle failed");
        }
    }

    let period = Duration::from_secs(cfg.schedule.interval_secs.max(1));
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

    info!(
        interval_secs = period.as_secs(),
        provider = %provider.provider(),
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_prediction_cycle(&cfg, provider.as_ref()).await {
                    error!(error = %e, "Cycle failed, continuing to next");
                }
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("AUGUR shut down cleanly.");
    Ok(())
}

async fn predict(
    cfg: AppConfig,
    ticker: &str,
    provider: &str,
    target_date: Option<&str>,
    as_json: bool,
) -> Result<()> {
    let Some(ticker) = normalize_ticker(ticker) else {
        bail!("Invalid ticker: {ticker}");
    };
    let selection: ProviderSelection = provider.parse()?;

    let orchestrator = Orchestrator::from_config(&cfg, build_providers(&cfg)?);
    let start = Instant::now();
    let payload = orchestrator.compare(&ticker, selection, target_date).await;
    let overall = start.elapsed().as_secs_f64();

    if as_json {
        let out = report::render_json(selection, &payload, overall);
        println!("{}", serde_json::to_string(&out).context("Failed to serialise result")?);
    } else {
        print!("{}", report::render_text(&payload, overall));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Instantiate every configured provider whose API key is available.
fn build_providers(cfg: &AppConfig) -> Result<Vec<Arc<dyn ModelProvider>>> {
    let mut providers: Vec<Arc<dyn ModelProvider>> = Vec::new();

    for &which in Provider::ALL {
        let Some(pc) = cfg.providers.get(which) else {
            continue;
        };
        let key = match AppConfig::resolve_env(&pc.api_key_env) {
            Ok(k) if !k.trim().is_empty() => k,
            _ => {
                warn!(provider = %which, env = %pc.api_key_env, "API key not set, provider disabled");
                continue;
            }
        };

        let client: Arc<dyn ModelProvider> = match which {
            Provider::Xai => Arc::new(GrokClient::new(
                key,
                Some(pc.model.clone()),
                pc.max_tokens,
                pc.temperature,
                pc.seed,
            )?),
            Provider::OpenAi => Arc::new(OpenAiClient::new(key, Some(pc.model.clone()), pc.max_tokens)?),
        };
        info!(provider = %which, model = %pc.model, "Provider ready");
        providers.push(client);
    }

    Ok(providers)
}

fn scheduled_provider(cfg: &AppConfig) -> Result<Arc<dyn ModelProvider>> {
    build_providers(cfg)?
        .into_iter()
        .find(|p| p.provider() == cfg.schedule.provider)
        .with_context(|| format!("Provider '{}' is not configured", cfg.schedule.provider))
}

/// Initialise the `tracing` subscriber. Logs go to stderr so `predict
/// --json` keeps stdout clean.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("augur=info"));

    let json_logging = std::env::var("AUGUR_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
