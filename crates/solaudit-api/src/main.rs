use anyhow::Context;
use clap::Parser;
use solaudit_api::{AppState, Server};
use solaudit_core::{ConfigManager, LoggingConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "solaudit-server",
    version,
    about = "Smart-contract audit service: static analysis plus an LLM narrative summary",
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to ./.solaudit.toml, then ~/.solaudit/config.toml)
    #[arg(short, long, env = "SOLAUDIT_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Answer every summary with the fixed baseline text instead of calling a provider
    #[arg(long)]
    baseline: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let manager = ConfigManager::load_with_overrides(cli.config.as_deref(), |config| {
        if let Some(host) = cli.host.clone() {
            config.server.host = host;
        }
        if let Some(port) = cli.port {
            config.server.port = port;
        }
        if let Some(level) = cli.log_level.clone() {
            config.logging.level = level;
        }
        if cli.baseline {
            config.llm.use_baseline = true;
        }
    })
    .context("failed to load configuration")?;

    init_tracing(&manager.config().logging, cli.log_level.is_some());
    if let Some(path) = manager.config_path() {
        info!(path = %path.display(), "Using config file");
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Starting SolAudit server");
    let state = AppState::new(manager.into_config())?;
    Server::new(state).run().await
}

/// A directive string in RUST_LOG wins over the configured level unless `--log-level` was given.
fn init_tracing(logging: &LoggingConfig, level_from_cli: bool) {
    let fallback = || {
        EnvFilter::new(format!(
            "{level},tower_http={level}",
            level = logging.level
        ))
    };
    let filter = if level_from_cli {
        fallback()
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback())
    };

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format.as_str() {
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .init(),
    }
}
