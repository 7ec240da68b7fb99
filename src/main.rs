//! webrelay server binary.
//!
//! ```text
//!     Client ──▶ /proxy?url=<target> ──▶ buffered relay ──▶ Target
//!     Client ──▶ /file?url=<target>  ──▶ streaming relay ──▶ Target
//! ```
//!
//! Configuration comes from an optional TOML file, then the environment,
//! then command-line flags.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use webrelay::config::{apply_env_overrides, load_config, validate_config, ConfigError, ProxyConfig};
use webrelay::lifecycle::{self, signals, Shutdown};
use webrelay::observability::logging;

#[derive(Parser)]
#[command(name = "webrelay")]
#[command(about = "HTTP relay with buffered and streaming modes", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the file and the environment
    #[arg(short, long)]
    bind: Option<String>,
}

fn load(cli: &Cli) -> Result<ProxyConfig, ConfigError> {
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    let mut config = apply_env_overrides(config)?;

    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
        validate_config(&config).map_err(ConfigError::Validation)?;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load(&cli)?;

    logging::init(&config.observability);

    tracing::info!("webrelay v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        relay_timeout_secs = config.relay.timeout_secs,
        pool_max_idle_per_host = config.relay.pool_max_idle_per_host,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let (server, listener) = lifecycle::start(config).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    signals::spawn_signal_listener(shutdown.clone());

    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
