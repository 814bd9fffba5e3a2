//! HTTP load balancer.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌───────────────────────────────────────────────┐
//!                         │                 LOAD BALANCER                 │
//!                         │                                               │
//!     Client Request      │  ┌─────────┐    ┌────────────┐    ┌─────────┐ │
//!     ────────────────────┼─▶│  http   │───▶│  dispatch  │───▶│  pool   │ │
//!                         │  │ server  │    │ retry loop │    │selector │ │
//!                         │  └─────────┘    └─────┬──────┘    └────┬────┘ │
//!                         │                       │                │      │
//!                         │                       ▼                ▼      │
//!     Client Response     │                ┌────────────┐    ┌─────────┐ │
//!     ◀───────────────────┼────────────────│ http client│    │ backend │ │
//!                         │                └─────┬──────┘    │ records │ │
//!                         │                      │           └────▲────┘ │
//!                         │                      ▼                │      │
//!                         │                  Backends ◀──TCP── prober    │
//!                         └───────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use http_balancer::config::{loader, validation, BackendConfig, ConfigError, ProxyConfig, Strategy};
use http_balancer::observability::{logging, metrics};
use http_balancer::{lifecycle, HttpServer, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "http-balancer")]
#[command(about = "HTTP load balancer with liveness probing", long_about = None)]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Backend address (repeatable), replaces the configured backends
    #[arg(long = "backend", value_name = "URL")]
    backends: Vec<String>,

    /// Selection policy: round_robin or least_connections
    #[arg(short, long)]
    strategy: Option<Strategy>,
}

fn build_config(args: &Args) -> Result<ProxyConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => loader::read_config(path)?,
        None => ProxyConfig::default(),
    };

    if let Some(bind) = &args.bind {
        config.listener.bind_address = bind.clone();
    }
    if !args.backends.is_empty() {
        config.backends = args.backends.iter().map(BackendConfig::new).collect();
    }
    if let Some(strategy) = args.strategy {
        config.load_balancer.strategy = strategy;
    }

    validation::validate_config(&config).map_err(ConfigError::from)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = build_config(&args)?;

    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        backends = config.backends.len(),
        strategy = config.load_balancer.strategy.as_str(),
        probe_interval_secs = config.health_check.interval_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(config)?;

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        lifecycle::signals::wait_for_signal().await;
        trigger.trigger();
    });

    server.run(listener, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
