//! Structured logging.
//!
//! Uses the `tracing` crate. `RUST_LOG` takes precedence over the configured
//! level so operators can turn up verbosity without editing the config.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a configured log level.
pub fn default_directive(log_level: &str) -> String {
    format!("http_balancer={log_level},tower_http={log_level}")
}

/// Install the global subscriber. Calling it twice is harmless.
pub fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(log_level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
