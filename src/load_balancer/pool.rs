//! Backend pool management.
//!
//! # Responsibilities
//! - Own the fixed, ordered list of backends
//! - Apply the configured selection policy
//! - Expose snapshots for logging and the admin API

use std::sync::Arc;

use crate::config::{BackendConfig, ConfigError, Strategy};
use crate::config::validation::{parse_backend_address, ValidationError};
use crate::load_balancer::{LoadBalancer, backend::{Backend, BackendStats}, selector_for};

/// The set of backends requests are balanced over.
#[derive(Debug)]
pub struct BackendPool {
    backends: Vec<Arc<Backend>>,
    selector: Box<dyn LoadBalancer>,
}

impl BackendPool {
    /// Build a pool from configuration. Any unparseable address is fatal.
    pub fn from_config(configs: &[BackendConfig], strategy: Strategy) -> Result<Self, ConfigError> {
        let mut backends = Vec::with_capacity(configs.len());
        let mut errors: Vec<ValidationError> = Vec::new();

        for config in configs {
            match parse_backend_address(&config.address) {
                Ok(url) => backends.push(Arc::new(Backend::new(config.display_name(), url))),
                Err(e) => errors.push(e),
            }
        }

        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        tracing::info!(
            backends = backends.len(),
            strategy = strategy.as_str(),
            "Backend pool created"
        );

        Ok(Self::new(backends, selector_for(strategy)))
    }

    pub fn new(backends: Vec<Arc<Backend>>, selector: Box<dyn LoadBalancer>) -> Self {
        Self { backends, selector }
    }

    /// Select a live backend according to the policy.
    pub fn select(&self) -> Option<Arc<Backend>> {
        let selected = self.selector.next_server(&self.backends);
        if selected.is_none() {
            tracing::debug!(backend_count = self.backends.len(), "No live backends in pool");
            for b in &self.backends {
                tracing::debug!(backend = %b.name(), alive = b.is_alive(), in_flight = b.in_flight(), "Backend status");
            }
        }
        selected
    }

    /// All backends in pool order (for probing).
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn alive_count(&self) -> usize {
        self.backends.iter().filter(|b| b.is_alive()).count()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.selector.name()
    }

    pub fn snapshot(&self) -> Vec<BackendStats> {
        self.backends.iter().map(|b| b.snapshot()).collect()
    }
}
