//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server
//! - Track in-flight requests (for Least Connections LB)
//! - Track liveness (written by the prober and the dispatcher)
//! - Accumulate latency statistics for completed requests
//!
//! Each backend owns its own synchronization: atomics for the liveness flag and
//! the in-flight count, a mutex for the latency pair. Backends never contend
//! with each other.

use serde::Serialize;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use url::Url;

use crate::config::validation::{parse_backend_address, ValidationError};

#[derive(Debug, Default, Clone, Copy)]
struct LatencyStats {
    total: Duration,
    completed: u64,
}

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    name: String,
    url: Url,
    /// `host:port` used for TCP probes and as the upstream authority.
    authority: String,
    alive: AtomicBool,
    in_flight: AtomicUsize,
    stats: Mutex<LatencyStats>,
}

impl Backend {
    /// Create a new backend. Backends start out alive.
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        let host = url.host_str().unwrap_or_default();
        let authority = match url.port_or_known_default() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Self {
            name: name.into(),
            url,
            authority,
            alive: AtomicBool::new(true),
            in_flight: AtomicUsize::new(0),
            stats: Mutex::new(LatencyStats::default()),
        }
    }

    /// Parse `address` and create a backend named after it.
    pub fn parse(address: &str) -> Result<Self, ValidationError> {
        let url = parse_backend_address(address)?;
        Ok(Self::new(address, url))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    // --- Liveness ---

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Set the liveness flag. Returns the previous value.
    pub fn set_alive(&self, alive: bool) -> bool {
        self.alive.swap(alive, Ordering::AcqRel)
    }

    // --- Load ---

    /// Number of requests currently being forwarded to this backend.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Begin a dispatch: increments the in-flight count.
    /// The returned guard decrements it exactly once when dropped.
    pub fn start_request(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            backend: self.clone(),
        }
    }

    /// Record a completed request.
    pub fn record_completion(&self, elapsed: Duration) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.total += elapsed;
        stats.completed += 1;
    }

    /// Consistent copy of this backend's observable state.
    pub fn snapshot(&self) -> BackendStats {
        let stats = *self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let total_latency_ms = stats.total.as_secs_f64() * 1000.0;
        let average_latency_ms = if stats.completed == 0 {
            0.0
        } else {
            total_latency_ms / stats.completed as f64
        };
        BackendStats {
            name: self.name.clone(),
            address: self.url.to_string(),
            alive: self.is_alive(),
            in_flight: self.in_flight(),
            completed: stats.completed,
            total_latency_ms,
            average_latency_ms,
        }
    }
}

/// Point-in-time view of a backend, for logging and the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStats {
    pub name: String,
    pub address: String,
    pub alive: bool,
    pub in_flight: usize,
    pub completed: u64,
    pub total_latency_ms: f64,
    pub average_latency_ms: f64,
}

/// A RAII guard that holds one unit of a backend's in-flight count.
///
/// Dropping the guard (success, failure, cancellation or unwinding) releases it.
#[derive(Debug)]
pub struct InFlightGuard {
    backend: Arc<Backend>,
}

impl InFlightGuard {
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

impl Deref for InFlightGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.backend.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}
