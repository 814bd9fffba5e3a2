//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher asks for a backend
//!     → pool.rs (fixed, ordered backend list)
//!     → Apply load balancing algorithm:
//!         - round_robin.rs (rotate through backends)
//!         - least_conn.rs (pick backend with fewest in-flight requests)
//!     → backend.rs (in-flight guard, latency stats)
//!     → Return backend or None (pool exhausted)
//! ```
//!
//! # Design Decisions
//! - Backend state is per-record; the selector only owns its own cursor
//! - Dead backends are never selected
//! - The pool is fixed at startup

pub mod backend;
pub mod least_conn;
pub mod pool;
pub mod round_robin;

use std::sync::Arc;

use crate::config::Strategy;
use self::backend::Backend;

/// A backend selection policy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick a live backend, or `None` if none is live.
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;

    /// Policy name for logs and metrics.
    fn name(&self) -> &'static str;
}

/// Build the selector for a configured strategy.
pub fn selector_for(strategy: Strategy) -> Box<dyn LoadBalancer> {
    match strategy {
        Strategy::RoundRobin => Box::new(round_robin::RoundRobin::new()),
        Strategy::LeastConnections => Box::new(least_conn::LeastConnections::new()),
    }
}

pub use backend::{BackendStats, InFlightGuard};
pub use pool::BackendPool;
