//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active probes (active.rs):
//!     Periodic timer
//!     → TCP connect to each backend, concurrently
//!     → Set backend alive / dead
//!
//! Dispatcher failures (http/dispatch.rs):
//!     Forwarding error observed
//!     → Backend marked dead immediately
//!     → Next probe cycle may revive it
//! ```
//!
//! # Design Decisions
//! - Every cycle re-probes every backend; no backoff, no flap suppression
//! - Probe failures are logged, never surfaced to callers
//! - Liveness is per-backend, not per-pool

pub mod active;

pub use active::{HealthMonitor, ProbeError};
