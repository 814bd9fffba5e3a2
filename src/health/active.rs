//! Active liveness probing.
//!
//! # Responsibilities
//! - Periodically open a bare TCP connection to every backend
//! - Update each backend's liveness flag with the result

use std::sync::Arc;
use std::time::Duration;
use futures_util::future::join_all;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::load_balancer::BackendPool;
use crate::load_balancer::backend::Backend;
use crate::observability::metrics;

/// Why a probe failed. Only ever logged.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Connect did not finish within the probe timeout.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// Connect failed (refused, unreachable, DNS failure).
    #[error("connect failed: {0}")]
    Connect(#[from] std::io::Error),
}

/// Attempt one TCP connection to `backend` within `timeout`.
pub async fn probe(backend: &Backend, timeout: Duration) -> Result<(), ProbeError> {
    match time::timeout(timeout, TcpStream::connect(backend.authority())).await {
        Ok(Ok(_stream)) => Ok(()),
        Ok(Err(e)) => Err(ProbeError::Connect(e)),
        Err(_) => Err(ProbeError::Timeout(timeout)),
    }
}

/// Background task that keeps backend liveness flags fresh.
pub struct HealthMonitor {
    pool: Arc<BackendPool>,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(pool: Arc<BackendPool>, config: HealthCheckConfig) -> Self {
        Self { pool, config }
    }

    /// Probe on every tick until shutdown. The first cycle runs immediately.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Liveness probes disabled");
            return;
        }

        tracing::info!(
            interval_secs = self.config.interval_secs,
            timeout_secs = self.config.timeout_secs,
            backends = self.pool.len(),
            "Health monitor starting"
        );

        let mut ticker = time::interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_all().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Run one probe cycle. Backends are probed concurrently, so a slow one
    /// never delays the others.
    pub async fn probe_all(&self) {
        let timeout = self.config.timeout();
        join_all(
            self.pool
                .backends()
                .iter()
                .map(|backend| Self::probe_one(backend, timeout)),
        )
        .await;
    }

    async fn probe_one(backend: &Arc<Backend>, timeout: Duration) {
        let result = probe(backend, timeout).await;
        let alive = result.is_ok();
        let was_alive = backend.set_alive(alive);

        match result {
            Ok(()) if !was_alive => {
                tracing::info!(backend = %backend.name(), "Backend is alive again");
            }
            Ok(()) => {}
            Err(e) => {
                if was_alive {
                    tracing::warn!(backend = %backend.name(), error = %e, "Backend marked dead by probe");
                } else {
                    tracing::debug!(backend = %backend.name(), error = %e, "Backend still dead");
                }
            }
        }

        let stats = backend.snapshot();
        tracing::debug!(
            backend = %stats.name,
            alive = stats.alive,
            in_flight = stats.in_flight,
            completed = stats.completed,
            avg_latency_ms = stats.average_latency_ms,
            "Health check"
        );
        metrics::record_backend_health(backend.name(), alive);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackendConfig, Strategy};
    use tokio::net::TcpListener;

    async fn closed_port() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    }

    fn monitor_for(addresses: &[String]) -> HealthMonitor {
        let configs: Vec<_> = addresses.iter().map(|a| BackendConfig::new(a.clone())).collect();
        let pool = Arc::new(BackendPool::from_config(&configs, Strategy::RoundRobin).unwrap());
        HealthMonitor::new(
            pool,
            HealthCheckConfig {
                enabled: true,
                interval_secs: 1,
                timeout_secs: 1,
            },
        )
    }

    #[tokio::test]
    async fn probe_cycle_updates_flags() {
        let up = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let up_addr = up.local_addr().unwrap();
        let down_addr = closed_port().await;

        let monitor = monitor_for(&[format!("http://{}", up_addr), format!("http://{}", down_addr)]);
        monitor.probe_all().await;

        let backends = monitor.pool.backends();
        assert!(backends[0].is_alive());
        assert!(!backends[1].is_alive());

        // dead backend is excluded from selection after the cycle
        for _ in 0..4 {
            assert!(Arc::ptr_eq(&monitor.pool.select().unwrap(), &backends[0]));
        }
    }

    #[tokio::test]
    async fn probe_revives_backend() {
        let up = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let monitor = monitor_for(&[format!("http://{}", up.local_addr().unwrap())]);
        monitor.pool.backends()[0].set_alive(false);

        monitor.probe_all().await;
        assert!(monitor.pool.backends()[0].is_alive());
    }

    #[tokio::test]
    async fn probe_does_not_touch_in_flight() {
        let down_addr = closed_port().await;
        let monitor = monitor_for(&[format!("http://{}", down_addr)]);
        let guard = monitor.pool.backends()[0].start_request();

        monitor.probe_all().await;
        assert!(!guard.is_alive());
        assert_eq!(guard.in_flight(), 1);
    }

    #[tokio::test]
    async fn unresolvable_host_is_dead() {
        let monitor = monitor_for(&["http://backend.invalid:5678".to_string()]);
        monitor.probe_all().await;
        assert!(!monitor.pool.backends()[0].is_alive());
    }

    #[tokio::test]
    async fn run_exits_on_shutdown() {
        let monitor = monitor_for(&[format!("http://{}", closed_port().await)]);
        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(monitor.run(rx));
        tx.send(()).unwrap();
        time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
