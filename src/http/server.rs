//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all balancing handler
//! - Wire up middleware (request ID, tracing, request deadline)
//! - Start the liveness prober and the optional admin API
//! - Serve until the shutdown signal fires

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::{ConfigError, ProxyConfig};
use crate::health::HealthMonitor;
use crate::http::dispatch::{build_client, Dispatcher};
use crate::http::request::{request_id, MakeRequestUuidV4};
use crate::lifecycle::Shutdown;
use crate::load_balancer::BackendPool;
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
}

/// HTTP server for the load balancer.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    pool: Arc<BackendPool>,
}

impl HttpServer {
    /// Create a new HTTP server. Fails if any backend address is invalid.
    pub fn new(config: ProxyConfig) -> Result<Self, ConfigError> {
        let pool = Arc::new(BackendPool::from_config(
            &config.backends,
            config.load_balancer.strategy,
        )?);

        let client = build_client(Duration::from_secs(config.timeouts.connect_secs));
        let dispatcher = Dispatcher::new(pool.clone(), client, config.limits.max_body_bytes);

        let router = Self::build_router(&config, AppState { dispatcher });
        Ok(Self {
            router,
            config,
            pool,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV4))
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            strategy = self.pool.strategy_name(),
            backends = self.pool.len(),
            "HTTP server starting"
        );

        let monitor = HealthMonitor::new(self.pool.clone(), self.config.health_check.clone());
        tokio::spawn(monitor.run(shutdown.subscribe()));

        if self.config.admin.enabled {
            let admin_listener = TcpListener::bind(&self.config.admin.bind_address).await?;
            let admin_router = admin::setup_admin_router(admin::AdminState {
                pool: self.pool.clone(),
                api_key: Arc::from(self.config.admin.api_key.as_str()),
            });
            tokio::spawn(admin::serve(admin_listener, admin_router, shutdown.subscribe()));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut server_shutdown = shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Shared backend pool (for inspection and tests).
    pub fn pool(&self) -> Arc<BackendPool> {
        self.pool.clone()
    }
}

/// Main balancing handler: every method and path is forwarded.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request_id(request.headers());
    let method = request.method().to_string();
    let client_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    tracing::debug!(
        request_id = %request_id,
        method = %method,
        path = %request.uri().path(),
        "Balancing request"
    );

    match state.dispatcher.dispatch(request, client_addr).await {
        Ok(dispatched) => {
            metrics::record_request(&method, dispatched.response.status().as_u16(), &dispatched.backend, start_time);
            if dispatched.attempts > 1 {
                tracing::info!(
                    request_id = %request_id,
                    backend = %dispatched.backend,
                    attempts = dispatched.attempts,
                    "Request succeeded after retry"
                );
            }
            dispatched.response
        }
        Err(e) => {
            let status = e.status();
            tracing::warn!(request_id = %request_id, status = %status, error = %e, "Request failed");
            metrics::record_request(&method, status.as_u16(), "none", start_time);
            e.into_response()
        }
    }
}
