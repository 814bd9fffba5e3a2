//! Admin API: read-only view of the pool.
//!
//! Served on its own listener so it never shares a port with balanced traffic.

pub mod auth;
pub mod handlers;

use axum::{
    routing::get,
    Router,
    middleware,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use crate::load_balancer::BackendPool;
use self::handlers::*;
use self::auth::admin_auth_middleware;

#[derive(Clone)]
pub struct AdminState {
    pub pool: Arc<BackendPool>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/backends", get(get_backends))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

/// Serve the admin router until shutdown.
pub async fn serve(listener: TcpListener, router: Router, mut shutdown: broadcast::Receiver<()>) {
    let addr = listener.local_addr().ok();
    tracing::info!(address = ?addr, "Admin API listening");

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await;

    if let Err(e) = result {
        tracing::error!(error = %e, "Admin API stopped with error");
    }
}
