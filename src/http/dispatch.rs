//! Request dispatch: select, forward, retry.
//!
//! # Per-request state machine
//! ```text
//! SELECTING ──none live──▶ UNAVAILABLE (503)
//!     │
//!     ▼
//! FORWARDING ──ok──▶ SUCCEEDED (backend response relayed)
//!     │
//!     └─transport error─▶ backend marked dead ─▶ SELECTING
//! ```
//!
//! At most one attempt per backend in the pool, so an all-down pool ends in
//! `UNAVAILABLE` after N attempts. On success the in-flight guard moves into
//! the relayed body and is released when the body ends or is dropped. Caller
//! cancellation drops the future; the guard still releases its count.

use axum::{
    body::{Body, Bytes},
    http::{uri::InvalidUri, Request, StatusCode},
    response::{IntoResponse, Response},
};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::http::body::TrackedBody;
use crate::http::request::{forwarded_headers, request_id, strip_hop_by_hop, upstream_uri};
use crate::load_balancer::BackendPool;
use crate::observability::metrics;

/// Outbound HTTP client shared by all requests.
pub type HttpClient = Client<HttpConnector, Body>;

/// Build the outbound client with a bounded connect phase.
pub fn build_client(connect_timeout: Duration) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Caller-visible dispatch failures. Backend errors never leak through.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No live backend was left to try.
    #[error("no backend available after {attempts} attempt(s)")]
    PoolExhausted { attempts: usize },

    /// Inbound body is larger than the buffering limit.
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Inbound body could not be read.
    #[error("failed to read request body: {0}")]
    BodyRead(String),

    /// Upstream URI could not be built from the inbound one.
    #[error("invalid request uri: {0}")]
    InvalidUri(#[from] InvalidUri),
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::PoolExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            DispatchError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DispatchError::BodyRead(_) | DispatchError::InvalidUri(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let message = match self {
            DispatchError::PoolExhausted { .. } => "Service unavailable".to_string(),
            ref other => other.to_string(),
        };
        (self.status(), message).into_response()
    }
}

/// Successful dispatch: the relayed response and the backend that served it.
#[derive(Debug)]
pub struct Dispatched {
    pub response: Response,
    pub backend: String,
    pub attempts: usize,
}

/// Forwards requests to backends chosen from the pool.
#[derive(Clone)]
pub struct Dispatcher {
    pool: Arc<BackendPool>,
    client: HttpClient,
    max_body_bytes: usize,
}

impl Dispatcher {
    pub fn new(pool: Arc<BackendPool>, client: HttpClient, max_body_bytes: usize) -> Self {
        Self {
            pool,
            client,
            max_body_bytes,
        }
    }

    pub fn pool(&self) -> &Arc<BackendPool> {
        &self.pool
    }

    /// Handle one inbound request.
    pub async fn dispatch(
        &self,
        request: Request<Body>,
        client_addr: Option<SocketAddr>,
    ) -> Result<Dispatched, DispatchError> {
        let (parts, body) = request.into_parts();
        let request_id = request_id(&parts.headers);

        // Buffered once so every attempt resends the same bytes
        let body = self.read_body(body).await?;
        let headers = forwarded_headers(&parts.headers, client_addr.map(|a| a.ip()));

        let max_attempts = self.pool.len();
        let mut attempts = 0;

        while attempts < max_attempts {
            let Some(backend) = self.pool.select() else {
                break;
            };
            attempts += 1;

            let guard = backend.start_request();
            metrics::record_in_flight(backend.name(), backend.in_flight());

            let uri = upstream_uri(backend.url(), backend.authority(), &parts.uri)?;
            let mut upstream = Request::new(Body::from(body.clone()));
            *upstream.method_mut() = parts.method.clone();
            *upstream.uri_mut() = uri;
            *upstream.headers_mut() = headers.clone();

            tracing::debug!(
                request_id = %request_id,
                backend = %backend.name(),
                attempt = attempts,
                "Forwarding request"
            );

            let started = Instant::now();
            match self.client.request(upstream).await {
                Ok(response) => {
                    let (mut parts, body) = response.into_parts();
                    strip_hop_by_hop(&mut parts.headers);
                    let body = TrackedBody::new(body, guard, started);
                    return Ok(Dispatched {
                        response: Response::from_parts(parts, Body::new(body)),
                        backend: backend.name().to_string(),
                        attempts,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        request_id = %request_id,
                        backend = %backend.name(),
                        attempt = attempts,
                        error = %e,
                        "Upstream error, marking backend dead"
                    );
                    backend.set_alive(false);
                    drop(guard);
                    metrics::record_upstream_failure(backend.name());
                    metrics::record_backend_health(backend.name(), false);
                    metrics::record_in_flight(backend.name(), backend.in_flight());
                }
            }
        }

        tracing::warn!(
            request_id = %request_id,
            attempts,
            pool_size = max_attempts,
            "No backend available"
        );
        Err(DispatchError::PoolExhausted { attempts })
    }

    async fn read_body(&self, body: Body) -> Result<Bytes, DispatchError> {
        match Limited::new(body, self.max_body_bytes).collect().await {
            Ok(collected) => Ok(collected.to_bytes()),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(DispatchError::BodyTooLarge {
                limit: self.max_body_bytes,
            }),
            Err(e) => Err(DispatchError::BodyRead(e.to_string())),
        }
    }
}
