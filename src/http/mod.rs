//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, deadline)
//!     → request.rs (request ID, upstream URI, forwarded headers)
//!     → dispatch.rs (select backend, forward, retry on failure)
//!     → body.rs (backend response streamed back, in-flight until the end)
//! ```

pub mod body;
pub mod dispatch;
pub mod request;
pub mod server;

pub use dispatch::{DispatchError, Dispatcher};
pub use request::{MakeRequestUuidV4, X_REQUEST_ID};
pub use server::HttpServer;
