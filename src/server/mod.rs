//! HTTP Server Module
//!
//! Wraps the command router with request tracing and a body limit, and
//! serves it on a TCP listener until a shutdown future resolves.
//!
//! ## Architecture
//!
//! ```text
//! TcpListener ──> axum::serve ──> TraceLayer ──> Router (commands)
//!                                                   │
//!                                                   ▼
//!                                             StorageEngine
//! ```

use crate::commands::router;
use crate::storage::StorageEngine;
use axum::extract::DefaultBodyLimit;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Maximum request body size (8 MiB). Larger bodies get a 413.
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

/// Builds the full application: routes plus middleware.
pub fn app(storage: Arc<StorageEngine>) -> Router {
    router(storage)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TraceLayer::new_for_http())
}

/// Serves `storage` on `listener` until `shutdown` completes. In-flight
/// requests are allowed to finish.
pub async fn serve<F>(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app(storage))
        .with_graceful_shutdown(shutdown)
        .await
}
