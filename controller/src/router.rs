//! The ambient `/metrics` + `/healthz` HTTP surface (§4.8), served alongside the controller's own
//! event loop.

use axum::routing::get;
use axum::Router;

use crate::metrics;

/// Build the health/metrics router.
pub(crate) fn router() -> Router {
    Router::new()
        .route("/metrics", get(metrics::metrics))
        .route("/healthz", get(healthz))
}

/// Liveness handler: the process being able to answer at all is the only thing asserted.
#[allow(clippy::unused_async)] // required by axum
async fn healthz() -> &'static str {
    "healthy"
}
