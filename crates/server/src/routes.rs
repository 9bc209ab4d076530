//! Route configuration.

use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::body::Body;
use axum::http::Request;
use axum::routing::get;
use tower_http::trace::TraceLayer;
use tracing::Span;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(handlers::health_check))
        // The object segment carries the `.csv` suffix; the sanitizer strips it.
        .route("/{database}/{schema}/{object}", get(handlers::get_csv));

    // Restrict /metrics to scrapers at the network level when enabled.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

/// Request span with the path only. The query string carries credential tokens.
fn request_span(request: &Request<Body>) -> Span {
    tracing::debug_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        version = ?request.version(),
    )
}
