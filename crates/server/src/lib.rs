//! HTTP server for the csvgate materialized-result cache.
//!
//! This crate provides:
//! - The request coordinator (freshness checks, single-flight regeneration)
//! - The CSV download endpoint and health/metrics endpoints
//! - Error mapping from domain failures to HTTP responses
//! - Tracing setup for the `csvgated` binary

pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod routes;
pub mod state;

pub use coordinator::{ArtifactSource, Coordinator, CoordinatorError, ServedArtifact};
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
