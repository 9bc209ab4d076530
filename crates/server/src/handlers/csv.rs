//! CSV download endpoint.

use crate::coordinator::CoordinatorError;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use csvgate_core::CredentialToken;
use serde::Deserialize;

/// Header reporting how the artifact was obtained (`hit`, `miss`, `joined`, `stale`).
pub const CACHE_STATUS_HEADER: &str = "x-csvgate-cache";

/// Query parameters for a CSV request.
///
/// No `Debug`: the token must never reach a log line.
#[derive(Deserialize)]
pub struct CsvQuery {
    /// Credential for the remote database. Also accepted as `motherduck_token`.
    #[serde(default, alias = "motherduck_token")]
    pub token: Option<String>,
}

/// GET /{database}/{schema}/{object}.csv - Stream the cached export of an object.
///
/// A missing or expired artifact is regenerated before the response starts.
pub async fn get_csv(
    State(state): State<AppState>,
    Path((database, schema, object)): Path<(String, String, String)>,
    Query(query): Query<CsvQuery>,
) -> ApiResult<Response> {
    let token = query.token.and_then(CredentialToken::new);

    let served = state
        .coordinator
        .serve(&database, &schema, &object, token)
        .await
        .map_err(|e| {
            log_failure(&e);
            ApiError::from(e)
        })?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        served.artifact.key.download_name()
    );

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, "text/csv".to_string()),
            (CONTENT_LENGTH, served.artifact.size_bytes.to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        [(CACHE_STATUS_HEADER, served.source.as_str())],
        Body::from_stream(served.stream),
    )
        .into_response())
}

fn log_failure(err: &CoordinatorError) {
    match err {
        CoordinatorError::InvalidKey(e) => {
            tracing::debug!(error = %e, "Rejected request path");
        }
        CoordinatorError::Query(e) => {
            tracing::warn!(kind = %e.kind, error = %e, "Export request failed");
        }
        CoordinatorError::Timeout(limit) => {
            tracing::warn!(timeout_secs = limit.as_secs(), "Gave up waiting for regeneration");
        }
        CoordinatorError::Storage(e) => {
            tracing::error!(error = %e, "Cache storage failure");
        }
        CoordinatorError::Aborted(e) => {
            tracing::error!(error = %e, "Regeneration task aborted");
        }
    }
}
