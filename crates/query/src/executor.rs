//! Query executor trait.

use crate::error::QueryError;
use async_trait::async_trait;
use csvgate_core::{CacheKey, CredentialToken};
use std::path::Path;

/// Metadata about a freshly exported CSV file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArtifactMeta {
    /// Size of the written file in bytes.
    pub size_bytes: u64,
    /// Number of exported rows, when the engine reports it.
    pub row_count: Option<u64>,
}

/// Produces the CSV export for a cache key.
#[async_trait]
pub trait QueryExecutor: Send + Sync + 'static {
    /// Export the object named by `key` to `destination`.
    ///
    /// `destination` is a temp path distinct from the published artifact. On
    /// error the implementation removes whatever it wrote there, so no partial
    /// file survives. The token is only used to authenticate remote
    /// connections.
    async fn execute(
        &self,
        key: &CacheKey,
        token: Option<&CredentialToken>,
        destination: &Path,
    ) -> Result<ArtifactMeta, QueryError>;

    /// Get the name of this executor, for logging.
    fn executor_name(&self) -> &'static str;
}
