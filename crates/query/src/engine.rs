//! DuckDB-backed query executor.

use crate::error::QueryError;
use crate::executor::{ArtifactMeta, QueryExecutor};
use crate::sql;
use async_trait::async_trait;
use csvgate_core::config::DatabaseConfig;
use csvgate_core::{CacheKey, CredentialScope, CredentialToken};
use duckdb::{AccessMode, Config, Connection};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Exports objects from a local DuckDB file or a remote DuckDB target.
///
/// Every call opens its own connection inside `spawn_blocking`; connections are
/// never shared between regenerations.
#[derive(Clone, Debug)]
pub struct DuckDbExecutor {
    local_path: PathBuf,
    remote_target: String,
    read_only: bool,
}

impl DuckDbExecutor {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            local_path: config.path.clone(),
            remote_target: config.remote_target.clone(),
            read_only: config.read_only,
        }
    }

    fn connect(
        &self,
        scope: CredentialScope,
        token: Option<&CredentialToken>,
    ) -> Result<Connection, QueryError> {
        match scope {
            CredentialScope::Local => {
                // Opening a missing file read-write would silently create an empty database.
                if !self.local_path.is_file() {
                    return Err(QueryError::connection(format!(
                        "local database {} does not exist",
                        self.local_path.display()
                    )));
                }
                let conn = if self.read_only {
                    let config = Config::default()
                        .access_mode(AccessMode::ReadOnly)
                        .map_err(|e| QueryError::connection(e.to_string()))?;
                    Connection::open_with_flags(&self.local_path, config)
                } else {
                    Connection::open(&self.local_path)
                };
                conn.map_err(|e| {
                    QueryError::connection(format!(
                        "failed to open {}: {e}",
                        self.local_path.display()
                    ))
                })
            }
            CredentialScope::Remote => {
                let token = token.ok_or_else(|| {
                    QueryError::connection("remote scope requires a credential token")
                })?;
                let config = Config::default()
                    .with("motherduck_token", token.expose())
                    .map_err(|e| QueryError::connection(e.to_string()))?;
                // Engine messages may echo connection settings, so they are not forwarded.
                Connection::open_with_flags(&self.remote_target, config).map_err(|_| {
                    QueryError::connection(format!(
                        "failed to connect to remote target {}",
                        self.remote_target
                    ))
                })
            }
        }
    }

    fn object_exists(conn: &Connection, key: &CacheKey) -> Result<bool, QueryError> {
        let mut stmt = conn
            .prepare(sql::OBJECT_EXISTS_SQL)
            .map_err(|e| QueryError::export(format!("failed to prepare existence check: {e}")))?;
        let mut rows = stmt
            .query(duckdb::params![key.database(), key.schema(), key.object()])
            .map_err(|e| QueryError::export(format!("existence check failed: {e}")))?;
        let found = rows
            .next()
            .map_err(|e| QueryError::export(format!("existence check failed: {e}")))?
            .is_some();
        Ok(found)
    }

    fn export_blocking(
        &self,
        key: &CacheKey,
        token: Option<&CredentialToken>,
        destination: &Path,
    ) -> Result<ArtifactMeta, QueryError> {
        let conn = self.connect(key.scope(), token)?;

        if !Self::object_exists(&conn, key)? {
            return Err(QueryError::not_found(format!(
                "{} does not exist",
                key.qualified_name()
            )));
        }

        let destination_str = destination.to_str().ok_or_else(|| {
            QueryError::export(format!(
                "destination {} is not valid UTF-8",
                destination.display()
            ))
        })?;
        let statement = sql::export_statement(key, destination_str);
        debug!(statement = %statement, "Running export");

        let rows = conn
            .execute(&statement, [])
            .map_err(|e| QueryError::export(format!("export of {} failed: {e}", key.qualified_name())))?;

        let size_bytes = std::fs::metadata(destination)
            .map_err(|e| QueryError::export(format!("export produced no file: {e}")))?
            .len();

        Ok(ArtifactMeta {
            size_bytes,
            row_count: Some(rows as u64),
        })
    }
}

#[async_trait]
impl QueryExecutor for DuckDbExecutor {
    #[instrument(
        skip_all,
        fields(key = %key.qualified_name(), scope = key.scope().as_str())
    )]
    async fn execute(
        &self,
        key: &CacheKey,
        token: Option<&CredentialToken>,
        destination: &Path,
    ) -> Result<ArtifactMeta, QueryError> {
        let executor = self.clone();
        let key_owned = key.clone();
        let token_owned = token.cloned();
        let destination_owned = destination.to_path_buf();

        let result = tokio::task::spawn_blocking(move || {
            executor.export_blocking(&key_owned, token_owned.as_ref(), &destination_owned)
        })
        .await
        .map_err(|e| QueryError::export(format!("export task failed: {e}")))
        .and_then(|r| r);

        if let Err(err) = &result {
            match tokio::fs::remove_file(destination).await {
                Ok(()) => debug!("Removed partial export"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(error = %e, "Failed to remove partial export"),
            }
            debug!(kind = %err.kind, "Export failed");
        }

        result
    }

    fn executor_name(&self) -> &'static str {
        "duckdb"
    }
}
