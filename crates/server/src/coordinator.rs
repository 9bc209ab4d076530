//! Request coordination for cached exports.
//!
//! Each request is sanitized into a `CacheKey`, checked against the freshness
//! policy, and either served from the cache directory or routed through a
//! per-key regeneration. At most one regeneration runs per key; concurrent
//! requests for the same key wait on the in-flight one and stream its result.
//!
//! Regenerations run as detached tasks, so a client disconnecting mid-wait
//! never aborts an export that other requests depend on.

use crate::metrics;
use csvgate_core::{
    CacheKey, CredentialToken, FreshnessReason, KeyPolicy, config::CacheConfig, is_fresh,
    sanitize_with_policy,
};
use csvgate_query::{QueryError, QueryExecutor};
use csvgate_storage::{ArtifactStore, ByteStream, CachedArtifact, OpenArtifact, StorageError};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tracing::{Instrument, debug, info, info_span, instrument, warn};
use uuid::Uuid;

/// Coordinator errors.
///
/// Clone so one regeneration outcome can be handed to every waiter.
#[derive(Clone, Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("invalid key: {0}")]
    InvalidKey(#[from] csvgate_core::Error),

    #[error("query error: {0}")]
    Query(#[from] QueryError),

    #[error("storage error: {0}")]
    Storage(Arc<StorageError>),

    #[error("regeneration did not finish within {0:?}")]
    Timeout(Duration),

    #[error("regeneration task aborted: {0}")]
    Aborted(String),
}

impl From<StorageError> for CoordinatorError {
    fn from(err: StorageError) -> Self {
        Self::Storage(Arc::new(err))
    }
}

impl CoordinatorError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "invalid_key",
            Self::Query(e) => e.kind.as_str(),
            Self::Storage(_) => "storage",
            Self::Timeout(_) => "timeout",
            Self::Aborted(_) => "aborted",
        }
    }
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = std::result::Result<T, CoordinatorError>;

/// Where a served artifact came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactSource {
    /// Fresh artifact already in the cache.
    Cache,
    /// This request led the regeneration.
    Regenerated,
    /// This request waited on a regeneration led by another request.
    Joined,
    /// Regeneration failed and the previous artifact was served instead.
    StaleFallback,
}

impl ArtifactSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "hit",
            Self::Regenerated => "miss",
            Self::Joined => "joined",
            Self::StaleFallback => "stale",
        }
    }
}

/// An artifact opened for streaming, plus how it was obtained.
pub struct ServedArtifact {
    pub artifact: CachedArtifact,
    pub stream: ByteStream,
    pub source: ArtifactSource,
}

impl ServedArtifact {
    fn new(open: OpenArtifact, source: ArtifactSource) -> Self {
        Self {
            artifact: open.artifact,
            stream: open.stream,
            source,
        }
    }
}

impl fmt::Debug for ServedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServedArtifact")
            .field("artifact", &self.artifact)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Result of one regeneration task.
#[derive(Clone, Debug)]
struct Regenerated {
    artifact: CachedArtifact,
    /// False when another lease holder had already published a fresh artifact.
    exported: bool,
}

type SharedOutcome = Shared<BoxFuture<'static, CoordinatorResult<Regenerated>>>;

/// Lease table entry for a key with a regeneration in flight.
struct InFlight {
    lease_id: Uuid,
    outcome: SharedOutcome,
}

type LeaseTable = DashMap<CacheKey, InFlight>;

/// Releases a lease when the regeneration task finishes, including by panic.
struct LeaseGuard {
    table: Arc<LeaseTable>,
    key: CacheKey,
    lease_id: Uuid,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.table
            .remove_if(&self.key, |_, in_flight| in_flight.lease_id == self.lease_id);
        metrics::ACTIVE_REGENERATIONS.dec();
    }
}

/// Serves cache keys, regenerating stale artifacts at most once per key at a time.
pub struct Coordinator {
    store: ArtifactStore,
    executor: Arc<dyn QueryExecutor>,
    ttl: Duration,
    key_policy: KeyPolicy,
    serve_stale_on_error: bool,
    regeneration_timeout: Option<Duration>,
    in_flight: Arc<LeaseTable>,
}

impl Coordinator {
    pub fn new(store: ArtifactStore, executor: Arc<dyn QueryExecutor>, config: &CacheConfig) -> Self {
        Self {
            store,
            executor,
            ttl: config.ttl(),
            key_policy: config.key_policy,
            serve_stale_on_error: config.serve_stale_on_error,
            regeneration_timeout: config.regeneration_timeout(),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Number of keys with a regeneration currently in flight.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Resolve a request to a streamable artifact.
    ///
    /// Validation happens before any filesystem or database access.
    #[instrument(skip_all, fields(database, schema, object, scope))]
    pub async fn serve(
        &self,
        database: &str,
        schema: &str,
        object: &str,
        token: Option<CredentialToken>,
    ) -> CoordinatorResult<ServedArtifact> {
        let key = sanitize_with_policy(database, schema, object, token.as_ref(), self.key_policy)?;
        let span = tracing::Span::current();
        span.record("database", key.database());
        span.record("schema", key.schema());
        span.record("object", key.object());
        span.record("scope", key.scope().as_str());

        let existing = self.store.lookup(&key).await?;
        let decision = is_fresh(
            existing.as_ref().map(|a| a.last_modified),
            self.ttl,
            OffsetDateTime::now_utc(),
        );

        if !decision.stale {
            // The artifact can disappear between stat and open; regenerate in that case.
            if let Some(open) = self.store.open_for_streaming(&key).await? {
                metrics::CACHE_HITS.inc();
                debug!("Serving fresh artifact");
                return Ok(ServedArtifact::new(open, ArtifactSource::Cache));
            }
        }

        let reason = if decision.reason == FreshnessReason::Fresh {
            FreshnessReason::Missing
        } else {
            decision.reason
        };
        metrics::CACHE_MISSES
            .with_label_values(&[reason.as_str()])
            .inc();

        let (outcome, source) = self.join_or_start(&key, token);
        let result = match self.regeneration_timeout {
            Some(limit) => match tokio::time::timeout(limit, outcome).await {
                Ok(result) => result,
                Err(_) => Err(CoordinatorError::Timeout(limit)),
            },
            None => outcome.await,
        };

        match result {
            Ok(regenerated) => {
                debug!(
                    size_bytes = regenerated.artifact.size_bytes,
                    exported = regenerated.exported,
                    "Regeneration outcome ready"
                );
                match self.store.open_for_streaming(&key).await? {
                    Some(open) => Ok(ServedArtifact::new(
                        open,
                        served_source(source, &regenerated),
                    )),
                    None => Err(StorageError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "published artifact disappeared before it could be opened",
                    ))
                    .into()),
                }
            }
            Err(err) => self.fallback_or_fail(&key, existing.is_some(), err).await,
        }
    }

    async fn fallback_or_fail(
        &self,
        key: &CacheKey,
        had_artifact: bool,
        err: CoordinatorError,
    ) -> CoordinatorResult<ServedArtifact> {
        if self.serve_stale_on_error && had_artifact {
            if let Some(open) = self.store.open_for_streaming(key).await? {
                metrics::STALE_FALLBACKS.inc();
                warn!(
                    error = %err,
                    kind = err.kind(),
                    "Regeneration failed, serving stale artifact"
                );
                return Ok(ServedArtifact::new(open, ArtifactSource::StaleFallback));
            }
        }
        Err(err)
    }

    /// Join the in-flight regeneration for `key`, or start one.
    ///
    /// The lease table shard lock is held only for the entry lookup and insert.
    fn join_or_start(
        &self,
        key: &CacheKey,
        token: Option<CredentialToken>,
    ) -> (SharedOutcome, ArtifactSource) {
        match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                metrics::REGENERATION_WAITERS.inc();
                debug!("Joining in-flight regeneration");
                (entry.get().outcome.clone(), ArtifactSource::Joined)
            }
            Entry::Vacant(entry) => {
                let lease_id = Uuid::new_v4();
                metrics::ACTIVE_REGENERATIONS.inc();
                let lease = LeaseGuard {
                    table: self.in_flight.clone(),
                    key: key.clone(),
                    lease_id,
                };
                let task = Regeneration {
                    key: key.clone(),
                    token,
                    store: self.store.clone(),
                    executor: self.executor.clone(),
                    ttl: self.ttl,
                };
                let span = info_span!(
                    "regeneration",
                    key = %key.qualified_name(),
                    scope = key.scope().as_str(),
                    lease_id = %lease_id
                );
                let handle = tokio::spawn(
                    async move {
                        let _lease = lease;
                        task.run().await
                    }
                    .instrument(span),
                );

                let outcome: SharedOutcome = handle
                    .map(|joined| match joined {
                        Ok(result) => result,
                        Err(e) => Err(CoordinatorError::Aborted(e.to_string())),
                    })
                    .boxed()
                    .shared();
                entry.insert(InFlight {
                    lease_id,
                    outcome: outcome.clone(),
                });
                (outcome, ArtifactSource::Regenerated)
            }
        }
    }
}

/// Report a cache hit to the leader when its regeneration found the artifact already fresh.
fn served_source(source: ArtifactSource, regenerated: &Regenerated) -> ArtifactSource {
    match source {
        ArtifactSource::Regenerated if !regenerated.exported => ArtifactSource::Cache,
        other => other,
    }
}

/// One regeneration of one key, run by the lease holder.
struct Regeneration {
    key: CacheKey,
    token: Option<CredentialToken>,
    store: ArtifactStore,
    executor: Arc<dyn QueryExecutor>,
    ttl: Duration,
}

impl Regeneration {
    async fn run(self) -> CoordinatorResult<Regenerated> {
        // A previous lease holder may have published since this request looked.
        if let Some(existing) = self.store.lookup(&self.key).await?
            && !is_fresh(
                Some(existing.last_modified),
                self.ttl,
                OffsetDateTime::now_utc(),
            )
            .stale
        {
            debug!("Artifact became fresh while waiting for the lease");
            return Ok(Regenerated {
                artifact: existing,
                exported: false,
            });
        }

        metrics::REGENERATIONS_STARTED.inc();
        let started = Instant::now();
        let result = self.export_and_publish().await;
        metrics::REGENERATION_DURATION.observe(started.elapsed().as_secs_f64());

        match &result {
            Ok(artifact) => info!(
                size_bytes = artifact.size_bytes,
                duration_ms = started.elapsed().as_millis() as u64,
                executor = self.executor.executor_name(),
                "Regenerated artifact"
            ),
            Err(err) => {
                metrics::REGENERATIONS_FAILED
                    .with_label_values(&[err.kind()])
                    .inc();
                warn!(error = %err, kind = err.kind(), "Regeneration failed");
            }
        }
        result.map(|artifact| Regenerated {
            artifact,
            exported: true,
        })
    }

    async fn export_and_publish(&self) -> CoordinatorResult<CachedArtifact> {
        let temp_path = self.store.temp_path(&self.key).await?;

        let meta = match self
            .executor
            .execute(&self.key, self.token.as_ref(), &temp_path)
            .await
        {
            Ok(meta) => meta,
            Err(err) => {
                self.store.discard(&temp_path).await;
                return Err(err.into());
            }
        };
        debug!(
            size_bytes = meta.size_bytes,
            row_count = ?meta.row_count,
            "Export finished"
        );

        Ok(self.store.publish(&self.key, &temp_path).await?)
    }
}
