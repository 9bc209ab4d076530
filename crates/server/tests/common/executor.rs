//! Instrumented query executor for coordinator and API tests.

use async_trait::async_trait;
use csvgate_core::{CacheKey, CredentialToken};
use csvgate_query::{ArtifactMeta, QueryError, QueryErrorKind, QueryExecutor};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// Records every invocation and writes a small deterministic CSV.
///
/// The body carries a generation counter so tests can tell exports apart.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct MockExecutor {
    calls: AtomicUsize,
    objects: Mutex<Vec<String>>,
    tokens: Mutex<Vec<Option<String>>>,
    failure: Mutex<Option<QueryErrorKind>>,
    delay: Duration,
    gated_object: Option<String>,
    gate: Semaphore,
}

#[allow(dead_code)]
impl MockExecutor {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            objects: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            delay: Duration::ZERO,
            gated_object: None,
            gate: Semaphore::new(0),
        }
    }

    /// Sleep this long inside every export.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Block exports of `object` until `release_gate` is called.
    pub fn gated(mut self, object: &str) -> Self {
        self.gated_object = Some(object.to_string());
        self
    }

    pub fn release_gate(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }

    /// Make subsequent exports fail with `kind` (or succeed again with `None`).
    pub fn set_failure(&self, kind: Option<QueryErrorKind>) {
        *self.failure.lock().unwrap() = kind;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, object: &str) -> usize {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.as_str() == object)
            .count()
    }

    pub fn tokens_seen(&self) -> Vec<Option<String>> {
        self.tokens.lock().unwrap().clone()
    }

    /// CSV written by the `generation`-th export of `key`.
    pub fn body_for(key: &CacheKey, generation: usize) -> String {
        format!(
            "database,schema,object,generation\n{},{},{},{}\n",
            key.database(),
            key.schema(),
            key.object(),
            generation
        )
    }
}

#[async_trait]
impl QueryExecutor for MockExecutor {
    async fn execute(
        &self,
        key: &CacheKey,
        token: Option<&CredentialToken>,
        destination: &Path,
    ) -> Result<ArtifactMeta, QueryError> {
        let generation = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.objects.lock().unwrap().push(key.object().to_string());
        self.tokens
            .lock()
            .unwrap()
            .push(token.map(|t| t.expose().to_string()));

        if self.gated_object.as_deref() == Some(key.object()) {
            let _permit = self.gate.acquire().await.expect("gate closed");
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let failure = *self.failure.lock().unwrap();
        if let Some(kind) = failure {
            // Leave a partial file behind, as a real engine might.
            tokio::fs::write(destination, "partial").await.ok();
            return Err(QueryError::new(kind, "mock failure"));
        }

        let body = Self::body_for(key, generation);
        tokio::fs::write(destination, &body)
            .await
            .map_err(|e| QueryError::export(e.to_string()))?;
        Ok(ArtifactMeta {
            size_bytes: body.len() as u64,
            row_count: Some(1),
        })
    }

    fn executor_name(&self) -> &'static str {
        "mock"
    }
}
