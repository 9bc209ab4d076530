//! Shared helpers for artifact store tests.

use csvgate_core::{CacheKey, sanitize};
use csvgate_storage::ArtifactStore;
use futures::StreamExt;
use std::path::PathBuf;
use tempfile::TempDir;

/// A store rooted in a fresh temp directory.
pub async fn temp_store() -> (TempDir, ArtifactStore) {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let store = ArtifactStore::new(dir.path().join("cache"))
        .await
        .expect("Failed to create artifact store");
    (dir, store)
}

/// Key for `local/main/<object>.csv`.
pub fn local_key(object: &str) -> CacheKey {
    sanitize("local", "main", &format!("{object}.csv"), None).expect("valid key")
}

/// Deterministic CSV body with `rows` data rows.
pub fn csv_body(rows: usize, tag: &str) -> String {
    let mut body = String::from("id,label\n");
    for i in 0..rows {
        body.push_str(&format!("{i},{tag}-{i}\n"));
    }
    body
}

/// Write `contents` to a freshly allocated temp file for `key`.
pub async fn stage(store: &ArtifactStore, key: &CacheKey, contents: &[u8]) -> PathBuf {
    let temp = store.temp_path(key).await.expect("temp path");
    tokio::fs::write(&temp, contents).await.expect("write temp");
    temp
}

/// Read the current artifact for `key` through the streaming API.
#[allow(dead_code)]
pub async fn read_streamed(store: &ArtifactStore, key: &CacheKey) -> Option<Vec<u8>> {
    let open = store.open_for_streaming(key).await.expect("open")?;
    let mut stream = open.stream;
    let mut body = Vec::new();
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.expect("chunk"));
    }
    Some(body)
}
