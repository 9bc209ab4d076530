//! Local filesystem artifact store.

use crate::error::{StorageError, StorageResult};
use bytes::Bytes;
use csvgate_core::CacheKey;
use futures::Stream;
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use std::time::{Duration, SystemTime};
use time::OffsetDateTime;
use tokio::fs;
use tracing::instrument;
use uuid::Uuid;

/// Default chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Marker separating an artifact file name from the unique temp suffix.
const TEMP_MARKER: &str = ".tmp.";

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// A published CSV artifact.
#[derive(Clone, Debug)]
pub struct CachedArtifact {
    /// Identity of the request that produced the artifact.
    pub key: CacheKey,
    /// Final on-disk location.
    pub path: PathBuf,
    /// Modification time, used by the freshness policy.
    pub last_modified: OffsetDateTime,
    /// Size in bytes.
    pub size_bytes: u64,
}

/// An artifact opened for a sequential read.
///
/// Metadata is taken from the open handle, so it describes exactly the bytes
/// the stream yields even if a newer artifact is published meanwhile.
pub struct OpenArtifact {
    pub artifact: CachedArtifact,
    pub stream: ByteStream,
}

impl std::fmt::Debug for OpenArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenArtifact")
            .field("artifact", &self.artifact)
            .finish_non_exhaustive()
    }
}

/// Directory of CSV artifacts keyed by sanitized request identity.
///
/// Artifacts are only ever replaced by renaming a fully written temp file over
/// them, so readers need no locking.
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Open the store, creating the root directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve the final path for a key, with path traversal protection.
    ///
    /// Runs the checks on the blocking pool since they canonicalize and stat.
    async fn artifact_path(&self, key: &CacheKey) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let relative = key.relative_path();
        tokio::task::spawn_blocking(move || Self::resolve_sync(&root, &relative))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Verify that `relative` stays inside `root`, including through symlinks.
    fn resolve_sync(root: &Path, relative: &Path) -> StorageResult<PathBuf> {
        if relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)))
        {
            return Err(StorageError::InvalidPath(format!(
                "contains unsafe path component: {}",
                relative.display()
            )));
        }

        let path = root.join(relative);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // Check the deepest existing path (the file itself or its nearest
        // ancestor). A symlink anywhere along the way must still resolve inside the root.
        let mut candidate = Some(path.as_path());
        while let Some(current) = candidate {
            if current == root {
                break;
            }
            match std::fs::symlink_metadata(current) {
                Ok(meta) => {
                    let canonical = current.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidPath(format!(
                                "symlink target missing or invalid: {}",
                                relative.display()
                            ))
                        } else {
                            StorageError::Io(std::io::Error::new(
                                e.kind(),
                                format!("failed to canonicalize path: {e}"),
                            ))
                        }
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidPath(format!(
                            "resolved path escapes cache root: {}",
                            relative.display()
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat path: {err}"),
                    )));
                }
            }
            candidate = current.parent();
        }

        Ok(path)
    }

    fn artifact_from_metadata(
        key: &CacheKey,
        path: PathBuf,
        metadata: &std::fs::Metadata,
    ) -> CachedArtifact {
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        CachedArtifact {
            key: key.clone(),
            path,
            last_modified: modified.into(),
            size_bytes: metadata.len(),
        }
    }

    /// Stat the artifact for `key` without opening it.
    #[instrument(skip(self, key), fields(key = %key.qualified_name(), scope = key.scope().as_str()))]
    pub async fn lookup(&self, key: &CacheKey) -> StorageResult<Option<CachedArtifact>> {
        let path = self.artifact_path(key).await?;
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {
                Ok(Some(Self::artifact_from_metadata(key, path, &metadata)))
            }
            Ok(_) => Err(StorageError::InvalidPath(format!(
                "artifact path is not a regular file: {}",
                key.relative_path().display()
            ))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Allocate a unique temp path next to the final artifact path.
    ///
    /// Parent directories are created. The file itself is not.
    #[instrument(skip(self, key), fields(key = %key.qualified_name()))]
    pub async fn temp_path(&self, key: &CacheKey) -> StorageResult<PathBuf> {
        let path = self.artifact_path(key).await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Unique per regeneration so a crashed writer never collides with the next one
        let temp_name = format!(
            "{}{}{}",
            key.download_name(),
            TEMP_MARKER,
            Uuid::new_v4()
        );
        Ok(path.with_file_name(temp_name))
    }

    /// Atomically move a completed temp file into place for `key`.
    ///
    /// Any previous artifact is replaced in a single rename, so concurrent
    /// readers see either the old or the new file, never a mix.
    #[instrument(skip(self, key), fields(key = %key.qualified_name(), scope = key.scope().as_str()))]
    pub async fn publish(&self, key: &CacheKey, temp_path: &Path) -> StorageResult<CachedArtifact> {
        let path = self.artifact_path(key).await?;
        Self::check_temp_belongs_to(&path, temp_path)?;

        let result = async {
            // Ensure data is flushed to disk before rename
            fs::File::open(temp_path).await?.sync_all().await?;
            fs::rename(temp_path, &path).await?;
            let metadata = fs::metadata(&path).await?;
            Ok::<_, StorageError>(Self::artifact_from_metadata(key, path.clone(), &metadata))
        }
        .await;

        if result.is_err() {
            self.discard(temp_path).await;
        }
        result
    }

    fn check_temp_belongs_to(final_path: &Path, temp_path: &Path) -> StorageResult<()> {
        let expected_prefix = final_path
            .file_name()
            .map(|name| format!("{}{}", name.to_string_lossy(), TEMP_MARKER));
        let temp_name = temp_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());

        match (expected_prefix, temp_name) {
            (Some(prefix), Some(name))
                if name.starts_with(&prefix) && temp_path.parent() == final_path.parent() =>
            {
                Ok(())
            }
            _ => Err(StorageError::InvalidTempFile(
                "temp file was not allocated for this key".to_string(),
            )),
        }
    }

    /// Open the current artifact for `key` for a sequential read.
    #[instrument(skip(self, key), fields(key = %key.qualified_name(), scope = key.scope().as_str()))]
    pub async fn open_for_streaming(&self, key: &CacheKey) -> StorageResult<Option<OpenArtifact>> {
        use tokio::io::AsyncReadExt;

        let path = self.artifact_path(key).await?;
        let file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };
        let metadata = file.metadata().await?;
        let artifact = Self::artifact_from_metadata(key, path, &metadata);

        // Stream the file in chunks instead of loading it into memory
        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Some(OpenArtifact {
            artifact,
            stream: Box::pin(stream),
        }))
    }

    /// Best-effort removal of an abandoned temp file.
    pub async fn discard(&self, temp_path: &Path) {
        match fs::remove_file(temp_path).await {
            Ok(()) => tracing::debug!(path = %temp_path.display(), "Discarded temp file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %temp_path.display(),
                error = %e,
                "Failed to discard temp file"
            ),
        }
    }

    /// Remove temp files older than `min_age` left behind by interrupted regenerations.
    ///
    /// Intended for startup, before any regeneration is in flight.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn sweep_temp_files(&self, min_age: Duration) -> StorageResult<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut stack = vec![self.root.clone()];

        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                // Use file_type() to avoid following symlinks out of the cache root
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                    continue;
                }
                if !file_type.is_file()
                    || !entry.file_name().to_string_lossy().contains(TEMP_MARKER)
                {
                    continue;
                }

                let age = entry
                    .metadata()
                    .await?
                    .modified()
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .unwrap_or(Duration::ZERO);
                if age < min_age {
                    continue;
                }

                match fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(StorageError::Io(e)),
                }
            }
        }

        if removed > 0 {
            tracing::info!(removed, "Removed orphaned temp files");
        }
        Ok(removed)
    }

    /// Verify the cache root exists and is a directory.
    pub async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("cache root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("cache root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}
