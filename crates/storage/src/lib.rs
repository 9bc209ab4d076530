//! Artifact storage for csvgate.
//!
//! This crate owns the cache directory:
//! - One CSV file per `CacheKey`, at a path derived from the key
//! - Temp-file allocation next to the final path
//! - Atomic publish (fsync, then rename over the previous artifact)
//! - Stat-only lookup and streaming reads that never observe partial writes

pub mod error;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use store::{ArtifactStore, ByteStream, CachedArtifact, OpenArtifact};
