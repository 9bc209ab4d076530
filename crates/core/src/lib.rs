//! Core domain types for csvgate.
//!
//! This crate defines the pieces of the materialized-result cache that do no I/O:
//! - Request key sanitization and the `CacheKey` identity
//! - Credential token handling (opaque, redacted)
//! - The freshness policy deciding when an artifact must be regenerated
//! - Process configuration shared by the other crates

pub mod config;
pub mod error;
pub mod freshness;
pub mod key;

pub use error::{Error, Result, SegmentKind, SegmentViolation};
pub use freshness::{FreshnessDecision, FreshnessReason, is_fresh};
pub use key::{CacheKey, CredentialScope, CredentialToken, KeyPolicy, sanitize, sanitize_with_policy};

/// Maximum length of a single path segment after suffix stripping.
pub const MAX_SEGMENT_LEN: usize = 128;

/// Suffix every object segment must carry in the request path.
pub const CSV_SUFFIX: &str = ".csv";
