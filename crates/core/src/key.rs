//! Request identity: segment sanitization and cache keys.
//!
//! The three request path segments end up interpolated both into a SQL
//! statement and into a filesystem path, so the allow-list enforced here is the
//! primary defense against SQL injection and path traversal.

use crate::error::{Error, Result, SegmentKind, SegmentViolation};
use crate::{CSV_SUFFIX, MAX_SEGMENT_LEN};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Opaque credential for a remote database.
///
/// The value is only handed to the database connection configuration. It is
/// never logged, persisted or formatted.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialToken(String);

impl CredentialToken {
    /// Wrap a token value. Empty strings count as "no token".
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Borrow the secret value for the connection handshake.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Hex SHA-256 digest of the token, used for per-token cache partitions.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl fmt::Debug for CredentialToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CredentialToken")
            .field(&"<redacted>")
            .finish()
    }
}

/// Which database a request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialScope {
    /// The configured local database file.
    Local,
    /// A remote database reached with the caller's token.
    Remote,
}

impl CredentialScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// Whether the cache distinguishes callers by token identity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPolicy {
    /// Key on credential scope only: every remote caller shares one artifact.
    #[default]
    Scope,
    /// Additionally key on a digest of the token, so tokens never share artifacts.
    Token,
}

/// Sanitized identity of a cached artifact.
///
/// Only [`sanitize`] and [`sanitize_with_policy`] construct keys, so every
/// segment is guaranteed to match `^[A-Za-z0-9_-]{1,128}$`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    database: String,
    schema: String,
    object: String,
    scope: CredentialScope,
    partition: Option<String>,
}

impl CacheKey {
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Object name without the `.csv` suffix.
    pub fn object(&self) -> &str {
        &self.object
    }

    pub fn scope(&self) -> CredentialScope {
        self.scope
    }

    /// Token digest, present only under [`KeyPolicy::Token`].
    pub fn partition(&self) -> Option<&str> {
        self.partition.as_deref()
    }

    /// `database.schema.object`, for logs and spans.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}.{}", self.database, self.schema, self.object)
    }

    /// File name offered to downloading clients.
    pub fn download_name(&self) -> String {
        format!("{}{}", self.object, CSV_SUFFIX)
    }

    /// Top-level directory separating credential scopes (and partitions).
    pub fn scope_dir(&self) -> String {
        match &self.partition {
            Some(digest) => format!("{}-{}", self.scope.as_str(), digest),
            None => self.scope.as_str().to_string(),
        }
    }

    /// Path of the artifact relative to the cache root.
    ///
    /// Segments cannot contain separators and are never empty, so the mapping
    /// from keys to paths is injective.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.scope_dir())
            .join(&self.database)
            .join(&self.schema)
            .join(self.download_name())
    }
}

/// Sanitize request segments using the default [`KeyPolicy::Scope`].
pub fn sanitize(
    database: &str,
    schema: &str,
    object: &str,
    token: Option<&CredentialToken>,
) -> Result<CacheKey> {
    sanitize_with_policy(database, schema, object, token, KeyPolicy::Scope)
}

/// Sanitize request segments into a [`CacheKey`].
///
/// The object segment must carry the `.csv` suffix, which is stripped before
/// validation. The token only contributes the credential scope, plus its
/// digest under [`KeyPolicy::Token`].
pub fn sanitize_with_policy(
    database: &str,
    schema: &str,
    object: &str,
    token: Option<&CredentialToken>,
    policy: KeyPolicy,
) -> Result<CacheKey> {
    let object = object
        .strip_suffix(CSV_SUFFIX)
        .ok_or(Error::InvalidSegment {
            segment: SegmentKind::Object,
            violation: SegmentViolation::MissingCsvSuffix,
        })?;

    validate_segment(SegmentKind::Database, database)?;
    validate_segment(SegmentKind::Schema, schema)?;
    validate_segment(SegmentKind::Object, object)?;

    let scope = match token {
        Some(_) => CredentialScope::Remote,
        None => CredentialScope::Local,
    };
    let partition = match (policy, token) {
        (KeyPolicy::Token, Some(token)) => Some(token.digest()),
        _ => None,
    };

    Ok(CacheKey {
        database: database.to_string(),
        schema: schema.to_string(),
        object: object.to_string(),
        scope,
        partition,
    })
}

fn validate_segment(segment: SegmentKind, value: &str) -> Result<()> {
    let violation = if value.is_empty() {
        Some(SegmentViolation::Empty)
    } else if value.len() > MAX_SEGMENT_LEN {
        Some(SegmentViolation::TooLong)
    } else if !value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        Some(SegmentViolation::Charset)
    } else {
        None
    };

    match violation {
        Some(violation) => Err(Error::InvalidSegment { segment, violation }),
        None => Ok(()),
    }
}
