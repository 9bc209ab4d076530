//! Query error types.

use std::fmt;
use thiserror::Error;

/// Failure category of an export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// The database could not be opened or authenticated against.
    ConnectionFailed,
    /// The requested object does not exist in the target database.
    ObjectNotFound,
    /// The export statement itself failed.
    ExportFailed,
}

impl QueryErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionFailed => "connection_failed",
            Self::ObjectNotFound => "object_not_found",
            Self::ExportFailed => "export_failed",
        }
    }
}

impl fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Export failure.
///
/// `message` carries engine detail for logs. It may mention file paths, so it
/// is never sent to clients.
#[derive(Clone, Debug, Error)]
#[error("{kind}: {message}")]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ConnectionFailed, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ObjectNotFound, message)
    }

    pub fn export(message: impl Into<String>) -> Self {
        Self::new(QueryErrorKind::ExportFailed, message)
    }
}
