//! Error types for the core domain.

use std::fmt;
use thiserror::Error;

/// Which request path segment failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Database,
    Schema,
    Object,
}

impl SegmentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Database => "database",
            Self::Schema => "schema",
            Self::Object => "object",
        }
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a segment was rejected. Never carries the rejected input itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentViolation {
    Empty,
    TooLong,
    Charset,
    MissingCsvSuffix,
}

impl fmt::Display for SegmentViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("must not be empty"),
            Self::TooLong => write!(f, "must be at most {} characters", crate::MAX_SEGMENT_LEN),
            Self::Charset => f.write_str("may only contain A-Z, a-z, 0-9, '_' and '-'"),
            Self::MissingCsvSuffix => write!(f, "must end with '{}'", crate::CSV_SUFFIX),
        }
    }
}

/// Core domain error type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid {segment} segment: {violation}")]
    InvalidSegment {
        segment: SegmentKind,
        violation: SegmentViolation,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
