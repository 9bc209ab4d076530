//! Query execution for csvgate.
//!
//! The executor turns a sanitized `CacheKey` into a CSV file by running a
//! single `COPY (SELECT * FROM ...) TO ...` statement against DuckDB, either
//! on the configured local database file or on a remote target reached with
//! the caller's credential token.

pub mod engine;
pub mod error;
pub mod executor;
pub mod sql;

pub use engine::DuckDbExecutor;
pub use error::{QueryError, QueryErrorKind};
pub use executor::{ArtifactMeta, QueryExecutor};
