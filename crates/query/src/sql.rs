//! SQL text construction.
//!
//! Segments reaching this module already passed the key sanitizer's
//! allow-list; quoting here is a second layer, not the primary defense.

use csvgate_core::CacheKey;

/// Parameterized existence check against the information schema.
pub const OBJECT_EXISTS_SQL: &str = "SELECT 1 FROM information_schema.tables \
     WHERE table_catalog = ? AND table_schema = ? AND table_name = ? LIMIT 1";

/// Quote an identifier, doubling embedded double quotes.
pub fn quote_identifier(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Quote a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Fully qualified `"database"."schema"."object"` reference.
pub fn qualified_object(key: &CacheKey) -> String {
    format!(
        "{}.{}.{}",
        quote_identifier(key.database()),
        quote_identifier(key.schema()),
        quote_identifier(key.object())
    )
}

/// The single export statement run per regeneration.
pub fn export_statement(key: &CacheKey, destination: &str) -> String {
    format!(
        "COPY (SELECT * FROM {}) TO {} (FORMAT CSV, HEADER, DELIMITER ',')",
        qualified_object(key),
        quote_literal(destination)
    )
}
