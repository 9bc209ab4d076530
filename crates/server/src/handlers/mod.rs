//! HTTP request handlers.

pub mod csv;
pub mod health;

pub use csv::*;
pub use health::*;
