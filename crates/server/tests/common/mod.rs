//! Common test utilities and fixtures.

pub mod executor;
pub mod logs;
pub mod server;

#[allow(unused_imports)]
pub use executor::*;
#[allow(unused_imports)]
pub use logs::*;
#[allow(unused_imports)]
pub use server::*;
