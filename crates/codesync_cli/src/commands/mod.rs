//! CLI command implementations.

pub mod serve;
pub mod session;
pub mod watch;
