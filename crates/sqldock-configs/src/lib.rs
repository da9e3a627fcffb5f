//! sqldock-configs
//!
//! Server configuration types and loader for SQLDock.

pub mod config;

pub use config::*;
