//! Shared types, error definitions, and dispatch telemetry used across all
//! huddle crates.

pub mod error;
pub mod hooks;
pub mod types;

pub use error::ConfigError;
