//! Error types shared across huddle crates.
//!
//! Each crate keeps its error enum next to the code that produces it; only
//! plugin configuration errors live here, because the runtime and the
//! plugins themselves both surface them.

use thiserror::Error as ThisError;

/// Malformed plugin configuration detected at startup.
///
/// The config payload is opaque to the runtime; each plugin deserializes it
/// into its own schema via [`crate::types::PluginConfig::parse`] and
/// surfaces one of these when the payload does not fit.
#[derive(ThisError, Debug)]
pub enum ConfigError {
    /// The payload did not deserialize into the plugin's schema.
    #[error("invalid plugin config: {source}")]
    Parse {
        #[from]
        source: serde_json::Error,
    },

    /// The payload deserialized but violates a plugin constraint.
    #[error("invalid plugin config: {reason}")]
    Constraint { reason: String },
}

impl ConfigError {
    #[must_use]
    pub fn constraint(reason: impl Into<String>) -> Self {
        Self::Constraint {
            reason: reason.into(),
        }
    }
}
