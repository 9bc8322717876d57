//! Runtime error taxonomy.
//!
//! Lifecycle, config, and persistence failures keep their own types and
//! convert losslessly into [`Error`], so a hosting container can route on
//! the category. Hook failures during dispatch never appear here: those
//! are isolated and reported through the dispatch outcome instead.

use thiserror::Error as ThisError;

use {
    huddle_common::error::ConfigError, huddle_common::types::MeetingId,
    huddle_state::error::PersistenceError,
};

use crate::lifecycle::LifecycleError;

/// One plugin's failure inside an aggregate lifecycle operation.
#[derive(ThisError, Debug)]
#[error("plugin {plugin}: {source}")]
pub struct PluginFailure {
    pub plugin: String,
    #[source]
    pub source: Box<Error>,
}

impl PluginFailure {
    #[must_use]
    pub fn new(plugin: impl Into<String>, source: Error) -> Self {
        Self { plugin: plugin.into(), source: Box::new(source) }
    }
}

#[derive(ThisError, Debug)]
pub enum Error {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// A plugin callback returned an error.
    #[error("plugin {plugin} failed during {phase}: {source}")]
    Callback {
        plugin: String,
        phase: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// One or more plugins failed to start; the rest started normally.
    #[error("{} plugin(s) failed during startup", failures.len())]
    Startup { failures: Vec<PluginFailure> },

    /// One or more plugins failed to activate the meeting; the rest are
    /// active for it.
    #[error("meeting {meeting}: {} plugin(s) failed to activate", failures.len())]
    MeetingStart {
        meeting: MeetingId,
        failures: Vec<PluginFailure>,
    },

    /// One or more plugins failed while deactivating the meeting. It is
    /// deactivated everywhere regardless.
    #[error("meeting {meeting}: {} plugin(s) failed to deactivate", failures.len())]
    MeetingEnd {
        meeting: MeetingId,
        failures: Vec<PluginFailure>,
    },

    /// One or more plugins failed to wind down. The runtime is stopped
    /// regardless.
    #[error("{} plugin(s) failed during shutdown", failures.len())]
    Shutdown { failures: Vec<PluginFailure> },
}

impl Error {
    #[must_use]
    pub fn callback(plugin: impl Into<String>, phase: &'static str, source: anyhow::Error) -> Self {
        Self::Callback { plugin: plugin.into(), phase, source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
