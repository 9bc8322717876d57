//! Per-plugin lifecycle states and the rules for moving between them.
//!
//! A plugin is `Installed` after registration, `Started` once its startup
//! callback has run, and `Stopped` after runtime shutdown. Meeting
//! activation is not a state of its own here: it is tracked per meeting on
//! the registry record, and only `Started` plugins may hold active
//! meetings. `Stopped` is terminal.

use std::fmt;

use thiserror::Error as ThisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Installed,
    Started,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Installed => "installed",
            Self::Started => "started",
            Self::Stopped => "stopped",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle operations a host can request, named for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleOp {
    Startup,
    MeetingStart,
    MeetingEnd,
    Shutdown,
}

impl fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Startup => "startup",
            Self::MeetingStart => "meeting_start",
            Self::MeetingEnd => "meeting_end",
            Self::Shutdown => "shutdown",
        };
        write!(f, "{name}")
    }
}

impl LifecycleState {
    /// Whether `op` is legal from this state.
    ///
    /// Startup is re-entrant: a `Started` plugin may be started again after
    /// a container restart. Shutdown accepts `Installed` plugins too, so a
    /// runtime holding never-started plugins can still wind down.
    #[must_use]
    pub fn allows(self, op: LifecycleOp) -> bool {
        match op {
            LifecycleOp::Startup | LifecycleOp::Shutdown => {
                matches!(self, Self::Installed | Self::Started)
            },
            LifecycleOp::MeetingStart | LifecycleOp::MeetingEnd => self == Self::Started,
        }
    }

    /// Validate `op` from this state, or say exactly what was refused.
    pub fn check(self, plugin: &str, op: LifecycleOp) -> Result<(), LifecycleError> {
        if self.allows(op) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                plugin: plugin.to_owned(),
                state: self,
                operation: op,
            })
        }
    }
}

/// Invalid lifecycle usage. Every refused transition surfaces one of
/// these; none is silently ignored.
#[derive(ThisError, Debug)]
pub enum LifecycleError {
    #[error("plugin {plugin} cannot {operation} while {state}")]
    InvalidTransition {
        plugin: String,
        state: LifecycleState,
        operation: LifecycleOp,
    },

    #[error("plugin {plugin} is already installed")]
    DuplicatePlugin { plugin: String },

    #[error("plugin {plugin} is not installed")]
    UnknownPlugin { plugin: String },

    #[error("meeting {meeting} is already active for plugin {plugin}")]
    MeetingAlreadyActive { plugin: String, meeting: String },

    #[error("the runtime is stopped")]
    RuntimeStopped,
}
