//! The huddle plugin runtime: lifecycle state machine, packet dispatcher,
//! and the capability facade handed to every plugin invocation.
//!
//! A hosting container installs [`MeetingPlugin`] implementations, starts
//! them, activates meetings, and feeds packets through
//! [`PluginRuntime::dispatch`]. Subscribed hooks react to packets and reach
//! the model gateway and the meeting store through [`RuntimeFacade`].

mod dispatch;
pub mod error;
pub mod facade;
pub mod lifecycle;
pub mod plugin;
pub mod runtime;

pub use {
    error::{Error, PluginFailure, Result},
    facade::RuntimeFacade,
    lifecycle::{LifecycleError, LifecycleOp, LifecycleState},
    plugin::{DataHook, HookMap, MeetingPlugin, hook_fn},
    runtime::PluginRuntime,
};
