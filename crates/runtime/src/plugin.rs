//! The contracts a plugin implements.
//!
//! A plugin type implements [`MeetingPlugin`]; the runtime drives it
//! through install, startup, per-meeting activation, and shutdown, and
//! delivers packets to the [`DataHook`]s it registered for each meeting.

use std::{collections::HashMap, future::Future, sync::Arc};

use {anyhow::Result, async_trait::async_trait, serde_json::Value};

use huddle_common::types::{DataPacket, ExecutionContext, PluginConfig, PluginMetadata};

use crate::facade::RuntimeFacade;

/// Handler for packets of one subscribed source during one meeting.
///
/// Hooks should not retain per-packet state across invocations; anything
/// that must survive between packets goes through the facade's store.
#[async_trait]
pub trait DataHook: Send + Sync {
    /// Process one packet. Returning `Ok(Some(value))` records the value
    /// in the plugin's packet history for the meeting.
    async fn on_packet(
        &self,
        packet: DataPacket,
        facade: Arc<RuntimeFacade>,
    ) -> Result<Option<Value>>;
}

/// Source identifier to handler, declared fresh for each meeting.
pub type HookMap = HashMap<String, Arc<dyn DataHook>>;

/// Adapt a plain async function into a [`DataHook`].
pub fn hook_fn<F, Fut>(f: F) -> Arc<dyn DataHook>
where
    F: Fn(DataPacket, Arc<RuntimeFacade>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
{
    Arc::new(FnHook(f))
}

struct FnHook<F>(F);

#[async_trait]
impl<F, Fut> DataHook for FnHook<F>
where
    F: Fn(DataPacket, Arc<RuntimeFacade>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>>> + Send + 'static,
{
    async fn on_packet(
        &self,
        packet: DataPacket,
        facade: Arc<RuntimeFacade>,
    ) -> Result<Option<Value>> {
        (self.0)(packet, facade).await
    }
}

/// One plugin type.
///
/// `metadata` and `data_receive_hooks` are required. The lifecycle
/// callbacks default to no-ops so simple plugins implement only the
/// phases they care about.
#[async_trait]
pub trait MeetingPlugin: Send + Sync {
    /// Install-time descriptor. Read once at install and frozen; later
    /// changes to what this returns are never observed by the runtime.
    fn metadata(&self) -> PluginMetadata;

    /// Hook map for one meeting. Fetched when the meeting starts and
    /// cached until it ends.
    fn data_receive_hooks(&self) -> HookMap;

    /// One-time setup when the plugin is first registered.
    async fn on_install(&self) -> Result<()> {
        Ok(())
    }

    /// Service start. Runs again on container restart, so keep it
    /// idempotent. `config` is the effective config: the host override
    /// when one exists, the install-time default otherwise.
    async fn on_startup(&self, _config: &PluginConfig) -> Result<()> {
        Ok(())
    }

    /// A meeting this plugin participates in has begun.
    async fn on_meeting_start(
        &self,
        _ctx: &ExecutionContext,
        _facade: &Arc<RuntimeFacade>,
    ) -> Result<()> {
        Ok(())
    }

    /// The meeting ended. Meeting-scoped resources are released after
    /// this returns.
    async fn on_meeting_end(
        &self,
        _ctx: &ExecutionContext,
        _facade: &Arc<RuntimeFacade>,
    ) -> Result<()> {
        Ok(())
    }

    /// Terminal cleanup before the runtime stops.
    async fn on_shutdown(&self, _facade: &Arc<RuntimeFacade>) -> Result<()> {
        Ok(())
    }
}
