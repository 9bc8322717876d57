//! The plugin registry and lifecycle driver.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    serde_json::Value,
    tokio::sync::RwLock,
    tracing::{debug, info, warn},
    uuid::Uuid,
};

use {
    huddle_common::{
        hooks::{DispatchOutcome, HookStats},
        types::{DataPacket, ExecutionContext, MeetingId, PluginConfig, PluginMetadata},
    },
    huddle_config::{DispatchConfig, HuddleConfig},
    huddle_providers::ModelGateway,
    huddle_state::MeetingStore,
};

use crate::{
    dispatch::{Dispatcher, HookTarget},
    error::{Error, PluginFailure, Result},
    facade::RuntimeFacade,
    lifecycle::{LifecycleError, LifecycleOp, LifecycleState},
    plugin::{HookMap, MeetingPlugin},
};

struct PluginRecord {
    plugin: Arc<dyn MeetingPlugin>,
    /// Descriptor read once at install. Never refreshed.
    metadata: PluginMetadata,
    state: LifecycleState,
    /// Hook maps cached per active meeting, dropped when it ends.
    meetings: HashMap<MeetingId, HookMap>,
}

/// Owns every installed plugin, drives lifecycle transitions, and fans
/// packets out to subscribed hooks.
///
/// Aggregate operations (`startup`, `meeting_start`, `meeting_end`,
/// `shutdown`) apply to every eligible plugin and fail one plugin at a
/// time: the healthy rest always complete, and the per-plugin failures
/// come back in the returned error.
pub struct PluginRuntime {
    id: Uuid,
    plugins: RwLock<HashMap<String, PluginRecord>>,
    facade: Arc<RuntimeFacade>,
    dispatcher: Dispatcher,
    /// Per-plugin startup config overrides from host configuration.
    overrides: HashMap<String, Value>,
    shutdown_grace: Duration,
    stopped: AtomicBool,
}

impl PluginRuntime {
    #[must_use]
    pub fn new(facade: Arc<RuntimeFacade>, dispatch: &DispatchConfig) -> Self {
        let id = Uuid::new_v4();
        info!(
            runtime = %id,
            hook_timeout_secs = dispatch.hook_timeout_secs,
            shutdown_grace_secs = dispatch.shutdown_grace_secs,
            "plugin runtime created"
        );
        Self {
            id,
            plugins: RwLock::new(HashMap::new()),
            facade,
            dispatcher: Dispatcher::new(dispatch.hook_timeout()),
            overrides: HashMap::new(),
            shutdown_grace: dispatch.shutdown_grace(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Replace the per-plugin startup config overrides.
    #[must_use]
    pub fn with_plugin_overrides(mut self, overrides: HashMap<String, Value>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Build the store, the model gateway, and the runtime from host
    /// configuration.
    pub async fn from_config(config: &HuddleConfig) -> Result<Self> {
        let store = match &config.store.path {
            Some(path) => MeetingStore::open(path).await?,
            None => MeetingStore::in_memory().await?,
        };
        let models = ModelGateway::from_config(&config.models);
        let facade = Arc::new(RuntimeFacade::new(models, store));
        Ok(Self::new(facade, &config.dispatch).with_plugin_overrides(config.plugins.clone()))
    }

    /// The capability handle plugins see, for hosts that need direct
    /// store or model access.
    #[must_use]
    pub fn facade(&self) -> Arc<RuntimeFacade> {
        Arc::clone(&self.facade)
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(LifecycleError::RuntimeStopped.into());
        }
        Ok(())
    }

    /// Effective startup config: the host override when one exists, the
    /// install-time default otherwise.
    fn effective_config(&self, metadata: &PluginMetadata) -> PluginConfig {
        self.overrides
            .get(&metadata.name)
            .map(|value| PluginConfig::new(value.clone()))
            .unwrap_or_else(|| metadata.config.clone())
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Register a plugin and run its one-time install callback.
    ///
    /// The metadata descriptor is read here, exactly once, and frozen for
    /// the plugin's lifetime. A failed callback rolls the registration
    /// back entirely.
    pub async fn install(&self, plugin: Arc<dyn MeetingPlugin>) -> Result<()> {
        self.ensure_running()?;
        let metadata = plugin.metadata();
        let name = metadata.name.clone();

        {
            let mut plugins = self.plugins.write().await;
            if plugins.contains_key(&name) {
                return Err(LifecycleError::DuplicatePlugin { plugin: name }.into());
            }
            plugins.insert(
                name.clone(),
                PluginRecord {
                    plugin: Arc::clone(&plugin),
                    metadata,
                    state: LifecycleState::Installed,
                    meetings: HashMap::new(),
                },
            );
        }

        if let Err(err) = plugin.on_install().await {
            self.plugins.write().await.remove(&name);
            warn!(plugin = %name, error = %err, "install callback failed, rolling back");
            return Err(Error::callback(name, "install", err));
        }
        debug!(plugin = %name, "plugin installed");
        Ok(())
    }

    /// Start, or restart, every installed plugin.
    ///
    /// Re-entrant: the hosting container may call this again after a
    /// restart, and each plugin's `on_startup` runs again with its
    /// effective config.
    pub async fn startup(&self) -> Result<()> {
        self.ensure_running()?;
        let targets: Vec<_> = {
            let plugins = self.plugins.read().await;
            plugins
                .values()
                .map(|record| {
                    (
                        record.metadata.name.clone(),
                        Arc::clone(&record.plugin),
                        self.effective_config(&record.metadata),
                        record.state,
                    )
                })
                .collect()
        };

        let mut failures = Vec::new();
        for (name, plugin, config, state) in targets {
            if let Err(err) = state.check(&name, LifecycleOp::Startup) {
                failures.push(PluginFailure::new(name, err.into()));
                continue;
            }
            match plugin.on_startup(&config).await {
                Ok(()) => {
                    if let Some(record) = self.plugins.write().await.get_mut(&name) {
                        record.state = LifecycleState::Started;
                    }
                    debug!(plugin = %name, "plugin started");
                },
                Err(err) => {
                    warn!(plugin = %name, error = %err, "startup callback failed");
                    let failure = Error::callback(name.clone(), "startup", err);
                    failures.push(PluginFailure::new(name, failure));
                },
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Startup { failures })
        }
    }

    /// Activate `meeting` for every started plugin.
    ///
    /// Each plugin's hook map is fetched here, once, and cached for the
    /// meeting's lifetime. Plugins that fail to activate are reported and
    /// skipped; the rest stay active for the meeting.
    pub async fn meeting_start(&self, meeting: &MeetingId) -> Result<()> {
        self.ensure_running()?;
        let targets: Vec<_> = {
            let plugins = self.plugins.read().await;
            plugins
                .values()
                .map(|record| {
                    (
                        record.metadata.name.clone(),
                        Arc::clone(&record.plugin),
                        record.state,
                        record.meetings.contains_key(meeting),
                    )
                })
                .collect()
        };

        let mut failures = Vec::new();
        for (name, plugin, state, already_active) in targets {
            if let Err(err) = state.check(&name, LifecycleOp::MeetingStart) {
                failures.push(PluginFailure::new(name, err.into()));
                continue;
            }
            if already_active {
                let err = LifecycleError::MeetingAlreadyActive {
                    plugin: name.clone(),
                    meeting: meeting.to_string(),
                };
                failures.push(PluginFailure::new(name, err.into()));
                continue;
            }

            let ctx = ExecutionContext::new(meeting.clone(), name.clone());
            if let Err(err) = plugin.on_meeting_start(&ctx, &self.facade).await {
                warn!(plugin = %name, meeting = %meeting, error = %err, "meeting_start callback failed");
                let failure = Error::callback(name.clone(), "meeting_start", err);
                failures.push(PluginFailure::new(name, failure));
                continue;
            }

            let hooks = plugin.data_receive_hooks();
            if let Some(record) = self.plugins.write().await.get_mut(&name) {
                record.meetings.insert(meeting.clone(), hooks);
            }
            debug!(plugin = %name, meeting = %meeting, "meeting active");
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::MeetingStart {
                meeting: meeting.clone(),
                failures,
            })
        }
    }

    /// Deactivate `meeting` for every plugin holding it active.
    ///
    /// Plugins that never activated the meeting are skipped: ending a
    /// meeting whose resources were never allocated is not an error. The
    /// cached hook map is dropped even when the callback fails.
    pub async fn meeting_end(&self, meeting: &MeetingId) -> Result<()> {
        self.ensure_running()?;
        let failures = self.end_meeting_for_all(meeting).await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::MeetingEnd {
                meeting: meeting.clone(),
                failures,
            })
        }
    }

    async fn end_meeting_for_all(&self, meeting: &MeetingId) -> Vec<PluginFailure> {
        let targets: Vec<_> = {
            let plugins = self.plugins.read().await;
            plugins
                .values()
                .filter(|record| record.meetings.contains_key(meeting))
                .map(|record| (record.metadata.name.clone(), Arc::clone(&record.plugin)))
                .collect()
        };

        let mut failures = Vec::new();
        for (name, plugin) in targets {
            let ctx = ExecutionContext::new(meeting.clone(), name.clone());
            if let Err(err) = plugin.on_meeting_end(&ctx, &self.facade).await {
                warn!(plugin = %name, meeting = %meeting, error = %err, "meeting_end callback failed");
                let failure = Error::callback(name.clone(), "meeting_end", err);
                failures.push(PluginFailure::new(name.clone(), failure));
            }
            if let Some(record) = self.plugins.write().await.get_mut(&name) {
                record.meetings.remove(meeting);
            }
            debug!(plugin = %name, meeting = %meeting, "meeting inactive");
        }
        failures
    }

    /// Stop every plugin and the dispatcher.
    ///
    /// Meetings still active are force-deactivated first, then in-flight
    /// hooks get the configured grace period, then each started plugin's
    /// `on_shutdown` runs. Terminal: every later operation fails with
    /// [`LifecycleError::RuntimeStopped`].
    pub async fn shutdown(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Err(LifecycleError::RuntimeStopped.into());
        }

        let open_meetings: Vec<MeetingId> = {
            let plugins = self.plugins.read().await;
            let mut meetings: Vec<MeetingId> = plugins
                .values()
                .flat_map(|record| record.meetings.keys().cloned())
                .collect();
            meetings.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            meetings.dedup();
            meetings
        };

        let mut failures = Vec::new();
        for meeting in open_meetings {
            warn!(meeting = %meeting, "meeting still active at shutdown, ending it");
            failures.extend(self.end_meeting_for_all(&meeting).await);
        }

        self.dispatcher.drain(self.shutdown_grace).await;

        let targets: Vec<_> = {
            let plugins = self.plugins.read().await;
            plugins
                .values()
                .map(|record| {
                    (
                        record.metadata.name.clone(),
                        Arc::clone(&record.plugin),
                        record.state,
                    )
                })
                .collect()
        };
        for (name, plugin, state) in targets {
            if state == LifecycleState::Started {
                if let Err(err) = plugin.on_shutdown(&self.facade).await {
                    warn!(plugin = %name, error = %err, "shutdown callback failed");
                    let failure = Error::callback(name.clone(), "shutdown", err);
                    failures.push(PluginFailure::new(name.clone(), failure));
                }
            }
            if let Some(record) = self.plugins.write().await.get_mut(&name) {
                record.state = LifecycleState::Stopped;
            }
        }

        info!(runtime = %self.id, "plugin runtime stopped");
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Shutdown { failures })
        }
    }

    // ── Dispatch ────────────────────────────────────────────────────────────

    /// Fan one packet out to every plugin whose cached hook map for the
    /// packet's meeting subscribes to its source.
    ///
    /// Hook failures are isolated and reported in the outcome, never as an
    /// error. A packet for an inactive meeting, an unsubscribed source, or
    /// a stopped runtime is dropped with a clean outcome.
    pub async fn dispatch(&self, packet: DataPacket) -> DispatchOutcome {
        if self.stopped.load(Ordering::SeqCst) {
            debug!(
                meeting = %packet.origin.meeting_id,
                source = %packet.origin.source,
                "runtime stopped, dropping packet"
            );
            return DispatchOutcome::default();
        }

        let targets: Vec<HookTarget> = {
            let plugins = self.plugins.read().await;
            plugins
                .values()
                .filter(|record| record.state == LifecycleState::Started)
                .filter_map(|record| {
                    record
                        .meetings
                        .get(&packet.origin.meeting_id)
                        .and_then(|hooks| hooks.get(&packet.origin.source))
                        .map(|hook| HookTarget {
                            plugin: record.metadata.name.clone(),
                            hook: Arc::clone(hook),
                        })
                })
                .collect()
        };

        self.dispatcher.dispatch(packet, targets, &self.facade).await
    }

    /// Dispatch statistics for one (plugin, source) hook, if it was ever
    /// invoked.
    #[must_use]
    pub fn hook_stats(&self, plugin: &str, source: &str) -> Option<Arc<HookStats>> {
        self.dispatcher.stats(plugin, source)
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    /// Current lifecycle state of one plugin.
    pub async fn plugin_state(&self, plugin: &str) -> Result<LifecycleState> {
        self.plugins
            .read()
            .await
            .get(plugin)
            .map(|record| record.state)
            .ok_or_else(|| {
                LifecycleError::UnknownPlugin {
                    plugin: plugin.to_owned(),
                }
                .into()
            })
    }

    /// The frozen install-time descriptor of one plugin.
    pub async fn plugin_metadata(&self, plugin: &str) -> Option<PluginMetadata> {
        self.plugins
            .read()
            .await
            .get(plugin)
            .map(|record| record.metadata.clone())
    }

    /// Whether `meeting` is currently active for `plugin`.
    pub async fn is_meeting_active(&self, plugin: &str, meeting: &MeetingId) -> bool {
        self.plugins
            .read()
            .await
            .get(plugin)
            .is_some_and(|record| record.meetings.contains_key(meeting))
    }

    /// Installed plugin names, sorted.
    pub async fn plugin_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.plugins.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}
