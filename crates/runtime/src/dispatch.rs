//! Packet fan-out: one task per subscribed hook, with isolation, a time
//! budget, and per-hook statistics.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {
    chrono::Utc,
    dashmap::DashMap,
    futures::future::join_all,
    tokio_util::task::TaskTracker,
    tracing::{debug, warn},
};

use {
    huddle_common::{
        hooks::{DispatchIsolationFailure, DispatchOutcome, FailureReason, HookStats},
        types::{DataPacket, ExecutionContext},
    },
    huddle_state::HistoryEntry,
};

use crate::{facade::RuntimeFacade, plugin::DataHook};

/// One resolved delivery target for a packet.
pub(crate) struct HookTarget {
    pub plugin: String,
    pub hook: Arc<dyn DataHook>,
}

/// Fans packets out to hook tasks and records what happened to each.
pub(crate) struct Dispatcher {
    hook_timeout: Duration,
    tracker: TaskTracker,
    stats: DashMap<String, Arc<HookStats>>,
}

fn stats_key(plugin: &str, source: &str) -> String {
    format!("{plugin}/{source}")
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "opaque panic payload".to_owned())
}

impl Dispatcher {
    pub fn new(hook_timeout: Duration) -> Self {
        Self {
            hook_timeout,
            tracker: TaskTracker::new(),
            stats: DashMap::new(),
        }
    }

    /// Statistics for one (plugin, source) hook, if it was ever invoked.
    pub fn stats(&self, plugin: &str, source: &str) -> Option<Arc<HookStats>> {
        self.stats
            .get(&stats_key(plugin, source))
            .map(|entry| Arc::clone(entry.value()))
    }

    fn stats_entry(&self, plugin: &str, source: &str) -> Arc<HookStats> {
        Arc::clone(
            self.stats
                .entry(stats_key(plugin, source))
                .or_default()
                .value(),
        )
    }

    /// Deliver `packet` to every target concurrently.
    ///
    /// Each hook runs in its own task under the time budget. A hook that
    /// errors, overruns, or panics is recorded in the outcome and aborted
    /// if still running; siblings are never affected. Hook outputs are
    /// appended to the owning plugin's packet history.
    pub async fn dispatch(
        &self,
        packet: DataPacket,
        targets: Vec<HookTarget>,
        facade: &Arc<RuntimeFacade>,
    ) -> DispatchOutcome {
        if targets.is_empty() {
            debug!(
                meeting = %packet.origin.meeting_id,
                source = %packet.origin.source,
                "no subscribers for packet"
            );
            return DispatchOutcome::default();
        }

        let delivered = targets.len();
        let source = packet.origin.source.clone();
        let limit_ms = self.hook_timeout.as_millis() as u64;

        let mut invocations = Vec::with_capacity(delivered);
        for HookTarget { plugin, hook } in targets {
            let stats = self.stats_entry(&plugin, &source);
            let task_packet = packet.clone();
            let task_facade = Arc::clone(facade);
            let handle = self
                .tracker
                .spawn(async move { hook.on_packet(task_packet, task_facade).await });
            invocations.push((plugin, stats, handle));
        }

        let budget = self.hook_timeout;
        let results = join_all(invocations.into_iter().map(|(plugin, stats, handle)| {
            async move {
                let abort = handle.abort_handle();
                let started = Instant::now();
                let result = tokio::time::timeout(budget, handle).await;
                if result.is_err() {
                    abort.abort();
                }
                (plugin, stats, started.elapsed(), result)
            }
        }))
        .await;

        let mut failures = Vec::new();
        let mut outputs = Vec::new();
        for (plugin, stats, elapsed, result) in results {
            let latency_us = elapsed.as_micros() as u64;
            match result {
                Ok(Ok(Ok(Some(value)))) => {
                    stats.record_success(latency_us);
                    outputs.push((plugin, value));
                },
                Ok(Ok(Ok(None))) => stats.record_success(latency_us),
                Ok(Ok(Err(err))) => {
                    stats.record_failure(latency_us);
                    warn!(plugin = %plugin, source = %source, error = %err, "hook failed");
                    failures.push(DispatchIsolationFailure {
                        plugin,
                        source: source.clone(),
                        reason: FailureReason::Error(err.to_string()),
                    });
                },
                Ok(Err(join_err)) => {
                    stats.record_failure(latency_us);
                    let reason = match join_err.try_into_panic() {
                        Ok(payload) => FailureReason::Panicked(panic_message(payload.as_ref())),
                        Err(_) => FailureReason::Error("hook task cancelled".to_owned()),
                    };
                    warn!(plugin = %plugin, source = %source, reason = %reason, "hook task died");
                    failures.push(DispatchIsolationFailure {
                        plugin,
                        source: source.clone(),
                        reason,
                    });
                },
                Err(_) => {
                    stats.record_timeout(latency_us);
                    warn!(plugin = %plugin, source = %source, limit_ms, "hook timed out, aborting it");
                    failures.push(DispatchIsolationFailure {
                        plugin,
                        source: source.clone(),
                        reason: FailureReason::Timeout { limit_ms },
                    });
                },
            }
        }

        // Hook outputs become history entries under the handling plugin's
        // context. Unstamped packets take receipt time.
        let produced_at = packet.timestamp.unwrap_or_else(Utc::now);
        for (plugin, value) in outputs {
            let ctx = ExecutionContext::new(packet.origin.meeting_id.clone(), plugin);
            let entry = HistoryEntry::new(produced_at, source.clone(), value);
            if let Err(err) = facade.store().append_history(&ctx, &entry).await {
                warn!(context = %ctx, error = %err, "failed to record hook output");
            }
        }

        DispatchOutcome { delivered, failures }
    }

    /// Close the tracker and wait up to `grace` for in-flight hooks.
    pub async fn drain(&self, grace: Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                "hooks still running after shutdown grace"
            );
        }
    }
}
