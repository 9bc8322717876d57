//! Dispatch telemetry shared between the runtime and anything observing it.
//!
//! The dispatcher itself lives in `huddle-runtime`; this module carries the
//! per-hook statistics and the isolated-failure record it reports, so that
//! callers can inspect dispatch outcomes without depending on the runtime.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ── Per-hook statistics ─────────────────────────────────────────────────────

/// Execution statistics for one (plugin, source) hook, updated atomically by
/// the dispatcher across meetings.
#[derive(Debug, Default)]
pub struct HookStats {
    pub call_count: AtomicU64,
    pub failure_count: AtomicU64,
    pub timeout_count: AtomicU64,
    pub total_latency_us: AtomicU64,
}

impl HookStats {
    pub fn record_success(&self, latency_us: u64) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    pub fn record_failure(&self, latency_us: u64) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    /// A timeout counts as both a call and a failure.
    pub fn record_timeout(&self, latency_us: u64) {
        self.record_failure(latency_us);
        self.timeout_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Average latency per call in microseconds (0 if never called).
    #[must_use]
    pub fn avg_latency_us(&self) -> u64 {
        let calls = self.call_count.load(Ordering::Relaxed);
        if calls == 0 {
            0
        } else {
            self.total_latency_us.load(Ordering::Relaxed) / calls
        }
    }
}

// ── Isolated failures ───────────────────────────────────────────────────────

/// Why an isolated hook invocation failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The hook returned an error.
    Error(String),
    /// The hook exceeded the per-hook time budget and was aborted.
    Timeout { limit_ms: u64 },
    /// The hook panicked; the panic was contained in its task.
    Panicked(String),
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(message) => f.write_str(message),
            Self::Timeout { limit_ms } => write!(f, "timed out after {limit_ms}ms"),
            Self::Panicked(message) => write!(f, "panicked: {message}"),
        }
    }
}

/// A hook failure captured during dispatch.
///
/// Every hook invocation is isolated: one failing hook never prevents
/// delivery to sibling hooks or aborts the dispatch loop. The failure is
/// recorded here and surfaced through [`DispatchOutcome`] instead of
/// propagating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchIsolationFailure {
    /// Plugin whose hook failed.
    pub plugin: String,
    /// Source the failing hook was subscribed to.
    pub source: String,
    pub reason: FailureReason,
}

// Hand-written instead of `#[derive(thiserror::Error)]`: the `source` field is
// the hook's subscription source, not an error cause, and thiserror offers no
// way to opt a field with that name out of `Error::source()`.
impl std::fmt::Display for DispatchIsolationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hook {}/{} failed: {}",
            self.plugin, self.source, self.reason
        )
    }
}

impl std::error::Error for DispatchIsolationFailure {}

/// Result of fanning one packet out to its subscribed hooks.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// Number of hooks the packet was delivered to.
    pub delivered: usize,
    /// Isolated failures, one per hook that errored, timed out, or panicked.
    pub failures: Vec<DispatchIsolationFailure>,
}

impl DispatchOutcome {
    /// True when every subscribed hook completed without failure.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.delivered - self.failures.len()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_stats_tracking() {
        let stats = HookStats::default();
        stats.record_success(100);
        stats.record_success(300);
        stats.record_failure(200);

        assert_eq!(stats.call_count.load(Ordering::Relaxed), 3);
        assert_eq!(stats.failure_count.load(Ordering::Relaxed), 1);
        assert_eq!(stats.timeout_count.load(Ordering::Relaxed), 0);
        assert_eq!(stats.avg_latency_us(), 200);
    }

    #[test]
    fn timeout_counts_as_call_and_failure() {
        let stats = HookStats::default();
        stats.record_timeout(30_000);

        assert_eq!(stats.call_count.load(Ordering::Relaxed), 1);
        assert_eq!(stats.failure_count.load(Ordering::Relaxed), 1);
        assert_eq!(stats.timeout_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn avg_latency_is_zero_before_any_call() {
        assert_eq!(HookStats::default().avg_latency_us(), 0);
    }

    #[test]
    fn outcome_reports_clean_and_failed_fanout() {
        let clean = DispatchOutcome {
            delivered: 2,
            failures: vec![],
        };
        assert!(clean.is_clean());
        assert_eq!(clean.succeeded(), 2);

        let failed = DispatchOutcome {
            delivered: 3,
            failures: vec![DispatchIsolationFailure {
                plugin: "recap".into(),
                source: "transcript".into(),
                reason: FailureReason::Timeout { limit_ms: 30_000 },
            }],
        };
        assert!(!failed.is_clean());
        assert_eq!(failed.succeeded(), 2);
    }

    #[test]
    fn failure_display_names_plugin_and_source() {
        let failure = DispatchIsolationFailure {
            plugin: "recap".into(),
            source: "transcript".into(),
            reason: FailureReason::Error("boom".into()),
        };
        assert_eq!(failure.to_string(), "hook recap/transcript failed: boom");
    }
}
