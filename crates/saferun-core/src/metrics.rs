//! Global atomic counters for pipeline observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of an orchestrator cycle
//! or before process exit).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters — no allocations, no locking.
pub struct Metrics {
    commands_analyzed: AtomicU64,
    commands_blocked: AtomicU64,
    executions_run: AtomicU64,
    executions_timed_out: AtomicU64,
    probes_run: AtomicU64,
    probe_cache_hits: AtomicU64,
    rollbacks_logged: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            commands_analyzed: AtomicU64::new(0),
            commands_blocked: AtomicU64::new(0),
            executions_run: AtomicU64::new(0),
            executions_timed_out: AtomicU64::new(0),
            probes_run: AtomicU64::new(0),
            probe_cache_hits: AtomicU64::new(0),
            rollbacks_logged: AtomicU64::new(0),
        }
    }

    pub fn inc_commands_analyzed(&self) {
        self.commands_analyzed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_commands_blocked(&self) {
        self.commands_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_executions_run(&self) {
        self.executions_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_executions_timed_out(&self) {
        self.executions_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_probes_run(&self) {
        self.probes_run.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_probe_cache_hits(&self) {
        self.probe_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rollbacks_logged(&self) {
        self.rollbacks_logged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn probes_run(&self) -> u64 {
        self.probes_run.load(Ordering::Relaxed)
    }

    pub fn probe_cache_hits(&self) -> u64 {
        self.probe_cache_hits.load(Ordering::Relaxed)
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries (end of a cycle, CLI exit) rather
    /// than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            commands_analyzed = self.commands_analyzed.load(Ordering::Relaxed),
            commands_blocked = self.commands_blocked.load(Ordering::Relaxed),
            executions_run = self.executions_run.load(Ordering::Relaxed),
            executions_timed_out = self.executions_timed_out.load(Ordering::Relaxed),
            probes_run = self.probes_run.load(Ordering::Relaxed),
            probe_cache_hits = self.probe_cache_hits.load(Ordering::Relaxed),
            rollbacks_logged = self.rollbacks_logged.load(Ordering::Relaxed),
        );
    }
}
