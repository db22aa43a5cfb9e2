//! Global atomic counters for HealthHub observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. on shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    programs_run: AtomicU64,
    effects_interpreted: AtomicU64,
    business_failures: AtomicU64,
    audit_records_written: AtomicU64,
    audit_failures: AtomicU64,
    notifications_dropped: AtomicU64,
    step_timeouts: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            programs_run: AtomicU64::new(0),
            effects_interpreted: AtomicU64::new(0),
            business_failures: AtomicU64::new(0),
            audit_records_written: AtomicU64::new(0),
            audit_failures: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            step_timeouts: AtomicU64::new(0),
        }
    }

    pub fn inc_programs_run(&self) {
        self.programs_run.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "programs_run", "counter incremented");
    }

    pub fn inc_effects_interpreted(&self) {
        self.effects_interpreted.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "effects_interpreted", "counter incremented");
    }

    /// A program terminated with a typed failure.
    pub fn inc_business_failures(&self) {
        self.business_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "business_failures", "counter incremented");
    }

    pub fn inc_audit_records(&self) {
        self.audit_records_written.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "audit_records_written", "counter incremented");
    }

    pub fn inc_audit_failures(&self) {
        self.audit_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "audit_failures", "counter incremented");
    }

    pub fn inc_notifications_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "notifications_dropped", "counter incremented");
    }

    pub fn inc_step_timeouts(&self) {
        self.step_timeouts.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "step_timeouts", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            programs_run = self.programs_run(),
            effects_interpreted = self.effects_interpreted(),
            business_failures = self.business_failures(),
            audit_records_written = self.audit_records_written(),
            audit_failures = self.audit_failures(),
            notifications_dropped = self.notifications_dropped(),
            step_timeouts = self.step_timeouts(),
        );
    }

    pub fn programs_run(&self) -> u64 {
        self.programs_run.load(Ordering::Relaxed)
    }

    pub fn effects_interpreted(&self) -> u64 {
        self.effects_interpreted.load(Ordering::Relaxed)
    }

    pub fn business_failures(&self) -> u64 {
        self.business_failures.load(Ordering::Relaxed)
    }

    pub fn audit_records_written(&self) -> u64 {
        self.audit_records_written.load(Ordering::Relaxed)
    }

    pub fn audit_failures(&self) -> u64 {
        self.audit_failures.load(Ordering::Relaxed)
    }

    pub fn notifications_dropped(&self) -> u64 {
        self.notifications_dropped.load(Ordering::Relaxed)
    }

    pub fn step_timeouts(&self) -> u64 {
        self.step_timeouts.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.programs_run.store(0, Ordering::Relaxed);
        self.effects_interpreted.store(0, Ordering::Relaxed);
        self.business_failures.store(0, Ordering::Relaxed);
        self.audit_records_written.store(0, Ordering::Relaxed);
        self.audit_failures.store(0, Ordering::Relaxed);
        self.notifications_dropped.store(0, Ordering::Relaxed);
        self.step_timeouts.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        m.inc_programs_run();
        m.inc_effects_interpreted();
        m.inc_effects_interpreted();
        m.inc_notifications_dropped();
        assert_eq!(m.programs_run(), 1);
        assert_eq!(m.effects_interpreted(), 2);
        assert_eq!(m.notifications_dropped(), 1);
        assert_eq!(m.audit_failures(), 0);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_business_failures();
        m.inc_audit_records();
        m.inc_audit_failures();
        m.inc_step_timeouts();
        m.reset();
        assert_eq!(m.business_failures(), 0);
        assert_eq!(m.audit_records_written(), 0);
        assert_eq!(m.audit_failures(), 0);
        assert_eq!(m.step_timeouts(), 0);
    }
}
