//! Routing statistics.
//!
//! One [`RouterStatistics`] is created by the host and shared by the router
//! and dispatch engine it builds. Every increment is mirrored to the
//! OpenTelemetry counters in [`metrics`](crate::metrics).

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::Level;

use crate::metrics;

/// One named value in a statistics snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatRecord {
    /// Component the value belongs to
    pub component: String,
    pub description: &'static str,
    pub value: u64,
    /// Verbosity at which monitoring should show the value
    pub level: Level,
}

/// Counters for routing and dispatch activity.
#[derive(Debug)]
pub struct RouterStatistics {
    component: String,
    is_local_checks: AtomicU64,
    anonymous_checks: AtomicU64,
    local_resolutions: AtomicU64,
    non_local_resolutions: AtomicU64,
    dispatched: AtomicU64,
    dispatch_errors: AtomicU64,
}

impl RouterStatistics {
    /// Create an empty collector reporting under `component`.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            is_local_checks: AtomicU64::new(0),
            anonymous_checks: AtomicU64::new(0),
            local_resolutions: AtomicU64::new(0),
            non_local_resolutions: AtomicU64::new(0),
            dispatched: AtomicU64::new(0),
            dispatch_errors: AtomicU64::new(0),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn record_is_local_check(&self) {
        self.is_local_checks.fetch_add(1, Ordering::Relaxed);
        metrics::record_lookup("is_local");
    }

    pub fn record_anonymous_check(&self) {
        self.anonymous_checks.fetch_add(1, Ordering::Relaxed);
        metrics::record_lookup("anonymous");
    }

    pub fn record_local_resolution(&self) {
        self.local_resolutions.fetch_add(1, Ordering::Relaxed);
        metrics::record_lookup("local");
    }

    pub fn record_non_local_resolution(&self) {
        self.non_local_resolutions.fetch_add(1, Ordering::Relaxed);
        metrics::record_lookup("non_local");
    }

    pub fn record_dispatch(&self, stanza_kind: &str, path: &'static str) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        metrics::record_dispatch(stanza_kind, path);
    }

    pub fn record_dispatch_error(&self, processor: &str, condition: &str) {
        self.dispatch_errors.fetch_add(1, Ordering::Relaxed);
        metrics::record_dispatch_error(processor, condition);
    }

    pub fn is_local_checks(&self) -> u64 {
        self.is_local_checks.load(Ordering::Relaxed)
    }

    pub fn anonymous_checks(&self) -> u64 {
        self.anonymous_checks.load(Ordering::Relaxed)
    }

    pub fn local_resolutions(&self) -> u64 {
        self.local_resolutions.load(Ordering::Relaxed)
    }

    pub fn non_local_resolutions(&self) -> u64 {
        self.non_local_resolutions.load(Ordering::Relaxed)
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn dispatch_errors(&self) -> u64 {
        self.dispatch_errors.load(Ordering::Relaxed)
    }

    /// Point-in-time values for external monitoring.
    pub fn snapshot(&self, vhost_count: usize) -> Vec<StatRecord> {
        let record = |description, value, level| StatRecord {
            component: self.component.clone(),
            description,
            value,
            level,
        };

        vec![
            record("Number of VHosts", vhost_count as u64, Level::DEBUG),
            record("Checks: is local domain", self.is_local_checks(), Level::TRACE),
            record("Checks: is anonymous domain", self.anonymous_checks(), Level::TRACE),
            record(
                "Get components for local domain",
                self.local_resolutions(),
                Level::TRACE,
            ),
            record(
                "Get components for non-local domain",
                self.non_local_resolutions(),
                Level::TRACE,
            ),
            record("Stanzas dispatched", self.dispatched(), Level::DEBUG),
            record("Dispatch errors", self.dispatch_errors(), Level::DEBUG),
        ]
    }
}

impl Default for RouterStatistics {
    fn default() -> Self {
        Self::new("vhost-man")
    }
}
