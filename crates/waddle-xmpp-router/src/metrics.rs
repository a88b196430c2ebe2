//! Routing metrics for observability.
//!
//! Uses the global OpenTelemetry meter provider, which must be initialized
//! by the host application. Without one every recording is a no-op.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::KeyValue;
use std::sync::OnceLock;

static METER: OnceLock<Meter> = OnceLock::new();

fn meter() -> &'static Meter {
    METER.get_or_init(|| opentelemetry::global::meter("waddle-xmpp-router"))
}

// ============================================================================
// Counters (Cumulative)
// ============================================================================

/// Counter for routing table lookups.
pub fn routing_lookups() -> Counter<u64> {
    meter()
        .u64_counter("xmpp.routing.lookups")
        .with_description("Total routing table lookups")
        .with_unit("lookup")
        .build()
}

/// Counter for stanzas dispatched to processors.
pub fn stanzas_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("xmpp.dispatch.stanzas")
        .with_description("Total stanzas run through the dispatch engine")
        .with_unit("stanza")
        .build()
}

/// Counter for processor failures turned into error replies or drops.
pub fn dispatch_errors() -> Counter<u64> {
    meter()
        .u64_counter("xmpp.dispatch.errors")
        .with_description("Total processor failures during dispatch")
        .with_unit("error")
        .build()
}

// ============================================================================
// Gauges (Current State)
// ============================================================================

/// Gauge for registered components.
pub fn components_registered() -> Gauge<i64> {
    meter()
        .i64_gauge("xmpp.routing.components")
        .with_description("Current number of registered server components")
        .with_unit("component")
        .build()
}

// ============================================================================
// Histograms (Latency)
// ============================================================================

/// Histogram for dispatch latency.
pub fn dispatch_latency() -> Histogram<f64> {
    meter()
        .f64_histogram("xmpp.dispatch.latency")
        .with_description("Stanza dispatch latency")
        .with_unit("ms")
        .build()
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Record a routing lookup (`is_local`, `anonymous`, `local`, `non_local`).
pub fn record_lookup(kind: &'static str) {
    routing_lookups().add(1, &[KeyValue::new("kind", kind)]);
}

/// Record a dispatched stanza and the path it took.
pub fn record_dispatch(stanza_kind: &str, path: &'static str) {
    stanzas_dispatched().add(
        1,
        &[
            KeyValue::new("type", stanza_kind.to_string()),
            KeyValue::new("path", path),
        ],
    );
}

/// Record a processor failure.
pub fn record_dispatch_error(processor: &str, condition: &str) {
    dispatch_errors().add(
        1,
        &[
            KeyValue::new("processor", processor.to_string()),
            KeyValue::new("condition", condition.to_string()),
        ],
    );
}

/// Record the number of registered components.
pub fn record_component_count(count: i64) {
    components_registered().record(count, &[]);
}

/// Record dispatch latency in milliseconds.
pub fn record_dispatch_latency(latency_ms: f64, path: &'static str) {
    dispatch_latency().record(latency_ms, &[KeyValue::new("path", path)]);
}
