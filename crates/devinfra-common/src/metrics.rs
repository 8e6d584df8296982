//! Metrics registry for devinfra observability
//!
//! OpenTelemetry instruments for Requirement reconciliation and Cache pool
//! usage. Instruments are created lazily on the global meter, so they are
//! no-ops until a meter provider is installed by telemetry init.

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

/// Global meter for devinfra metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("devinfra"));

// ============================================================================
// Reconcile Metrics
// ============================================================================

/// Histogram of Requirement reconciliation duration
///
/// Labels:
/// - `result`: success, error
pub static REQUIREMENT_RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("devinfra_requirement_reconcile_duration_seconds")
        .with_description("Duration of Requirement reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Counter of Requirement reconciliation errors
///
/// Labels:
/// - `error_type`: kube, conflict, not_found, validation, serialization, timeout, internal
pub static REQUIREMENT_RECONCILE_ERRORS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("devinfra_requirement_reconcile_errors_total")
        .with_description("Total number of Requirement reconciliation errors")
        .with_unit("{errors}")
        .build()
});

// ============================================================================
// Cache Pool Metrics
// ============================================================================

/// Counter of Cache pool lookups
///
/// Labels:
/// - `result`: hit, miss, empty
pub static CACHE_LOOKUPS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("devinfra_cache_lookups_total")
        .with_description("Total number of Cache pool lookups")
        .with_unit("{lookups}")
        .build()
});

/// Counter of claims lost to a concurrent writer
pub static CACHE_CLAIM_CONFLICTS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("devinfra_cache_claim_conflicts_total")
        .with_description("Total number of Operation claims that lost a write race")
        .with_unit("{conflicts}")
        .build()
});

/// Counter of claimed Operations released on Requirement deletion
pub static OPERATIONS_RELEASED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("devinfra_operations_released_total")
        .with_description("Total number of claimed Operations released back to their Cache")
        .with_unit("{operations}")
        .build()
});

// ============================================================================
// Helper Types
// ============================================================================

/// Outcome of a Cache pool lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheLookup {
    /// An Operation was claimed
    Hit,
    /// The Requirement was satisfied without the pool
    Miss,
    /// The pool had nothing acquirable
    Empty,
}

impl CacheLookup {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Empty => "empty",
        }
    }
}

// ============================================================================
// Metric Recording Helpers
// ============================================================================

/// Times one Requirement reconciliation
pub struct ReconcileTimer {
    start: std::time::Instant,
}

impl ReconcileTimer {
    /// Start timing a reconciliation
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Record successful completion
    pub fn success(self) {
        REQUIREMENT_RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("result", "success")],
        );
    }

    /// Record error completion
    pub fn error(self, error_type: &'static str) {
        REQUIREMENT_RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("result", "error")],
        );
        REQUIREMENT_RECONCILE_ERRORS.add(1, &[KeyValue::new("error_type", error_type)]);
    }
}

/// Record the outcome of a Cache pool lookup
pub fn record_cache_lookup(result: CacheLookup) {
    CACHE_LOOKUPS.add(1, &[KeyValue::new("result", result.as_str())]);
}

/// Record a claim that lost a write race
pub fn record_claim_conflict() {
    CACHE_CLAIM_CONFLICTS.add(1, &[]);
}

/// Record a released Operation
pub fn record_operation_released() {
    OPERATIONS_RELEASED.add(1, &[]);
}
