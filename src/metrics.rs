//! OpenTelemetry metrics for the reconcile loop
//!
//! Instruments are created lazily against the global meter provider, which
//! [`crate::telemetry::init_telemetry`] installs when an OTLP endpoint is
//! configured. Without one they record into a no-op provider.

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

static METER: Lazy<Meter> = Lazy::new(|| global::meter("nginx-operator"));

/// Counter of reconcile invocations
pub static RECONCILES_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("nginx_operator_reconciles_total")
        .with_description("Total number of NginxOperator reconciliations")
        .with_unit("{reconciles}")
        .build()
});

/// Counter of failed reconciles
///
/// Labels:
/// - `reason`: error kind (conflict, kube, template, ...)
pub static RECONCILE_ERRORS_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("nginx_operator_reconcile_errors_total")
        .with_description("Total number of failed NginxOperator reconciliations")
        .with_unit("{errors}")
        .build()
});

/// Counter of Deployment updates rejected for a stale resourceVersion
pub static UPDATE_CONFLICTS_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("nginx_operator_update_conflicts_total")
        .with_description("Total number of optimistic-concurrency conflicts on Deployment updates")
        .with_unit("{conflicts}")
        .build()
});

/// Histogram of reconcile duration
///
/// Labels:
/// - `result`: success, error
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("nginx_operator_reconcile_duration_seconds")
        .with_description("Duration of NginxOperator reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Timer for one reconcile
pub struct ReconcileTimer {
    start: std::time::Instant,
}

impl ReconcileTimer {
    /// Start timing a reconciliation
    pub fn start() -> Self {
        RECONCILES_TOTAL.add(1, &[]);
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Record successful completion
    pub fn success(self) {
        RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("result", "success")],
        );
    }

    /// Record error completion
    pub fn error(self) {
        RECONCILE_DURATION.record(
            self.start.elapsed().as_secs_f64(),
            &[KeyValue::new("result", "error")],
        );
    }
}

/// Record a failed reconcile by error kind
pub fn record_reconcile_error(reason: &'static str) {
    RECONCILE_ERRORS_TOTAL.add(1, &[KeyValue::new("reason", reason)]);
}

/// Record a Deployment update conflict
pub fn record_update_conflict() {
    UPDATE_CONFLICTS_TOTAL.add(1, &[]);
}
