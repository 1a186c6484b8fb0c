//! Metrics registry for clusterclaims observability
//!
//! OpenTelemetry instruments for the claim reconcile loop. Exported through
//! the OTLP pipeline set up in [`crate::telemetry`]; without an endpoint the
//! global meter is a no-op and recording is free.

use std::time::Duration;

use once_cell::sync::Lazy;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};

use crate::kind_registry::RecordKind;

/// Global meter for clusterclaims metrics
static METER: Lazy<Meter> = Lazy::new(|| global::meter("clusterclaims"));

/// Counter of claim reconciliations
///
/// Labels:
/// - `result`: success, error
/// - `outcome`: missing, unbound, ensured, torn_down (success only)
/// - `error_type`: kube, unknown_kind, serialization, internal (error only)
pub static RECONCILE_TOTAL: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("clusterclaims_reconcile_total")
        .with_description("Total number of ClusterClaim reconciliations")
        .with_unit("{reconciliations}")
        .build()
});

/// Histogram of claim reconciliation duration
///
/// Labels:
/// - `result`: success, error
pub static RECONCILE_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("clusterclaims_reconcile_duration_seconds")
        .with_description("Duration of ClusterClaim reconciliation in seconds")
        .with_unit("s")
        .build()
});

/// Counter of downstream records created
///
/// Labels:
/// - `kind`: ManagedCluster, KlusterletAddonConfig
pub static RECORDS_CREATED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("clusterclaims_records_created_total")
        .with_description("Total number of downstream records created")
        .with_unit("{records}")
        .build()
});

/// Counter of downstream records deleted
///
/// Labels:
/// - `kind`: ManagedCluster, KlusterletAddonConfig
pub static RECORDS_DELETED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("clusterclaims_records_deleted_total")
        .with_description("Total number of downstream records deleted")
        .with_unit("{records}")
        .build()
});

/// Record a successful reconciliation
pub fn record_reconcile_success(outcome: &'static str, elapsed: Duration) {
    RECONCILE_TOTAL.add(
        1,
        &[
            KeyValue::new("result", "success"),
            KeyValue::new("outcome", outcome),
        ],
    );
    RECONCILE_DURATION.record(elapsed.as_secs_f64(), &[KeyValue::new("result", "success")]);
}

/// Record a failed reconciliation
pub fn record_reconcile_error(error_type: &'static str, elapsed: Duration) {
    RECONCILE_TOTAL.add(
        1,
        &[
            KeyValue::new("result", "error"),
            KeyValue::new("error_type", error_type),
        ],
    );
    RECONCILE_DURATION.record(elapsed.as_secs_f64(), &[KeyValue::new("result", "error")]);
}

/// Record the creation of a downstream record
pub fn record_created(kind: RecordKind) {
    RECORDS_CREATED.add(1, &[KeyValue::new("kind", kind.kind_str())]);
}

/// Record the deletion of a downstream record
pub fn record_deleted(kind: RecordKind) {
    RECORDS_DELETED.add(1, &[KeyValue::new("kind", kind.kind_str())]);
}
