//! Prometheus metrics (spec §6).
//!
//! One histogram, `operation_duration_seconds`, labeled by driver, operation
//! name and outcome. Bucket boundaries match the external-snapshotter
//! convention so dashboards built against the upstream sidecar keep working
//! unmodified.

use std::time::Instant;

use once_cell::sync::Lazy;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

pub const OPERATION_CREATE_SNAPSHOT: &str = "CreateSnapshot";
pub const OPERATION_DELETE_SNAPSHOT: &str = "DeleteSnapshot";
pub const OPERATION_CREATE_GROUP_SNAPSHOT: &str = "CreateVolumeGroupSnapshot";
pub const OPERATION_DELETE_GROUP_SNAPSHOT: &str = "DeleteVolumeGroupSnapshot";

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAIL: &str = "fail";

const BUCKET_BOUNDS: &[f64] = &[
    0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0,
];

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    pub driver: String,
    pub operation: String,
    pub status: String,
}

pub static OPERATION_DURATION: Lazy<Family<OperationLabels, Histogram>> = Lazy::new(|| {
    Family::new_with_constructor(|| Histogram::new(BUCKET_BOUNDS.iter().copied()))
});

pub static DROPPED_OPERATIONS: Lazy<Family<OperationLabels, Histogram>> =
    Lazy::new(|| Family::new_with_constructor(|| Histogram::new(exponential_buckets(1.0, 2.0, 1))));

pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let mut registry = Registry::default();
    registry.register(
        "csi_snapshotter_operation_duration_seconds",
        "Duration of CSI snapshot operations, labeled by driver/operation/status",
        OPERATION_DURATION.clone(),
    );
    registry.register(
        "csi_snapshotter_dropped_operations",
        "Operations dropped because the scheduler's queue was saturated",
        DROPPED_OPERATIONS.clone(),
    );
    registry
});

/// Mark the start of a timed operation. Pair with [`record_metrics`] in the
/// caller's completion path, success or failure alike.
pub fn operation_start() -> Instant {
    Instant::now()
}

/// Record a completed operation's duration under `(driver, operation, status)`.
pub fn record_metrics(start: Instant, driver: &str, operation: &str, status: &str) {
    let labels = OperationLabels {
        driver: driver.to_string(),
        operation: operation.to_string(),
        status: status.to_string(),
    };
    OPERATION_DURATION
        .get_or_create(&labels)
        .observe(start.elapsed().as_secs_f64());
}

/// Record an operation the scheduler declined to start (already running or
/// still in its backoff window); these never get a duration.
pub fn drop_operation(driver: &str, operation: &str) {
    let labels = OperationLabels {
        driver: driver.to_string(),
        operation: operation.to_string(),
        status: "dropped".to_string(),
    };
    DROPPED_OPERATIONS.get_or_create(&labels).observe(1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_without_panicking_and_is_queryable() {
        let start = operation_start();
        record_metrics(start, "hostpath.csi.k8s.io", OPERATION_CREATE_SNAPSHOT, STATUS_SUCCESS);
        let labels = OperationLabels {
            driver: "hostpath.csi.k8s.io".to_string(),
            operation: OPERATION_CREATE_SNAPSHOT.to_string(),
            status: STATUS_SUCCESS.to_string(),
        };
        let count = OPERATION_DURATION.get_or_create(&labels).get_sample_count();
        assert!(count >= 1);
    }

    #[test]
    fn drop_operation_is_recorded_separately() {
        drop_operation("hostpath.csi.k8s.io", OPERATION_CREATE_SNAPSHOT);
        let labels = OperationLabels {
            driver: "hostpath.csi.k8s.io".to_string(),
            operation: OPERATION_CREATE_SNAPSHOT.to_string(),
            status: "dropped".to_string(),
        };
        assert!(DROPPED_OPERATIONS.get_or_create(&labels).get_sample_count() >= 1);
    }
}
