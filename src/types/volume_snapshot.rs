//! `VolumeSnapshot` — namespaced, user-facing request for a point-in-time
//! snapshot of a PersistentVolumeClaim.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Protection finalizer kept on a VolumeSnapshot that is still referenced
/// by an in-progress PVC restore or is otherwise alive and bound.
pub const VOLUME_SNAPSHOT_PROTECTION_FINALIZER: &str =
    "snapshot.storage.kubernetes.io/volumesnapshot-as-source-protection";
/// Finalizer on a VolumeSnapshot whose bound content must outlive it until
/// the backend snapshot is actually deleted.
pub const VOLUME_SNAPSHOT_BOUND_FINALIZER: &str =
    "snapshot.storage.kubernetes.io/volumesnapshot-bound-protection";
/// Finalizer placed on the source PVC while a dynamic snapshot of it is
/// mid-creation (spec §4.4 step 3).
pub const PVC_AS_SOURCE_PROTECTION_FINALIZER: &str =
    "snapshot.storage.kubernetes.io/pvc-as-source-protection";

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    group = "snapshot.storage.k8s.io",
    version = "v1",
    kind = "VolumeSnapshot",
    namespaced,
    status = "VolumeSnapshotStatus",
    shortname = "vs",
    printcolumn = r#"{"name":"ReadyToUse","type":"boolean","jsonPath":".status.readyToUse"}"#,
    printcolumn = r#"{"name":"SourcePVC","type":"string","jsonPath":".spec.source.persistentVolumeClaimName"}"#,
    printcolumn = r#"{"name":"RestoreSize","type":"string","jsonPath":".status.restoreSize"}"#,
    printcolumn = r#"{"name":"SnapshotClass","type":"string","jsonPath":".spec.volumeSnapshotClassName"}"#,
    printcolumn = r#"{"name":"SnapshotContent","type":"string","jsonPath":".status.boundVolumeSnapshotContentName"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSpec {
    pub source: VolumeSnapshotSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_class_name: Option<String>,
}

/// Exactly one of these two fields is non-empty, enforced by admission and
/// never mutated after creation.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_content_name: Option<String>,
}

impl VolumeSnapshotSource {
    pub fn validate(&self) -> Result<(), String> {
        match (
            &self.persistent_volume_claim_name,
            &self.volume_snapshot_content_name,
        ) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (Some(_), Some(_)) => Err(
                "exactly one of source.persistentVolumeClaimName or \
                 source.volumeSnapshotContentName may be set, not both"
                    .to_string(),
            ),
            (None, None) => Err(
                "exactly one of source.persistentVolumeClaimName or \
                 source.volumeSnapshotContentName must be set"
                    .to_string(),
            ),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.persistent_volume_claim_name.is_some()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_volume_snapshot_content_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<Time>,
    /// Tri-state: absent means "unknown", Some(false)/Some(true) otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SnapshotError>,
}

/// Structured, user-visible terminal error recorded on an object's status.
///
/// `kind` mirrors `Error::metric_label()` so a later sync can tell a
/// retryable `ControllerUpdateFailed` apart from a permanent failure
/// (spec §4.4.2, §7) without needing the original `Error` value in memory.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<Time>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl SnapshotError {
    pub fn is_controller_update_failed(&self) -> bool {
        self.kind.as_deref() == Some("controller_update_failed")
    }
}

impl VolumeSnapshotStatus {
    pub fn is_ready(&self) -> bool {
        self.ready_to_use == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_requires_exactly_one_field() {
        assert!(VolumeSnapshotSource::default().validate().is_err());
        let both = VolumeSnapshotSource {
            persistent_volume_claim_name: Some("a".into()),
            volume_snapshot_content_name: Some("b".into()),
        };
        assert!(both.validate().is_err());
        let one = VolumeSnapshotSource {
            persistent_volume_claim_name: Some("a".into()),
            volume_snapshot_content_name: None,
        };
        assert!(one.validate().is_ok());
        assert!(one.is_dynamic());
    }

    #[test]
    fn ready_true_requires_flag_set() {
        let mut status = VolumeSnapshotStatus::default();
        assert!(!status.is_ready());
        status.ready_to_use = Some(true);
        assert!(status.is_ready());
    }
}
