//! `VolumeSnapshotContent` — cluster-scoped object representing the actual
//! snapshot artifact on the storage backend.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::volume_snapshot::SnapshotError;

pub const CONTENT_PROTECTION_FINALIZER: &str =
    "snapshot.storage.kubernetes.io/volumesnapshotcontent-bound-protection";

/// Pinned at create time so the delete path never needs to resolve the
/// class again.
pub const ANN_DELETION_SECRET_NAME: &str =
    "snapshot.storage.kubernetes.io/deletion-secret-name";
pub const ANN_DELETION_SECRET_NAMESPACE: &str =
    "snapshot.storage.kubernetes.io/deletion-secret-namespace";

/// Set before each `CreateSnapshot` RPC, removed on terminal success/failure.
/// While present, the content must not be deleted (sentinel crash-safe lock).
pub const ANN_VOLUME_SNAPSHOT_BEING_CREATED: &str =
    "snapshot.storage.kubernetes.io/volumesnapshot-being-created";
/// Set by the common controller to request sidecar deletion.
pub const ANN_VOLUME_SNAPSHOT_BEING_DELETED: &str =
    "snapshot.storage.kubernetes.io/volumesnapshot-being-deleted";

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    group = "snapshot.storage.k8s.io",
    version = "v1",
    kind = "VolumeSnapshotContent",
    status = "VolumeSnapshotContentStatus",
    shortname = "vsc",
    printcolumn = r#"{"name":"ReadyToUse","type":"boolean","jsonPath":".status.readyToUse"}"#,
    printcolumn = r#"{"name":"RestoreSize","type":"integer","jsonPath":".status.restoreSize"}"#,
    printcolumn = r#"{"name":"DeletionPolicy","type":"string","jsonPath":".spec.deletionPolicy"}"#,
    printcolumn = r#"{"name":"Driver","type":"string","jsonPath":".spec.driver"}"#,
    printcolumn = r#"{"name":"VolumeSnapshotClass","type":"string","jsonPath":".spec.volumeSnapshotClassName"}"#,
    printcolumn = r#"{"name":"VolumeSnapshot","type":"string","jsonPath":".spec.volumeSnapshotRef.name"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotContentSpec {
    pub volume_snapshot_ref: VolumeSnapshotRef,
    pub source: VolumeSnapshotContentSource,
    pub driver: String,
    pub deletion_policy: DeletionPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_snapshot_class_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotRef {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    /// Empty means "pre-provisioned but unbound".
    #[serde(default)]
    pub uid: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotContentSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_handle: Option<String>,
}

impl VolumeSnapshotContentSource {
    pub fn is_dynamic(&self) -> bool {
        self.volume_handle.is_some()
    }

    pub fn is_pre_provisioned(&self) -> bool {
        self.snapshot_handle.is_some()
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum DeletionPolicy {
    Delete,
    Retain,
}

impl Default for DeletionPolicy {
    fn default() -> Self {
        DeletionPolicy::Delete
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotContentStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SnapshotError>,
    /// Only populated when the backend reports a non-empty group handle
    /// (see spec §9, open question (c)).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_group_snapshot_handle: Option<String>,
}

impl VolumeSnapshotContentStatus {
    pub fn is_ready(&self) -> bool {
        self.ready_to_use == Some(true)
    }
}

/// Returns `Some(true/false)` when the VSC's ref matches the given VS
/// identity, or `None` when the ref is empty (see spec §4.3 step 3/4).
pub fn ref_matches(content_ref: &VolumeSnapshotRef, name: &str, namespace: &str, uid: &str) -> bool {
    content_ref.name == name && content_ref.namespace == namespace && content_ref.uid == uid
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_kind_detection() {
        let dynamic = VolumeSnapshotContentSource {
            volume_handle: Some("vol-1".into()),
            snapshot_handle: None,
        };
        assert!(dynamic.is_dynamic());
        assert!(!dynamic.is_pre_provisioned());
    }

    #[test]
    fn ready_requires_flag() {
        let mut status = VolumeSnapshotContentStatus::default();
        assert!(!status.is_ready());
        status.ready_to_use = Some(true);
        assert!(status.is_ready());
    }
}
