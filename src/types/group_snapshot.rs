//! `VolumeGroupSnapshot` / `VolumeGroupSnapshotContent` — the grouped
//! extension that atomically snapshots a set of volumes (spec §4.13).
//! Structurally these mirror `VolumeSnapshot`/`VolumeSnapshotContent`; the
//! content's source is either a list of volume handles (dynamic) or a
//! `{groupHandle, snapshotHandles[]}` tuple (pre-provisioned).

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::volume_snapshot::SnapshotError;
use super::volume_snapshot_content::{DeletionPolicy, VolumeSnapshotRef};

pub const GROUP_CONTENT_PROTECTION_FINALIZER: &str =
    "snapshot.storage.kubernetes.io/volumegroupsnapshotcontent-bound-protection";
pub const ANN_GROUP_SNAPSHOT_BEING_CREATED: &str =
    "snapshot.storage.kubernetes.io/volumegroupsnapshot-being-created";
pub const ANN_GROUP_SNAPSHOT_BEING_DELETED: &str =
    "snapshot.storage.kubernetes.io/volumegroupsnapshot-being-deleted";

/// Persistence contract used by the v1beta1<->v1beta2 conversion webhook
/// (spec §4.14) to carry the richer `v1beta2` info list through a `v1beta1`
/// round trip.
pub const ANN_VOLUME_SNAPSHOT_INFO_LIST: &str =
    "groupsnapshot.storage.kubernetes.io/volume-snapshot-info-list";

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    group = "groupsnapshot.storage.k8s.io",
    version = "v1beta2",
    kind = "VolumeGroupSnapshot",
    namespaced,
    status = "VolumeGroupSnapshotStatus",
    shortname = "vgs"
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeGroupSnapshotSpec {
    pub source: VolumeGroupSnapshotSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_group_snapshot_class_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeGroupSnapshotSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<std::collections::BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_group_snapshot_content_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeGroupSnapshotStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bound_volume_group_snapshot_content_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<Time>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SnapshotError>,
}

#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    group = "groupsnapshot.storage.k8s.io",
    version = "v1beta2",
    kind = "VolumeGroupSnapshotContent",
    status = "VolumeGroupSnapshotContentStatus",
    shortname = "vgsc"
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeGroupSnapshotContentSpec {
    pub volume_group_snapshot_ref: VolumeSnapshotRef,
    pub source: VolumeGroupSnapshotContentSource,
    pub driver: String,
    pub deletion_policy: DeletionPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_group_snapshot_class_name: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeGroupSnapshotContentSource {
    /// Dynamic provisioning: one handle per member volume.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_handles: Vec<String>,
    /// Pre-provisioned: the backend's group handle plus its member
    /// snapshot handles.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_group_snapshot_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_snapshot_handles: Vec<String>,
}

impl VolumeGroupSnapshotContentSource {
    pub fn is_dynamic(&self) -> bool {
        !self.volume_handles.is_empty()
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeGroupSnapshotContentStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_group_snapshot_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<SnapshotError>,
    /// `v1beta2` per-member entries. In `v1beta1` this is carried instead
    /// as `volumeSnapshotHandlePairList` (see `crate::webhook::conversion`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_snapshot_info_list: Vec<VolumeSnapshotInfo>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotInfo {
    pub volume_handle: String,
    pub snapshot_handle: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ready_to_use: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore_size: Option<i64>,
}

/// `v1beta1`'s flatter shape for the same list (no timestamps/readiness/size).
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotHandlePair {
    pub volume_handle: String,
    pub snapshot_handle: String,
}

impl From<&VolumeSnapshotInfo> for VolumeSnapshotHandlePair {
    fn from(info: &VolumeSnapshotInfo) -> Self {
        VolumeSnapshotHandlePair {
            volume_handle: info.volume_handle.clone(),
            snapshot_handle: info.snapshot_handle.clone(),
        }
    }
}
