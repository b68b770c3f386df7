//! Custom Resource Definitions for the CSI snapshotter control plane.

mod group_snapshot;
mod volume_snapshot;
mod volume_snapshot_class;
mod volume_snapshot_content;

#[cfg(test)]
mod tests;

pub use group_snapshot::{
    VolumeGroupSnapshot, VolumeGroupSnapshotContent, VolumeGroupSnapshotContentSource,
    VolumeGroupSnapshotContentSpec, VolumeGroupSnapshotContentStatus, VolumeGroupSnapshotSource,
    VolumeGroupSnapshotSpec, VolumeGroupSnapshotStatus, VolumeSnapshotHandlePair,
    VolumeSnapshotInfo, ANN_GROUP_SNAPSHOT_BEING_CREATED, ANN_GROUP_SNAPSHOT_BEING_DELETED,
    ANN_VOLUME_SNAPSHOT_INFO_LIST, GROUP_CONTENT_PROTECTION_FINALIZER,
};
pub use volume_snapshot::{
    SnapshotError, VolumeSnapshot, VolumeSnapshotSource, VolumeSnapshotSpec, VolumeSnapshotStatus,
    PVC_AS_SOURCE_PROTECTION_FINALIZER, VOLUME_SNAPSHOT_BOUND_FINALIZER,
    VOLUME_SNAPSHOT_PROTECTION_FINALIZER,
};
pub use volume_snapshot_class::{VolumeSnapshotClass, ANN_IS_DEFAULT_CLASS};
pub use volume_snapshot_content::{
    ref_matches, DeletionPolicy, VolumeSnapshotContent, VolumeSnapshotContentSource,
    VolumeSnapshotContentSpec, VolumeSnapshotContentStatus, VolumeSnapshotRef,
    ANN_DELETION_SECRET_NAME, ANN_DELETION_SECRET_NAMESPACE, ANN_VOLUME_SNAPSHOT_BEING_CREATED,
    ANN_VOLUME_SNAPSHOT_BEING_DELETED, CONTENT_PROTECTION_FINALIZER,
};
