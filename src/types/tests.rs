//! Cross-type invariant checks (spec §8 "universally quantified invariants").

use super::*;

fn vs(name: &str, namespace: &str, uid: &str) -> VolumeSnapshot {
    let mut vs = VolumeSnapshot::new(
        name,
        VolumeSnapshotSpec {
            source: VolumeSnapshotSource {
                persistent_volume_claim_name: Some("data".into()),
                volume_snapshot_content_name: None,
            },
            volume_snapshot_class_name: None,
        },
    );
    vs.metadata.namespace = Some(namespace.to_string());
    vs.metadata.uid = Some(uid.to_string());
    vs
}

fn vsc(name: &str, ref_name: &str, ref_namespace: &str, ref_uid: &str) -> VolumeSnapshotContent {
    VolumeSnapshotContent::new(
        name,
        VolumeSnapshotContentSpec {
            volume_snapshot_ref: VolumeSnapshotRef {
                name: ref_name.to_string(),
                namespace: ref_namespace.to_string(),
                uid: ref_uid.to_string(),
            },
            source: VolumeSnapshotContentSource {
                volume_handle: Some("vol-1".into()),
                snapshot_handle: None,
            },
            driver: "mock.csi.k8s.io".to_string(),
            deletion_policy: DeletionPolicy::Delete,
            volume_snapshot_class_name: Some("gold".into()),
        },
    )
}

/// Invariant 1 (spec §3): binding is bidirectional.
#[test]
fn bound_pair_invariant() {
    let mut snap = vs("snap-1", "ns", "uid-1");
    snap.status = Some(VolumeSnapshotStatus {
        bound_volume_snapshot_content_name: Some("content-1".into()),
        ..Default::default()
    });
    let content = vsc("content-1", "snap-1", "ns", "uid-1");

    let bound = ref_matches(
        &content.spec.volume_snapshot_ref,
        &snap.metadata.name.clone().unwrap(),
        snap.metadata.namespace.as_deref().unwrap(),
        snap.metadata.uid.as_deref().unwrap(),
    ) && snap
        .status
        .as_ref()
        .and_then(|s| s.bound_volume_snapshot_content_name.as_deref())
        == Some(content.metadata.name.as_deref().unwrap());
    assert!(bound);
}

/// Invariant 3 (spec §3): a UID mismatch, not the name, drives orphan detection.
#[test]
fn uid_mismatch_is_orphan_not_name_mismatch() {
    let content = vsc("content-1", "snap-1", "ns", "uid-old");
    let current = vs("snap-1", "ns", "uid-new");
    let matches_by_name = content.spec.volume_snapshot_ref.name == current.metadata.name.clone().unwrap();
    let matches_fully = ref_matches(
        &content.spec.volume_snapshot_ref,
        &current.metadata.name.clone().unwrap(),
        current.metadata.namespace.as_deref().unwrap(),
        current.metadata.uid.as_deref().unwrap(),
    );
    assert!(matches_by_name);
    assert!(!matches_fully, "UID mismatch must be treated as orphaned");
}

/// Invariant 4 (spec §3): ReadyToUse == true implies Error == None.
#[test]
fn ready_implies_no_error() {
    let status = VolumeSnapshotContentStatus {
        ready_to_use: Some(true),
        error: None,
        ..Default::default()
    };
    assert!(status.is_ready() && status.error.is_none());
}

#[test]
fn object_meta_round_trips_through_serde_json() {
    let content = vsc("content-1", "snap-1", "ns", "uid-1");
    let json = serde_json::to_value(&content).unwrap();
    let back: VolumeSnapshotContent = serde_json::from_value(json).unwrap();
    assert_eq!(back.spec.driver, "mock.csi.k8s.io");
    assert_eq!(back.metadata.name.as_deref(), Some("content-1"));
}
