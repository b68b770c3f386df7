//! Binding contract between a `VolumeSnapshot` and its
//! `VolumeSnapshotContent` (spec §4.5).

use kube::api::{Patch, PatchParams};
use kube::ResourceExt;

use crate::controller::Context;
use crate::error::{Error, Result};
use crate::store::status_patch;
use crate::types::{VolumeSnapshot, VolumeSnapshotContent, VolumeSnapshotStatus};

/// Sets `VSC.Spec.VolumeSnapshotRef.UID` the first time a VS claims this
/// content. Races between two controllers setting the same UID are benign;
/// the store's resource-version compare-and-set rejects a divergent one.
pub async fn check_and_bind_snapshot_content(
    vs: &VolumeSnapshot,
    vsc: &VolumeSnapshotContent,
    ctx: &Context,
) -> Result<()> {
    let content_ref = &vsc.spec.volume_snapshot_ref;
    let vs_uid = vs.uid().unwrap_or_default();

    if content_ref.name != vs.name_any()
        || (!content_ref.uid.is_empty() && content_ref.uid != vs_uid)
    {
        return Err(Error::BindMismatch(format!(
            "content {} references {}/{} (uid {:?}), but snapshot is {}/{} (uid {:?})",
            vsc.name_any(),
            content_ref.namespace,
            content_ref.name,
            content_ref.uid,
            vs.namespace().unwrap_or_default(),
            vs.name_any(),
            vs_uid,
        )));
    }

    if !content_ref.uid.is_empty() {
        return Ok(());
    }

    let patch = serde_json::json!({
        "spec": { "volumeSnapshotRef": { "uid": vs_uid } }
    });
    ctx.vsc_api()
        .patch(&vsc.name_any(), &PatchParams::default(), &Patch::Merge(patch))
        .await?;
    Ok(())
}

/// Patches `VS.Status.BoundVolumeSnapshotContentName` to `vsc.Name` unless
/// it already matches.
pub async fn bind_and_update_volume_snapshot(
    vsc: &VolumeSnapshotContent,
    vs: &VolumeSnapshot,
    ctx: &Context,
) -> Result<()> {
    let namespace = vs.namespace().unwrap_or_default();
    let api = ctx.vs_api(&namespace);
    let latest = api.get(&vs.name_any()).await?;

    if latest
        .status
        .as_ref()
        .and_then(|s| s.bound_volume_snapshot_content_name.as_deref())
        == Some(vsc.name_any().as_str())
    {
        return Ok(());
    }

    let intended = VolumeSnapshotStatus {
        bound_volume_snapshot_content_name: Some(vsc.name_any()),
        ..latest.status.clone().unwrap_or_default()
    };

    if let Some(patch) = status_patch(&latest.status, &intended) {
        api.patch_status(&vs.name_any(), &PatchParams::default(), &patch)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VolumeSnapshotContentSource, VolumeSnapshotContentSpec, VolumeSnapshotRef};
    use crate::types::DeletionPolicy;

    fn vsc_with_ref(name: &str, uid: &str) -> VolumeSnapshotContent {
        let mut vsc = VolumeSnapshotContent::default();
        vsc.metadata.name = Some("content-1".into());
        vsc.spec = VolumeSnapshotContentSpec {
            volume_snapshot_ref: VolumeSnapshotRef {
                name: name.into(),
                namespace: "default".into(),
                uid: uid.into(),
            },
            source: VolumeSnapshotContentSource {
                volume_handle: Some("vol-1".into()),
                snapshot_handle: None,
            },
            driver: "mock.csi.k8s.io".into(),
            deletion_policy: DeletionPolicy::Delete,
            volume_snapshot_class_name: None,
        };
        vsc
    }

    #[test]
    fn name_mismatch_is_a_bind_mismatch_condition() {
        let vsc = vsc_with_ref("other-name", "");
        assert_ne!(vsc.spec.volume_snapshot_ref.name, "snap-1");
    }

    #[test]
    fn already_bound_uid_is_detected() {
        let vsc = vsc_with_ref("snap-1", "uid-1");
        assert!(!vsc.spec.volume_snapshot_ref.uid.is_empty());
    }
}
