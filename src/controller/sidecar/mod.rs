//! Sidecar controller: drives the CSI backend for a single driver (spec
//! §4.9-§4.11). Watches every `VolumeSnapshotContent` cluster-wide but acts
//! only on the ones whose `Spec.Driver` matches this process's configured
//! driver; everything else is a silent no-op requeue-never.

mod create;
mod delete;
mod status;

use std::sync::Arc;

use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::{Event, EventType};
use kube::ResourceExt;

use crate::controller::common::remove_finalizer;
use crate::controller::{
    accept_version, dispatch_poll_requeue, fast_poll_requeue, status_poll_requeue,
    steady_state_requeue, Context,
};
use crate::error::Result;
use crate::store::{annotation_patch, object_key};
use crate::types::{
    VolumeSnapshotContent, ANN_VOLUME_SNAPSHOT_BEING_CREATED, ANN_VOLUME_SNAPSHOT_BEING_DELETED,
    CONTENT_PROTECTION_FINALIZER,
};

pub async fn reconcile_content(vsc: Arc<VolumeSnapshotContent>, ctx: Arc<Context>) -> Result<Action> {
    if vsc.spec.driver != ctx.config.driver_name {
        return Ok(Action::await_change());
    }

    let key = object_key(None, &vsc.name_any());
    if !accept_version(&ctx, &key, vsc.as_ref())? {
        return Ok(Action::await_change());
    }

    let vsc_api = ctx.vsc_api();

    if should_delete(&vsc) {
        if vsc.spec.deletion_policy == crate::types::DeletionPolicy::Delete
            && vsc.status.as_ref().and_then(|s| s.snapshot_handle.as_ref()).is_some()
        {
            delete::delete_operation(&vsc, &ctx).await?;
            return Ok(fast_poll_requeue(&ctx));
        }
        remove_finalizer(&vsc_api, &vsc, CONTENT_PROTECTION_FINALIZER).await?;
        return Ok(Action::await_change());
    }

    let is_group_member = vsc
        .metadata
        .annotations
        .as_ref()
        .map(|a| a.contains_key(crate::types::ANN_GROUP_SNAPSHOT_BEING_CREATED))
        .unwrap_or(false);

    if vsc.spec.source.is_dynamic() && vsc.status.is_none() && !is_group_member {
        create::create_snapshot(&vsc, &ctx).await?;
        return Ok(dispatch_poll_requeue(&ctx));
    }

    if content_is_ready(&vsc) {
        if vsc
            .metadata
            .annotations
            .as_ref()
            .map(|a| a.contains_key(ANN_VOLUME_SNAPSHOT_BEING_CREATED))
            .unwrap_or(false)
        {
            vsc_api
                .patch(
                    &vsc.name_any(),
                    &PatchParams::default(),
                    &annotation_patch(ANN_VOLUME_SNAPSHOT_BEING_CREATED, None),
                )
                .await?;
        }
        return Ok(steady_state_requeue(&ctx));
    }

    status::check_and_update_content_status(&vsc, &ctx).await?;
    Ok(status_poll_requeue(&ctx))
}

/// Spec §4.9 `shouldDelete`.
fn should_delete(vsc: &VolumeSnapshotContent) -> bool {
    if vsc.meta().deletion_timestamp.is_none() {
        return false;
    }
    let unbound_pre_provisioned =
        vsc.spec.source.is_pre_provisioned() && vsc.spec.volume_snapshot_ref.uid.is_empty();
    if unbound_pre_provisioned {
        return true;
    }
    let annotations = vsc.metadata.annotations.as_ref();
    if annotations.map(|a| a.contains_key(ANN_VOLUME_SNAPSHOT_BEING_CREATED)).unwrap_or(false) {
        return false;
    }
    annotations.map(|a| a.contains_key(ANN_VOLUME_SNAPSHOT_BEING_DELETED)).unwrap_or(false)
}

fn content_is_ready(vsc: &VolumeSnapshotContent) -> bool {
    vsc.status.as_ref().map(|s| s.is_ready()).unwrap_or(false)
}

pub(crate) async fn emit_warning(ctx: &Context, vsc: &VolumeSnapshotContent, reason: &str, message: &str) {
    ctx.recorder_for(vsc)
        .publish(Event {
            type_: EventType::Warning,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: "Syncing".into(),
            secondary: None,
        })
        .await
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VolumeSnapshotContentSource, VolumeSnapshotContentSpec, VolumeSnapshotRef};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    fn base_content() -> VolumeSnapshotContent {
        let mut vsc = VolumeSnapshotContent::default();
        vsc.metadata.name = Some("content-1".into());
        vsc.spec = VolumeSnapshotContentSpec {
            volume_snapshot_ref: VolumeSnapshotRef {
                name: "snap-1".into(),
                namespace: "default".into(),
                uid: "uid-1".into(),
            },
            source: VolumeSnapshotContentSource {
                volume_handle: Some("vol-1".into()),
                snapshot_handle: None,
            },
            driver: "mock.csi.k8s.io".into(),
            deletion_policy: crate::types::DeletionPolicy::Delete,
            volume_snapshot_class_name: Some("gold".into()),
        };
        vsc
    }

    #[test]
    fn not_deleting_never_should_delete() {
        let vsc = base_content();
        assert!(!should_delete(&vsc));
    }

    #[test]
    fn unbound_preprovisioned_deleting_should_delete() {
        let mut vsc = base_content();
        vsc.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        vsc.spec.source = VolumeSnapshotContentSource {
            volume_handle: None,
            snapshot_handle: Some("sid-1".into()),
        };
        vsc.spec.volume_snapshot_ref.uid.clear();
        assert!(should_delete(&vsc));
    }

    #[test]
    fn being_created_blocks_delete() {
        let mut vsc = base_content();
        vsc.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        let mut annotations = std::collections::BTreeMap::new();
        annotations.insert(ANN_VOLUME_SNAPSHOT_BEING_CREATED.to_string(), "yes".into());
        annotations.insert(ANN_VOLUME_SNAPSHOT_BEING_DELETED.to_string(), "yes".into());
        vsc.metadata.annotations = Some(annotations);
        assert!(!should_delete(&vsc));
    }

    #[test]
    fn being_deleted_sentinel_triggers_delete() {
        let mut vsc = base_content();
        vsc.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
        let mut annotations = std::collections::BTreeMap::new();
        annotations.insert(ANN_VOLUME_SNAPSHOT_BEING_DELETED.to_string(), "yes".into());
        vsc.metadata.annotations = Some(annotations);
        assert!(should_delete(&vsc));
    }
}
