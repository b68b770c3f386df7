//! Group-snapshot sidecar controller (spec §4.13): structurally identical
//! to `crate::controller::sidecar` but driving `VolumeGroupSnapshotContent`
//! and the handler's `*_group_snapshot` trio.

mod create;
mod delete;
mod status;

use std::sync::Arc;

use kube::api::PatchParams;
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
    VolumeGroupSnapshotContent, ANN_GROUP_SNAPSHOT_BEING_CREATED, ANN_GROUP_SNAPSHOT_BEING_DELETED,
    GROUP_CONTENT_PROTECTION_FINALIZER,
};

pub async fn reconcile_group_content(
    vgsc: Arc<VolumeGroupSnapshotContent>,
    ctx: Arc<Context>,
) -> Result<Action> {
    if vgsc.spec.driver != ctx.config.driver_name {
        return Ok(Action::await_change());
    }

    let key = object_key(None, &vgsc.name_any());
    if !accept_version(&ctx, &key, vgsc.as_ref())? {
        return Ok(Action::await_change());
    }

    let api = kube::Api::<VolumeGroupSnapshotContent>::all(ctx.client.clone());

    if should_delete(&vgsc) {
        if vgsc.spec.deletion_policy == crate::types::DeletionPolicy::Delete
            && vgsc.status.as_ref().and_then(|s| s.volume_group_snapshot_handle.as_ref()).is_some()
        {
            delete::delete_group_operation(&vgsc, &ctx).await?;
            return Ok(fast_poll_requeue(&ctx));
        }
        remove_finalizer(&api, &vgsc, GROUP_CONTENT_PROTECTION_FINALIZER).await?;
        return Ok(Action::await_change());
    }

    if vgsc.spec.source.is_dynamic() && vgsc.status.is_none() {
        create::create_group_snapshot(&vgsc, &ctx).await?;
        return Ok(dispatch_poll_requeue(&ctx));
    }

    if content_is_ready(&vgsc) {
        if vgsc
            .metadata
            .annotations
            .as_ref()
            .map(|a| a.contains_key(ANN_GROUP_SNAPSHOT_BEING_CREATED))
            .unwrap_or(false)
        {
            api.patch(
                &vgsc.name_any(),
                &PatchParams::default(),
                &annotation_patch(ANN_GROUP_SNAPSHOT_BEING_CREATED, None),
            )
            .await?;
        }
        return Ok(steady_state_requeue(&ctx));
    }

    status::check_and_update_group_status(&vgsc, &ctx).await?;
    Ok(status_poll_requeue(&ctx))
}

fn should_delete(vgsc: &VolumeGroupSnapshotContent) -> bool {
    if vgsc.meta().deletion_timestamp.is_none() {
        return false;
    }
    let unbound_pre_provisioned =
        !vgsc.spec.source.is_dynamic() && vgsc.spec.volume_group_snapshot_ref.uid.is_empty();
    if unbound_pre_provisioned {
        return true;
    }
    let annotations = vgsc.metadata.annotations.as_ref();
    if annotations.map(|a| a.contains_key(ANN_GROUP_SNAPSHOT_BEING_CREATED)).unwrap_or(false) {
        return false;
    }
    annotations.map(|a| a.contains_key(ANN_GROUP_SNAPSHOT_BEING_DELETED)).unwrap_or(false)
}

fn content_is_ready(vgsc: &VolumeGroupSnapshotContent) -> bool {
    vgsc.status.as_ref().map(|s| s.ready_to_use == Some(true)).unwrap_or(false)
}

/// Deterministic per-member snapshot name (spec §4.13): globally unique yet
/// reproducible given identical inputs at the same instant. `volume_handle`
/// stands in for the per-volume UID named in the spec — a dynamic group
/// source only carries volume handles, not PV UIDs.
pub(crate) fn derive_member_snapshot_name(group_uid: &str, volume_handle: &str, timestamp: i64) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(group_uid.as_bytes());
    hasher.update(volume_handle.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("snapshot-{digest}-{timestamp}")
}

pub(crate) async fn emit_warning(
    ctx: &Context,
    vgsc: &VolumeGroupSnapshotContent,
    reason: &str,
    message: &str,
) {
    ctx.recorder_for(vgsc)
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

    #[test]
    fn member_name_is_deterministic() {
        let a = derive_member_snapshot_name("group-1", "vol-1", 1000);
        let b = derive_member_snapshot_name("group-1", "vol-1", 1000);
        assert_eq!(a, b);
    }

    #[test]
    fn member_name_varies_by_volume() {
        let a = derive_member_snapshot_name("group-1", "vol-1", 1000);
        let b = derive_member_snapshot_name("group-1", "vol-2", 1000);
        assert_ne!(a, b);
    }
}
