//! Common controller `syncSnapshot` (spec §4.4).

use std::sync::Arc;

use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::api::ListParams;
use kube::runtime::controller::Action;
use kube::runtime::events::{Event, EventType};
use kube::{Api, ResourceExt};

use crate::controller::common::{bind, create, ensure_finalizer, remove_finalizer};
use crate::controller::{
    accept_version, dispatch_poll_requeue, fast_poll_requeue, status_poll_requeue,
    steady_state_requeue, Context,
};
use crate::error::Result;
use crate::store::object_key;
use crate::types::{
    VolumeSnapshot, VolumeSnapshotContent, PVC_AS_SOURCE_PROTECTION_FINALIZER,
    VOLUME_SNAPSHOT_PROTECTION_FINALIZER,
};

pub async fn reconcile_snapshot(vs: Arc<VolumeSnapshot>, ctx: Arc<Context>) -> Result<Action> {
    let namespace = vs.namespace().unwrap_or_default();
    let vs_api = ctx.vs_api(&namespace);

    let key = object_key(Some(&namespace), &vs.name_any());
    if !accept_version(&ctx, &key, vs.as_ref())? {
        return Ok(Action::await_change());
    }

    if vs.meta().deletion_timestamp.is_some() {
        if !restore_in_progress(&vs, &ctx).await? {
            remove_finalizer(&vs_api, &vs, VOLUME_SNAPSHOT_PROTECTION_FINALIZER).await?;
        }
        return Ok(Action::await_change());
    }

    ensure_finalizer(&vs_api, &vs, VOLUME_SNAPSHOT_PROTECTION_FINALIZER).await?;

    sync_pvc_source_protection(&vs, &ctx).await?;

    if !vs.status.as_ref().map(|s| s.is_ready()).unwrap_or(false) {
        sync_unready_snapshot(&vs, &ctx).await
    } else {
        sync_ready_snapshot(&vs, &ctx).await
    }
}

/// Spec §4.4 step 1: a PVC whose `Spec.DataSource` names this VS and is
/// still `Pending` means a restore is in progress.
async fn restore_in_progress(vs: &VolumeSnapshot, ctx: &Context) -> Result<bool> {
    let namespace = vs.namespace().unwrap_or_default();
    let api: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), &namespace);
    let pvcs = api.list(&ListParams::default()).await?;
    Ok(pvcs.items.iter().any(|pvc| {
        let matches_source = pvc
            .spec
            .as_ref()
            .and_then(|s| s.data_source.as_ref())
            .map(|ds| ds.kind == "VolumeSnapshot" && ds.name == vs.name_any())
            .unwrap_or(false);
        let pending = pvc.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Pending");
        matches_source && pending
    }))
}

/// Spec §4.4 step 3: the PVC finalizer tracks whether *any* VS in the
/// namespace is still mid-creation against that source PVC.
async fn sync_pvc_source_protection(vs: &VolumeSnapshot, ctx: &Context) -> Result<()> {
    let Some(pvc_name) = vs.spec.source.persistent_volume_claim_name.clone() else {
        return Ok(());
    };
    let namespace = vs.namespace().unwrap_or_default();
    let pvc_api: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), &namespace);
    let Some(pvc) = pvc_api.get_opt(&pvc_name).await? else {
        return Ok(());
    };

    let mid_creation = !vs.status.as_ref().map(|s| s.is_ready()).unwrap_or(false);
    if mid_creation {
        ensure_finalizer(&pvc_api, &pvc, PVC_AS_SOURCE_PROTECTION_FINALIZER).await?;
        return Ok(());
    }

    let vs_api = Api::namespaced(ctx.client.clone(), &namespace);
    let siblings: kube::core::ObjectList<VolumeSnapshot> =
        vs_api.list(&ListParams::default()).await?;
    let still_snapshotting = siblings.items.iter().any(|sibling| {
        sibling.spec.source.persistent_volume_claim_name.as_deref() == Some(pvc_name.as_str())
            && !sibling.status.as_ref().map(|s| s.is_ready()).unwrap_or(false)
    });

    if !still_snapshotting {
        remove_finalizer(&pvc_api, &pvc, PVC_AS_SOURCE_PROTECTION_FINALIZER).await?;
    }
    Ok(())
}

/// Spec §4.4.1: validate the bound content is still consistent.
async fn sync_ready_snapshot(vs: &VolumeSnapshot, ctx: &Context) -> Result<Action> {
    let Some(content_name) = vs
        .status
        .as_ref()
        .and_then(|s| s.bound_volume_snapshot_content_name.clone())
    else {
        return flip_to_unready(vs, ctx, "SnapshotLost", "bound content name is missing").await;
    };

    let vsc = match ctx.vsc_api().get_opt(&content_name).await? {
        Some(vsc) => vsc,
        None => {
            return flip_to_unready(
                vs,
                ctx,
                "SnapshotContentMissing",
                &format!("VolumeSnapshotContent {content_name} not found"),
            )
            .await;
        }
    };

    let content_ref = &vsc.spec.volume_snapshot_ref;
    if content_ref.name != vs.name_any() || content_ref.uid != vs.uid().unwrap_or_default() {
        return flip_to_unready(
            vs,
            ctx,
            "SnapshotMisbound",
            &format!("content {content_name} no longer references this snapshot"),
        )
        .await;
    }

    Ok(steady_state_requeue(ctx))
}

async fn flip_to_unready(vs: &VolumeSnapshot, ctx: &Context, reason: &str, message: &str) -> Result<Action> {
    use crate::store::status_patch;
    use crate::types::{SnapshotError, VolumeSnapshotStatus};
    use kube::api::PatchParams;

    ctx.recorder_for(vs)
        .publish(Event {
            type_: EventType::Warning,
            reason: reason.to_string(),
            note: Some(message.to_string()),
            action: "Syncing".into(),
            secondary: None,
        })
        .await
        .ok();

    let intended = VolumeSnapshotStatus {
        ready_to_use: Some(false),
        error: Some(SnapshotError {
            time: None,
            message: Some(message.to_string()),
        }),
        ..vs.status.clone().unwrap_or_default()
    };
    if let Some(patch) = status_patch(&vs.status, &intended) {
        ctx.vs_api(&vs.namespace().unwrap_or_default())
            .patch_status(&vs.name_any(), &PatchParams::default(), &patch)
            .await?;
    }
    Ok(status_poll_requeue(ctx))
}

/// Spec §4.4.2.
async fn sync_unready_snapshot(vs: &VolumeSnapshot, ctx: &Context) -> Result<Action> {
    if let Some(content_name) = vs.spec.source.volume_snapshot_content_name.clone() {
        let vsc = match ctx.vsc_api().get_opt(&content_name).await? {
            Some(vsc) => vsc,
            None => {
                return flip_to_unready(
                    vs,
                    ctx,
                    "SnapshotContentMissing",
                    &format!("VolumeSnapshotContent {content_name} not found"),
                )
                .await;
            }
        };
        bind::check_and_bind_snapshot_content(vs, &vsc, ctx).await?;
        super::status::check_and_update_bound_snapshot_status_operation(vs, &vsc, ctx).await?;
        return Ok(status_poll_requeue(ctx));
    }

    if let Some(vsc) = find_matching_content(vs, ctx).await? {
        bind::bind_and_update_volume_snapshot(&vsc, vs, ctx).await?;
        return Ok(fast_poll_requeue(ctx));
    }

    let retryable = match vs.status.as_ref().and_then(|s| s.error.as_ref()) {
        None => true,
        Some(error) => error.is_controller_update_failed(),
    };
    if retryable {
        create::create_snapshot_operation(vs, ctx).await?;
        return Ok(dispatch_poll_requeue(ctx));
    }

    // Permanent failure: stay quiescent until the user edits the object.
    Ok(Action::await_change())
}

async fn find_matching_content(vs: &VolumeSnapshot, ctx: &Context) -> Result<Option<VolumeSnapshotContent>> {
    let all = ctx.vsc_api().list(&ListParams::default()).await?;
    let namespace = vs.namespace().unwrap_or_default();
    let uid = vs.uid().unwrap_or_default();
    Ok(all.items.into_iter().find(|vsc| {
        let r = &vsc.spec.volume_snapshot_ref;
        r.name == vs.name_any() && r.namespace == namespace && r.uid == uid
    }))
}
