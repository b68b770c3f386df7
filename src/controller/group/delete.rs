//! Group sidecar delete operation, paralleling `sidecar::delete` (spec
//! §4.11, §4.13).

use std::collections::BTreeMap;

use kube::api::PatchParams;
use kube::ResourceExt;

use crate::controller::Context;
use crate::error::{Error, Result};
use crate::scheduler::delete_operation_name;
use crate::store::{object_key, status_patch};
use crate::types::{VolumeGroupSnapshotContent, VolumeGroupSnapshotContentStatus};

/// Gates the backend `DeleteVolumeGroupSnapshot` RPC through the per-name
/// scheduler (spec §4.6/§8), same as `sidecar::delete::delete_operation`.
pub async fn delete_group_operation(vgsc: &VolumeGroupSnapshotContent, ctx: &Context) -> Result<()> {
    let uid = vgsc.uid().unwrap_or_default();
    let key = object_key(None, &vgsc.name_any());
    let gate_name = delete_operation_name(&key, &uid);

    let scheduler = ctx.scheduler.clone();
    let vgsc = vgsc.clone();
    let ctx = ctx.clone();
    let result = scheduler
        .run(&gate_name, async move { do_delete_group(&vgsc, &ctx).await })
        .await;
    if matches!(result, Err(Error::AlreadyRunning(_)) | Err(Error::Backoff(_))) {
        crate::metrics::drop_operation("", crate::metrics::OPERATION_DELETE_GROUP_SNAPSHOT);
    }
    result
}

async fn do_delete_group(vgsc: &VolumeGroupSnapshotContent, ctx: &Context) -> Result<()> {
    let Some(group_id) = vgsc.status.as_ref().and_then(|s| s.volume_group_snapshot_handle.clone()) else {
        return Ok(());
    };
    let member_ids: Vec<String> = vgsc
        .status
        .as_ref()
        .map(|s| s.volume_snapshot_info_list.iter().map(|m| m.snapshot_handle.clone()).collect())
        .unwrap_or_else(|| vgsc.spec.source.volume_snapshot_handles.clone());

    let creds = BTreeMap::new();
    let timer = crate::metrics::operation_start();
    let result = ctx.handler.delete_group_snapshot(&group_id, &member_ids, &creds).await;
    crate::metrics::record_metrics(
        timer,
        &vgsc.spec.driver,
        crate::metrics::OPERATION_DELETE_GROUP_SNAPSHOT,
        if result.is_ok() { crate::metrics::STATUS_SUCCESS } else { crate::metrics::STATUS_FAIL },
    );

    match result {
        Ok(()) => {
            let intended = VolumeGroupSnapshotContentStatus {
                volume_group_snapshot_handle: None,
                creation_time: None,
                ready_to_use: None,
                error: None,
                volume_snapshot_info_list: Vec::new(),
            };
            if let Some(patch) = status_patch(&vgsc.status, &intended) {
                kube::Api::<VolumeGroupSnapshotContent>::all(ctx.client.clone())
                    .patch_status(&vgsc.name_any(), &PatchParams::default(), &patch)
                    .await?;
            }
            Ok(())
        }
        Err(e) => {
            super::emit_warning(ctx, vgsc, "GroupSnapshotDeleteError", &e.to_string()).await;
            Err(e)
        }
    }
}
