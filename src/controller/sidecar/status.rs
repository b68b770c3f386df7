//! Fallback status probe: content exists, has no handle/readiness yet, and
//! isn't mid-create or mid-delete. Poll the backend directly.

use std::collections::BTreeMap;

use kube::api::PatchParams;
use kube::ResourceExt;

use crate::controller::Context;
use crate::error::Result;
use crate::store::status_patch;
use crate::types::{VolumeSnapshotContent, VolumeSnapshotContentStatus};

pub async fn check_and_update_content_status(vsc: &VolumeSnapshotContent, ctx: &Context) -> Result<()> {
    let Some(snapshot_id) = vsc.status.as_ref().and_then(|s| s.snapshot_handle.clone()) else {
        return Ok(());
    };

    let creds = BTreeMap::new();
    let response = ctx.handler.get_snapshot_status(&snapshot_id, &creds).await?;

    let intended = VolumeSnapshotContentStatus {
        ready_to_use: Some(response.ready_to_use),
        creation_time: Some(response.creation_time_ns),
        restore_size: Some(response.size_bytes),
        volume_group_snapshot_handle: response.group_snapshot_id,
        ..vsc.status.clone().unwrap_or_default()
    };

    if let Some(patch) = status_patch(&vsc.status, &intended) {
        ctx.vsc_api()
            .patch_status(&vsc.name_any(), &PatchParams::default(), &patch)
            .await?;
    }
    Ok(())
}
