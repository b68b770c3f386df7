//! Fallback group-status probe, paralleling `sidecar::status` (spec §4.13).

use std::collections::BTreeMap;

use kube::api::PatchParams;
use kube::ResourceExt;

use crate::controller::Context;
use crate::error::Result;
use crate::store::status_patch;
use crate::types::{VolumeGroupSnapshotContent, VolumeGroupSnapshotContentStatus, VolumeSnapshotInfo};

pub async fn check_and_update_group_status(vgsc: &VolumeGroupSnapshotContent, ctx: &Context) -> Result<()> {
    let Some(group_id) = vgsc.status.as_ref().and_then(|s| s.volume_group_snapshot_handle.clone()) else {
        return Ok(());
    };
    let (member_ids, volume_handles): (Vec<String>, Vec<String>) = match &vgsc.status {
        Some(s) if !s.volume_snapshot_info_list.is_empty() => s
            .volume_snapshot_info_list
            .iter()
            .map(|m| (m.snapshot_handle.clone(), m.volume_handle.clone()))
            .unzip(),
        _ => (
            vgsc.spec.source.volume_snapshot_handles.clone(),
            vgsc.spec.source.volume_handles.clone(),
        ),
    };

    let creds = BTreeMap::new();
    let response = ctx
        .handler
        .get_group_snapshot_status(&group_id, &member_ids, &creds)
        .await?;

    let members = response
        .members
        .iter()
        .zip(member_ids.iter())
        .enumerate()
        .map(|(i, (m, handle))| VolumeSnapshotInfo {
            volume_handle: volume_handles.get(i).cloned().unwrap_or_default(),
            snapshot_handle: handle.clone(),
            creation_time: Some(m.creation_time_ns),
            ready_to_use: Some(m.ready_to_use),
            restore_size: Some(m.size_bytes),
        })
        .collect();

    let intended = VolumeGroupSnapshotContentStatus {
        ready_to_use: Some(response.ready_to_use),
        creation_time: Some(response.creation_time_ns),
        volume_snapshot_info_list: members,
        ..vgsc.status.clone().unwrap_or_default()
    };

    if let Some(patch) = status_patch(&vgsc.status, &intended) {
        kube::Api::<VolumeGroupSnapshotContent>::all(ctx.client.clone())
            .patch_status(&vgsc.name_any(), &PatchParams::default(), &patch)
            .await?;
    }
    Ok(())
}
