//! Group sidecar create wrapper, paralleling `sidecar::create` (spec §4.10,
//! §4.13) but over the `*_group_snapshot` handler trio.

use std::collections::BTreeMap;

use kube::api::PatchParams;
use kube::ResourceExt;

use crate::controller::common::class::resolve_class;
use crate::controller::Context;
use crate::error::Result;
use crate::secret::{self, TemplateContext};
use crate::store::{annotation_patch, status_patch};
use crate::types::{
    VolumeGroupSnapshotContent, VolumeGroupSnapshotContentStatus, VolumeSnapshotInfo,
    ANN_GROUP_SNAPSHOT_BEING_CREATED,
};

pub async fn create_group_snapshot(vgsc: &VolumeGroupSnapshotContent, ctx: &Context) -> Result<()> {
    let class = match &vgsc.spec.volume_group_snapshot_class_name {
        Some(name) => Some(resolve_class(ctx, name).await?),
        None => None,
    };
    let empty_params = BTreeMap::new();
    let raw_params = class.as_ref().map(|c| &c.parameters).unwrap_or(&empty_params);

    let tmpl_ctx = TemplateContext::default();
    let secret_ref = secret::resolve_secret_reference(
        raw_params,
        secret::SNAPSHOTTER_SECRET_NAME_PARAM,
        secret::SNAPSHOTTER_SECRET_NAMESPACE_PARAM,
        &tmpl_ctx,
    )?;
    let creds = match &secret_ref {
        Some(r) => secret::fetch_credentials(&ctx.client, r).await?,
        None => BTreeMap::new(),
    };

    let api = kube::Api::<VolumeGroupSnapshotContent>::all(ctx.client.clone());
    api.patch(
        &vgsc.name_any(),
        &PatchParams::default(),
        &annotation_patch(ANN_GROUP_SNAPSHOT_BEING_CREATED, Some("yes")),
    )
    .await?;

    let group_name = format!(
        "groupsnapshot-{}",
        vgsc.spec.volume_group_snapshot_ref.uid
    );
    let timestamp = chrono::Utc::now().timestamp();
    let member_names: Vec<String> = vgsc
        .spec
        .source
        .volume_handles
        .iter()
        .map(|h| super::derive_member_snapshot_name(&vgsc.spec.volume_group_snapshot_ref.uid, h, timestamp))
        .collect();

    let timer = crate::metrics::operation_start();
    let result = ctx
        .handler
        .create_group_snapshot(&group_name, &vgsc.spec.source.volume_handles, &member_names, raw_params, &creds)
        .await;
    crate::metrics::record_metrics(
        timer,
        &vgsc.spec.driver,
        crate::metrics::OPERATION_CREATE_GROUP_SNAPSHOT,
        if result.is_ok() { crate::metrics::STATUS_SUCCESS } else { crate::metrics::STATUS_FAIL },
    );

    match result {
        Ok(response) => {
            clear_being_created(&api, vgsc).await?;
            let members = response
                .members
                .iter()
                .zip(vgsc.spec.source.volume_handles.iter())
                .map(|(m, volume_handle)| VolumeSnapshotInfo {
                    volume_handle: volume_handle.clone(),
                    snapshot_handle: m.snapshot_id.clone(),
                    creation_time: Some(m.creation_time_ns),
                    ready_to_use: Some(m.ready_to_use),
                    restore_size: Some(m.size_bytes),
                })
                .collect();
            let intended = VolumeGroupSnapshotContentStatus {
                volume_group_snapshot_handle: Some(response.group_snapshot_id),
                creation_time: Some(response.creation_time_ns),
                ready_to_use: Some(response.ready_to_use),
                error: None,
                volume_snapshot_info_list: members,
            };
            if let Some(patch) = status_patch(&vgsc.status, &intended) {
                api.patch_status(&vgsc.name_any(), &PatchParams::default(), &patch).await?;
            }
            Ok(())
        }
        Err(e) if !e.clears_being_created_sentinel() => {
            // Sentinel stays: transient gRPC and non-gRPC errors alike mean
            // the RPC may still complete on the backend (spec.md:202).
            Err(e)
        }
        Err(e) => {
            clear_being_created(&api, vgsc).await?;
            super::emit_warning(ctx, vgsc, "GroupSnapshotCreationFailed", &e.to_string()).await;
            let intended = VolumeGroupSnapshotContentStatus {
                error: Some(crate::types::SnapshotError {
                    time: None,
                    message: Some(e.to_string()),
                    kind: Some(e.metric_label()),
                }),
                ..vgsc.status.clone().unwrap_or_default()
            };
            if let Some(patch) = status_patch(&vgsc.status, &intended) {
                api.patch_status(&vgsc.name_any(), &PatchParams::default(), &patch).await?;
            }
            Err(e)
        }
    }
}

async fn clear_being_created(
    api: &kube::Api<VolumeGroupSnapshotContent>,
    vgsc: &VolumeGroupSnapshotContent,
) -> Result<()> {
    api.patch(
        &vgsc.name_any(),
        &PatchParams::default(),
        &annotation_patch(ANN_GROUP_SNAPSHOT_BEING_CREATED, None),
    )
    .await?;
    Ok(())
}
