//! `checkandUpdateBoundSnapshotStatusOperation` (spec §4.7).

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::PatchParams;
use kube::ResourceExt;

use crate::controller::common::class::resolve_source_pv;
use crate::controller::Context;
use crate::error::Result;
use crate::secret::{self, TemplateContext};
use crate::store::status_patch;
use crate::types::{VolumeSnapshot, VolumeSnapshotContent, VolumeSnapshotStatus};

fn now_chrono() -> Time {
    Time(chrono::DateTime::<chrono::Utc>::from(SystemTime::now()))
}

pub async fn check_and_update_bound_snapshot_status_operation(
    vs: &VolumeSnapshot,
    vsc: &VolumeSnapshotContent,
    ctx: &Context,
) -> Result<()> {
    let (creation_time, ready_to_use, restore_size) = if vs
        .spec
        .source
        .volume_snapshot_content_name
        .is_some()
    {
        // Pre-bound path: ask the backend for current status of the
        // already-provisioned handle.
        let snapshot_id = vsc
            .status
            .as_ref()
            .and_then(|s| s.snapshot_handle.as_deref())
            .unwrap_or_default();
        let creds = pinned_deletion_creds(vsc, ctx).await?;
        let status = ctx.handler.get_snapshot_status(snapshot_id, &creds).await?;
        (
            nanos_to_time(status.creation_time_ns),
            status.ready_to_use,
            Some(status.size_bytes),
        )
    } else {
        // Dynamic path: the handler is idempotent on the snapshot's name,
        // so this call is safe to repeat every sync.
        let pvc_name = vs.spec.source.persistent_volume_claim_name.as_deref().unwrap_or_default();
        let namespace = vs.namespace().unwrap_or_default();
        let (volume_handle, _provisioner) = resolve_source_pv(ctx, &namespace, pvc_name).await?;

        let class_name = vs.spec.volume_snapshot_class_name.clone().unwrap_or_default();
        let class = super::class::resolve_class(ctx, &class_name).await?;

        let creds = class_creds(&class, vs, vsc, ctx).await?;
        let snapshot_name = crate::handler::derive_snapshot_name(
            &ctx.config.snapshot_name_prefix,
            &vs.uid().unwrap_or_default(),
            ctx.config.snapshot_name_uuid_length,
        );
        let response = ctx
            .handler
            .create_snapshot(&snapshot_name, &volume_handle, &class.parameters, &creds)
            .await?;
        (
            nanos_to_time(response.creation_time_ns),
            response.ready_to_use,
            Some(response.size_bytes),
        )
    };

    let intended = VolumeSnapshotStatus {
        creation_time: Some(creation_time),
        ready_to_use: Some(ready_to_use),
        restore_size: restore_size.map(|b| b.to_string()),
        ..vs.status.clone().unwrap_or_default()
    };

    if let Some(patch) = status_patch(&vs.status, &intended) {
        ctx.vs_api(&vs.namespace().unwrap_or_default())
            .patch_status(&vs.name_any(), &PatchParams::default(), &patch)
            .await?;
    }
    Ok(())
}

fn nanos_to_time(nanos: i64) -> Time {
    if nanos == 0 {
        return now_chrono();
    }
    let secs = nanos / 1_000_000_000;
    let nsecs = (nanos % 1_000_000_000) as u32;
    match chrono::DateTime::from_timestamp(secs, nsecs) {
        Some(dt) => Time(dt),
        None => now_chrono(),
    }
}

async fn pinned_deletion_creds(
    vsc: &VolumeSnapshotContent,
    ctx: &Context,
) -> Result<BTreeMap<String, String>> {
    use crate::types::{ANN_DELETION_SECRET_NAME, ANN_DELETION_SECRET_NAMESPACE};
    let annotations = vsc.meta().annotations.clone().unwrap_or_default();
    match (
        annotations.get(ANN_DELETION_SECRET_NAME),
        annotations.get(ANN_DELETION_SECRET_NAMESPACE),
    ) {
        (Some(name), Some(namespace)) => {
            let reference = secret::SecretReference {
                namespace: namespace.clone(),
                name: name.clone(),
            };
            secret::fetch_credentials(&ctx.client, &reference).await
        }
        _ => Ok(BTreeMap::new()),
    }
}

async fn class_creds(
    class: &crate::types::VolumeSnapshotClass,
    vs: &VolumeSnapshot,
    vsc: &VolumeSnapshotContent,
    ctx: &Context,
) -> Result<BTreeMap<String, String>> {
    let tmpl_ctx = TemplateContext::for_create(vs, &vsc.name_any());
    let reference = secret::resolve_secret_reference(
        &class.parameters,
        secret::SNAPSHOTTER_SECRET_NAME_PARAM,
        secret::SNAPSHOTTER_SECRET_NAMESPACE_PARAM,
        &tmpl_ctx,
    )?;
    match reference {
        Some(r) => secret::fetch_credentials(&ctx.client, &r).await,
        None => Ok(BTreeMap::new()),
    }
}
