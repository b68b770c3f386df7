//! Sidecar create wrapper (spec §4.10).

use std::collections::BTreeMap;

use kube::api::PatchParams;
use kube::ResourceExt;

use crate::controller::common::class::resolve_class;
use crate::controller::Context;
use crate::error::{Error, Result};
use crate::secret::{self, TemplateContext};
use crate::store::{annotation_patch, status_patch};
use crate::types::{
    VolumeSnapshotContent, VolumeSnapshotContentStatus, ANN_VOLUME_SNAPSHOT_BEING_CREATED,
};

const CSI_PARAM_PREFIX: &str = "csi.storage.k8s.io/";

pub async fn create_snapshot(vsc: &VolumeSnapshotContent, ctx: &Context) -> Result<()> {
    let class = match &vsc.spec.volume_snapshot_class_name {
        Some(name) => Some(resolve_class(ctx, name).await?),
        None if vsc.spec.source.is_dynamic() => {
            return Err(Error::ClassNotFound(vsc.name_any()));
        }
        None => None,
    };

    let tmpl_ctx = TemplateContext::for_content_only(vsc);
    let empty_params = BTreeMap::new();
    let raw_params = class.as_ref().map(|c| &c.parameters).unwrap_or(&empty_params);
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

    let vsc_api = ctx.vsc_api();
    vsc_api
        .patch(
            &vsc.name_any(),
            &PatchParams::default(),
            &annotation_patch(ANN_VOLUME_SNAPSHOT_BEING_CREATED, Some("yes")),
        )
        .await?;

    let params = build_create_params(vsc, raw_params, ctx);
    let volume_handle = vsc.spec.source.volume_handle.clone().unwrap_or_default();
    let timer = crate::metrics::operation_start();
    let result = ctx
        .handler
        .create_snapshot(&vsc.name_any(), &volume_handle, &params, &creds)
        .await;
    crate::metrics::record_metrics(
        timer,
        &vsc.spec.driver,
        crate::metrics::OPERATION_CREATE_SNAPSHOT,
        if result.is_ok() { crate::metrics::STATUS_SUCCESS } else { crate::metrics::STATUS_FAIL },
    );

    match result {
        Ok(response) => {
            clear_being_created(&vsc_api, vsc).await?;
            let intended = VolumeSnapshotContentStatus {
                snapshot_handle: Some(response.snapshot_id),
                creation_time: Some(response.creation_time_ns),
                restore_size: Some(response.size_bytes),
                ready_to_use: Some(response.ready_to_use),
                error: None,
                volume_group_snapshot_handle: None,
            };
            if let Some(patch) = status_patch(&vsc.status, &intended) {
                vsc_api.patch_status(&vsc.name_any(), &PatchParams::default(), &patch).await?;
            }
            Ok(())
        }
        Err(e) if !e.clears_being_created_sentinel() => {
            // Sentinel stays: transient gRPC and non-gRPC errors alike mean
            // the RPC may still complete on the backend (spec.md:202).
            Err(e)
        }
        Err(e) => {
            clear_being_created(&vsc_api, vsc).await?;
            super::emit_warning(ctx, vsc, "SnapshotCreationFailed", &e.to_string()).await;
            let intended = VolumeSnapshotContentStatus {
                error: Some(crate::types::SnapshotError {
                    time: None,
                    message: Some(e.to_string()),
                    kind: Some(e.metric_label()),
                }),
                ..vsc.status.clone().unwrap_or_default()
            };
            if let Some(patch) = status_patch(&vsc.status, &intended) {
                vsc_api.patch_status(&vsc.name_any(), &PatchParams::default(), &patch).await?;
            }
            Err(e)
        }
    }
}

async fn clear_being_created(api: &kube::Api<VolumeSnapshotContent>, vsc: &VolumeSnapshotContent) -> Result<()> {
    api.patch(
        &vsc.name_any(),
        &PatchParams::default(),
        &annotation_patch(ANN_VOLUME_SNAPSHOT_BEING_CREATED, None),
    )
    .await?;
    Ok(())
}

fn strip_reserved_params(raw: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    raw.iter()
        .filter(|(k, _)| !k.starts_with(CSI_PARAM_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Strips reserved `csi.storage.k8s.io/` keys the CO injects (secret refs),
/// then optionally appends the synthetic metadata keys (spec §4.10 step 3).
fn build_create_params(
    vsc: &VolumeSnapshotContent,
    raw: &BTreeMap<String, String>,
    ctx: &Context,
) -> BTreeMap<String, String> {
    let mut params = strip_reserved_params(raw);

    if ctx.config.extra_create_metadata {
        let content_ref = &vsc.spec.volume_snapshot_ref;
        params.insert(
            "csi.storage.k8s.io/volumesnapshot/name".to_string(),
            content_ref.name.clone(),
        );
        params.insert(
            "csi.storage.k8s.io/volumesnapshot/namespace".to_string(),
            content_ref.namespace.clone(),
        );
        params.insert(
            "csi.storage.k8s.io/volumesnapshotcontent/name".to_string(),
            vsc.name_any(),
        );
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VolumeSnapshotContentSource, VolumeSnapshotContentSpec, VolumeSnapshotRef};

    fn content() -> VolumeSnapshotContent {
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
    fn strips_reserved_csi_params() {
        let mut raw = BTreeMap::new();
        raw.insert(secret::SNAPSHOTTER_SECRET_NAME_PARAM.to_string(), "s".into());
        raw.insert("type".to_string(), "gold".into());
        let params = strip_reserved_params(&raw);
        assert!(!params.contains_key(secret::SNAPSHOTTER_SECRET_NAME_PARAM));
        assert_eq!(params.get("type"), Some(&"gold".to_string()));
    }

    #[test]
    fn content_fixture_has_dynamic_source() {
        assert!(content().spec.source.is_dynamic());
    }
}
