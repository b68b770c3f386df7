//! Class/default-class resolution and source-PVC→PV handle lookup shared by
//! `createSnapshotOperation` (§4.8) and `checkandUpdateBoundSnapshotStatus`
//! (§4.7).

use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::Api;

use crate::controller::Context;
use crate::error::{Error, Result};
use crate::types::VolumeSnapshotClass;

pub async fn resolve_class(ctx: &Context, class_name: &str) -> Result<VolumeSnapshotClass> {
    ctx.class_api()
        .get_opt(class_name)
        .await?
        .ok_or_else(|| Error::ClassNotFound(class_name.to_string()))
}

/// Spec §3: "resolved to the single default class whose driver matches the
/// source PVC's storage class provisioner."
pub async fn resolve_default_class_for_driver(
    ctx: &Context,
    driver: &str,
) -> Result<VolumeSnapshotClass> {
    let all = ctx.class_api().list(&Default::default()).await?;
    let mut candidates: Vec<VolumeSnapshotClass> = all
        .items
        .into_iter()
        .filter(|c| c.is_default() && c.driver == driver)
        .collect();

    match candidates.len() {
        0 => Err(Error::NoDefaultClass(driver.to_string())),
        1 => Ok(candidates.remove(0)),
        _ => Err(Error::AmbiguousDefaultClass(
            driver.to_string(),
            candidates.iter().filter_map(|c| c.name().map(str::to_string)).collect(),
        )),
    }
}

/// Resolves a PVC's bound PV and returns `(csi_volume_handle, provisioner)`.
pub async fn resolve_source_pv(
    ctx: &Context,
    namespace: &str,
    pvc_name: &str,
) -> Result<(String, String)> {
    let pvc_api: Api<PersistentVolumeClaim> = Api::namespaced(ctx.client.clone(), namespace);
    let pvc = pvc_api
        .get_opt(pvc_name)
        .await?
        .ok_or_else(|| Error::NotFound(format!("{namespace}/{pvc_name}")))?;

    let volume_name = pvc
        .spec
        .as_ref()
        .and_then(|s| s.volume_name.as_deref())
        .filter(|_| pvc.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Bound"))
        .ok_or_else(|| Error::PvcNotBound(pvc_name.to_string()))?
        .to_string();

    let pv_api: Api<PersistentVolume> = Api::all(ctx.client.clone());
    let pv = pv_api
        .get(&volume_name)
        .await
        .map_err(Error::KubeError)?;

    let handle = pv
        .spec
        .as_ref()
        .and_then(|s| s.csi.as_ref())
        .map(|csi| csi.volume_handle.clone())
        .ok_or_else(|| Error::PvcNotBound(pvc_name.to_string()))?;

    let storage_class_name = pvc
        .spec
        .as_ref()
        .and_then(|s| s.storage_class_name.clone())
        .unwrap_or_default();
    let provisioner = if storage_class_name.is_empty() {
        String::new()
    } else {
        let sc_api: Api<StorageClass> = Api::all(ctx.client.clone());
        sc_api
            .get_opt(&storage_class_name)
            .await?
            .map(|sc| sc.provisioner)
            .unwrap_or_default()
    };

    Ok((handle, provisioner))
}
