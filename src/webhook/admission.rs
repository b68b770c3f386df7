//! Default-class-injection admission webhook (spec §4.14 paragraph 3).
//!
//! Sets `spec.volumeSnapshotClassName` on a `VolumeSnapshot` that lacks
//! one, by resolving the source PVC's storage class provisioner and
//! matching it against the single `VolumeSnapshotClass` carrying the
//! `IsDefault` annotation. Grounded on the mutating-webhook shape in
//! `tembo-pod-init`'s `mutate.rs` (`AdmissionRequest`/`AdmissionResponse`/
//! `json_patch::diff`), adapted from actix-web to this crate's axum stack.

use json_patch::diff;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use k8s_openapi::api::storage::v1::StorageClass;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview};
use kube::core::TypeMeta;
use kube::{Api, Client};
use serde_json::json;

use crate::types::VolumeSnapshot;

pub async fn handle_review(review: AdmissionReview<VolumeSnapshot>, client: Client) -> AdmissionReview<VolumeSnapshot> {
    let Some(request) = review.request else {
        return AdmissionReview { request: None, response: None, types: review.types };
    };

    let response = handle_request(&request, client).await;

    AdmissionReview {
        request: None,
        response: Some(response),
        types: TypeMeta { api_version: "admission.k8s.io/v1".to_string(), kind: "AdmissionReview".to_string() },
    }
}

async fn handle_request(request: &AdmissionRequest<VolumeSnapshot>, client: Client) -> AdmissionResponse {
    let Some(vs) = request.object.as_ref() else {
        return AdmissionResponse::from(request);
    };

    if vs.spec.volume_snapshot_class_name.is_some() {
        return AdmissionResponse::from(request);
    }

    let Some(pvc_name) = vs.spec.source.persistent_volume_claim_name.as_deref() else {
        // Content-sourced VolumeSnapshot: no PVC to derive a provisioner from.
        return AdmissionResponse::from(request);
    };
    let namespace = vs.metadata.namespace.clone().unwrap_or_default();

    let provisioner = match resolve_provisioner(&client, &namespace, pvc_name).await {
        Ok(p) => p,
        Err(message) => return AdmissionResponse::from(request).deny(message),
    };

    let candidates = match matching_default_classes(&client, &provisioner).await {
        Ok(c) => c,
        Err(message) => return AdmissionResponse::from(request).deny(message),
    };

    let class_name = match candidates.as_slice() {
        [] => {
            return AdmissionResponse::from(request)
                .deny(format!("no default VolumeSnapshotClass found for driver \"{provisioner}\""));
        }
        [single] => single.clone(),
        many => {
            return AdmissionResponse::from(request).deny(format!(
                "{} default VolumeSnapshotClasses found for driver \"{provisioner}\", expected exactly one: {}",
                many.len(),
                many.join(", ")
            ));
        }
    };

    let mut mutated = vs.clone();
    mutated.spec.volume_snapshot_class_name = Some(class_name);

    let mut response = AdmissionResponse::from(request);
    let patch = diff(&json!(vs), &json!(mutated));
    if !patch.is_empty() {
        response = response.with_patch(patch).unwrap_or_else(|_| AdmissionResponse::from(request));
    }
    response
}

async fn resolve_provisioner(client: &Client, namespace: &str, pvc_name: &str) -> Result<String, String> {
    let pvc_api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), namespace);
    let pvc = pvc_api
        .get_opt(pvc_name)
        .await
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("source PVC {namespace}/{pvc_name} not found"))?;

    let volume_name = pvc
        .spec
        .as_ref()
        .and_then(|s| s.volume_name.as_deref())
        .filter(|_| pvc.status.as_ref().and_then(|s| s.phase.as_deref()) == Some("Bound"))
        .ok_or_else(|| format!("source PVC {namespace}/{pvc_name} is not bound"))?
        .to_string();

    let pv_api: Api<PersistentVolume> = Api::all(client.clone());
    let pv = pv_api.get(&volume_name).await.map_err(|e| e.to_string())?;
    if pv.spec.as_ref().and_then(|s| s.csi.as_ref()).is_none() {
        return Err(format!("bound PV {volume_name} has no CSI volume source"));
    }

    let storage_class_name = pvc.spec.as_ref().and_then(|s| s.storage_class_name.clone()).unwrap_or_default();
    if storage_class_name.is_empty() {
        return Ok(String::new());
    }
    let sc_api: Api<StorageClass> = Api::all(client.clone());
    Ok(sc_api
        .get_opt(&storage_class_name)
        .await
        .map_err(|e| e.to_string())?
        .map(|sc| sc.provisioner)
        .unwrap_or_default())
}

async fn matching_default_classes(client: &Client, provisioner: &str) -> Result<Vec<String>, String> {
    let class_api: Api<crate::types::VolumeSnapshotClass> = Api::all(client.clone());
    let all = class_api.list(&Default::default()).await.map_err(|e| e.to_string())?;
    Ok(all
        .items
        .into_iter()
        .filter(|c| c.is_default() && c.driver == provisioner)
        .filter_map(|c| c.name().map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_is_empty_when_classes_already_equal() {
        let mut a = VolumeSnapshot::default();
        a.spec.volume_snapshot_class_name = Some("gold".into());
        let b = a.clone();
        let patch = diff(&json!(a), &json!(b));
        assert!(patch.is_empty());
    }

    #[test]
    fn patch_is_nonempty_when_class_name_added() {
        let a = VolumeSnapshot::default();
        let mut b = a.clone();
        b.spec.volume_snapshot_class_name = Some("gold".into());
        let patch = diff(&json!(a), &json!(b));
        assert!(!patch.is_empty());
    }
}
