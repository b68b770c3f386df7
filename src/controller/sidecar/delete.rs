//! Sidecar delete operation (spec §4.11).

use std::collections::BTreeMap;

use kube::api::PatchParams;
use kube::ResourceExt;

use crate::controller::Context;
use crate::error::{Error, Result};
use crate::scheduler::delete_operation_name;
use crate::secret::{self, SecretReference};
use crate::store::{object_key, status_patch};
use crate::types::{
    VolumeSnapshotContent, VolumeSnapshotContentStatus, ANN_DELETION_SECRET_NAME,
    ANN_DELETION_SECRET_NAMESPACE,
};

/// Gates the backend `DeleteSnapshot` RPC through the per-name scheduler
/// (spec §4.6/§8) so informer resyncs re-enqueuing the same content while a
/// slow delete is in flight collapse onto the one in-flight attempt instead
/// of double-issuing the RPC.
pub async fn delete_operation(vsc: &VolumeSnapshotContent, ctx: &Context) -> Result<()> {
    let uid = vsc.uid().unwrap_or_default();
    let key = object_key(None, &vsc.name_any());
    let gate_name = delete_operation_name(&key, &uid);

    let scheduler = ctx.scheduler.clone();
    let vsc = vsc.clone();
    let ctx = ctx.clone();
    let result = scheduler
        .run(&gate_name, async move { do_delete(&vsc, &ctx).await })
        .await;
    if matches!(result, Err(Error::AlreadyRunning(_)) | Err(Error::Backoff(_))) {
        crate::metrics::drop_operation("", crate::metrics::OPERATION_DELETE_SNAPSHOT);
    }
    result
}

async fn do_delete(vsc: &VolumeSnapshotContent, ctx: &Context) -> Result<()> {
    let Some(snapshot_id) = vsc.status.as_ref().and_then(|s| s.snapshot_handle.clone()) else {
        return Ok(());
    };

    let creds = match pinned_deletion_secret(vsc) {
        Some(reference) => secret::fetch_credentials(&ctx.client, &reference).await?,
        None => BTreeMap::new(),
    };

    let timer = crate::metrics::operation_start();
    let result = ctx.handler.delete_snapshot(&snapshot_id, &creds).await;
    crate::metrics::record_metrics(
        timer,
        &vsc.spec.driver,
        crate::metrics::OPERATION_DELETE_SNAPSHOT,
        if result.is_ok() { crate::metrics::STATUS_SUCCESS } else { crate::metrics::STATUS_FAIL },
    );

    match result {
        Ok(()) => {
            let intended = VolumeSnapshotContentStatus {
                snapshot_handle: None,
                creation_time: None,
                restore_size: None,
                ready_to_use: None,
                error: None,
                volume_group_snapshot_handle: None,
            };
            if let Some(patch) = status_patch(&vsc.status, &intended) {
                ctx.vsc_api()
                    .patch_status(&vsc.name_any(), &PatchParams::default(), &patch)
                    .await?;
            }
            Ok(())
        }
        Err(e) => {
            super::emit_warning(ctx, vsc, "SnapshotDeleteError", &e.to_string()).await;
            Err(e)
        }
    }
}

fn pinned_deletion_secret(vsc: &VolumeSnapshotContent) -> Option<SecretReference> {
    let annotations = vsc.metadata.annotations.as_ref()?;
    let name = annotations.get(ANN_DELETION_SECRET_NAME)?;
    let namespace = annotations.get(ANN_DELETION_SECRET_NAMESPACE)?;
    Some(SecretReference {
        namespace: namespace.clone(),
        name: name.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VolumeSnapshotContentSource, VolumeSnapshotContentSpec, VolumeSnapshotRef};

    fn content_without_secret() -> VolumeSnapshotContent {
        let mut vsc = VolumeSnapshotContent::default();
        vsc.metadata.name = Some("content-1".into());
        vsc.spec = VolumeSnapshotContentSpec {
            volume_snapshot_ref: VolumeSnapshotRef {
                name: "snap-1".into(),
                namespace: "default".into(),
                uid: "uid-1".into(),
            },
            source: VolumeSnapshotContentSource {
                volume_handle: None,
                snapshot_handle: Some("sid-1".into()),
            },
            driver: "mock.csi.k8s.io".into(),
            deletion_policy: crate::types::DeletionPolicy::Delete,
            volume_snapshot_class_name: Some("gold".into()),
        };
        vsc
    }

    #[test]
    fn no_pinned_secret_without_annotations() {
        assert!(pinned_deletion_secret(&content_without_secret()).is_none());
    }

    #[test]
    fn pinned_secret_read_from_annotations() {
        let mut vsc = content_without_secret();
        let mut annotations = std::collections::BTreeMap::new();
        annotations.insert(ANN_DELETION_SECRET_NAME.to_string(), "s1".into());
        annotations.insert(ANN_DELETION_SECRET_NAMESPACE.to_string(), "ns1".into());
        vsc.metadata.annotations = Some(annotations);
        let reference = pinned_deletion_secret(&vsc).unwrap();
        assert_eq!(reference.name, "s1");
        assert_eq!(reference.namespace, "ns1");
    }
}
