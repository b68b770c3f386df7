//! Common controller `syncContent` (spec §4.3).

use std::sync::Arc;

use kube::api::{Patch, PatchParams};
use kube::runtime::controller::Action;
use kube::runtime::events::{Event, EventType};
use kube::ResourceExt;

use crate::controller::common::{ensure_finalizer, remove_finalizer};
use crate::controller::{accept_version, fast_poll_requeue, steady_state_requeue, Context};
use crate::error::{Error, Result};
use crate::store::object_key;
use crate::types::{
    ref_matches, DeletionPolicy, VolumeSnapshotContent, ANN_VOLUME_SNAPSHOT_BEING_CREATED,
    ANN_VOLUME_SNAPSHOT_BEING_DELETED, CONTENT_PROTECTION_FINALIZER,
};

pub async fn reconcile_content(vsc: Arc<VolumeSnapshotContent>, ctx: Arc<Context>) -> Result<Action> {
    let key = object_key(None, &vsc.name_any());
    if !accept_version(&ctx, &key, vsc.as_ref())? {
        return Ok(Action::await_change());
    }

    let vsc_api = ctx.vsc_api();

    // Step 1: deletion candidate.
    if vsc.meta().deletion_timestamp.is_some() {
        let still_has_backend_artifact = vsc.spec.deletion_policy == DeletionPolicy::Delete
            && (vsc.status.as_ref().and_then(|s| s.snapshot_handle.as_ref()).is_some()
                || vsc
                    .meta()
                    .annotations
                    .as_ref()
                    .map(|a| a.contains_key(ANN_VOLUME_SNAPSHOT_BEING_CREATED))
                    .unwrap_or(false));
        let in_use = is_bound_to_live_snapshot(&vsc, &ctx).await? || still_has_backend_artifact;
        if !in_use {
            remove_finalizer(&vsc_api, &vsc, CONTENT_PROTECTION_FINALIZER).await?;
        }
        return Ok(Action::await_change());
    }

    let content_ref = &vsc.spec.volume_snapshot_ref;

    // Step 2: finalizer presence (only meaningful once the content is bound
    // to something that exists).
    if !content_ref.name.is_empty() {
        if let Some(vs) = lookup_snapshot(&ctx, content_ref).await? {
            let _ = vs;
            ensure_finalizer(&vsc_api, &vsc, CONTENT_PROTECTION_FINALIZER).await?;
        }
    }

    // Step 3: ref empty -> user-visible configuration error.
    if content_ref.name.is_empty() {
        ctx.recorder_for(vsc.as_ref())
            .publish(Event {
                type_: EventType::Warning,
                reason: "SnapshotContentMisconfigured".into(),
                note: Some("volumeSnapshotRef.name is empty".into()),
                action: "Syncing".into(),
                secondary: None,
            })
            .await
            .ok();
        return Err(Error::ContentNotBound(vsc.name_any()));
    }

    // Step 4: pre-bound but not yet bound by UID -> defer to snapshot reconcile.
    if content_ref.uid.is_empty() {
        return Ok(Action::await_change());
    }

    // Step 5: look up the bound VS by key.
    match lookup_snapshot(&ctx, content_ref).await? {
        Some(vs) if vs.uid().as_deref() == Some(content_ref.uid.as_str()) => {
            Ok(steady_state_requeue(&ctx))
        }
        _ => handle_orphan(&vsc, &vsc_api, &ctx).await,
    }
}

async fn lookup_snapshot(
    ctx: &Context,
    content_ref: &crate::types::VolumeSnapshotRef,
) -> Result<Option<crate::types::VolumeSnapshot>> {
    if content_ref.name.is_empty() || content_ref.namespace.is_empty() {
        return Ok(None);
    }
    let api = ctx.vs_api(&content_ref.namespace);
    match api.get_opt(&content_ref.name).await? {
        Some(vs) => Ok(Some(vs)),
        None => Ok(None),
    }
}

async fn is_bound_to_live_snapshot(vsc: &VolumeSnapshotContent, ctx: &Context) -> Result<bool> {
    let content_ref = &vsc.spec.volume_snapshot_ref;
    if content_ref.uid.is_empty() {
        return Ok(false);
    }
    match lookup_snapshot(ctx, content_ref).await? {
        Some(vs) => {
            let matches = ref_matches(
                content_ref,
                &vs.name_any(),
                vs.namespace().as_deref().unwrap_or_default(),
                vs.uid().as_deref().unwrap_or_default(),
            );
            let bound_back = vs
                .status
                .as_ref()
                .and_then(|s| s.bound_volume_snapshot_content_name.as_deref())
                == Some(vsc.name_any().as_str());
            Ok(matches && bound_back)
        }
        None => Ok(false),
    }
}

/// Spec §4.3 step 6. `DeletionPolicy` is a closed two-variant enum, so the
/// "unknown policy" branch from spec §9 open question (a) is unrepresentable
/// by construction; we implement exactly the two real cases.
async fn handle_orphan(
    vsc: &VolumeSnapshotContent,
    vsc_api: &kube::Api<VolumeSnapshotContent>,
    ctx: &Context,
) -> Result<Action> {
    match vsc.spec.deletion_policy {
        DeletionPolicy::Retain => {
            tracing::debug!(content = %vsc.name_any(), "orphaned content retained per deletion policy");
            Ok(Action::await_change())
        }
        DeletionPolicy::Delete => {
            let patch = serde_json::json!({
                "metadata": {
                    "annotations": { ANN_VOLUME_SNAPSHOT_BEING_DELETED: "yes" }
                }
            });
            vsc_api
                .patch(&vsc.name_any(), &PatchParams::default(), &Patch::Merge(patch))
                .await?;
            vsc_api.delete(&vsc.name_any(), &Default::default()).await?;
            Ok(fast_poll_requeue(ctx))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{VolumeSnapshotContentSource, VolumeSnapshotContentSpec, VolumeSnapshotRef};

    fn content(ref_uid: &str, policy: DeletionPolicy) -> VolumeSnapshotContent {
        let mut vsc = VolumeSnapshotContent::default();
        vsc.metadata.name = Some("content-1".into());
        vsc.spec = VolumeSnapshotContentSpec {
            volume_snapshot_ref: VolumeSnapshotRef {
                name: "snap-1".into(),
                namespace: "default".into(),
                uid: ref_uid.into(),
            },
            source: VolumeSnapshotContentSource {
                volume_handle: Some("vol-1".into()),
                snapshot_handle: None,
            },
            driver: "mock.csi.k8s.io".into(),
            deletion_policy: policy,
            volume_snapshot_class_name: Some("gold".into()),
        };
        vsc
    }

    #[test]
    fn empty_ref_name_is_detectable() {
        let mut vsc = content("uid-1", DeletionPolicy::Delete);
        vsc.spec.volume_snapshot_ref.name.clear();
        assert!(vsc.spec.volume_snapshot_ref.name.is_empty());
    }

    #[test]
    fn pre_bound_has_empty_uid() {
        let vsc = content("", DeletionPolicy::Retain);
        assert!(vsc.spec.volume_snapshot_ref.uid.is_empty());
    }
}
