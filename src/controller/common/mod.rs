//! Common controller: binding, classing, finalizers and create/delete
//! dispatch for `VolumeSnapshot`/`VolumeSnapshotContent` (spec §4.3-§4.8).

mod bind;
mod class;
mod content;
mod create;
mod snapshot;
mod status;

pub use bind::{bind_and_update_volume_snapshot, check_and_bind_snapshot_content};
pub use class::{resolve_class, resolve_default_class_for_driver, resolve_source_pv};
pub use content::reconcile_content;
pub use create::create_snapshot_operation;
pub use snapshot::reconcile_snapshot;
pub use status::check_and_update_bound_snapshot_status_operation;

use kube::api::{Patch, PatchParams};
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;

/// Add `finalizer` to `obj`'s finalizer list if absent, via a full-replace
/// merge patch (spec §4.3 step 2 / §4.4 step 2).
pub(crate) async fn ensure_finalizer<K>(api: &kube::Api<K>, obj: &K, finalizer: &str) -> Result<bool>
where
    K: Resource<DynamicType = ()> + Clone + std::fmt::Debug + Serialize + for<'de> serde::Deserialize<'de>,
{
    let mut finalizers = obj.finalizers().to_vec();
    if finalizers.iter().any(|f| f == finalizer) {
        return Ok(false);
    }
    finalizers.push(finalizer.to_string());
    let patch: Value = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(patch))
        .await?;
    Ok(true)
}

/// Remove `finalizer` from `obj`'s finalizer list if present.
pub(crate) async fn remove_finalizer<K>(api: &kube::Api<K>, obj: &K, finalizer: &str) -> Result<bool>
where
    K: Resource<DynamicType = ()> + Clone + std::fmt::Debug + Serialize + for<'de> serde::Deserialize<'de>,
{
    let finalizers: Vec<String> = obj
        .finalizers()
        .iter()
        .filter(|f| f.as_str() != finalizer)
        .cloned()
        .collect();
    if finalizers.len() == obj.finalizers().len() {
        return Ok(false);
    }
    let patch: Value = serde_json::json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&obj.name_any(), &PatchParams::default(), &Patch::Merge(patch))
        .await?;
    Ok(true)
}
