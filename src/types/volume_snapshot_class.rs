//! `VolumeSnapshotClass` — cluster-scoped template supplying driver,
//! parameters and deletion policy. Unlike `VolumeSnapshot`/
//! `VolumeSnapshotContent` this object has no spec/status split: its
//! fields sit directly alongside `apiVersion`/`kind`/`metadata`, so it is
//! modeled by hand against `k8s_openapi::Resource` rather than through the
//! `kube::CustomResource` derive (which always nests a generated `spec`).

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::{Metadata, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::volume_snapshot_content::DeletionPolicy;

/// Annotation marking a class as the default for its driver.
pub const ANN_IS_DEFAULT_CLASS: &str = "snapshot.storage.kubernetes.io/is-default-class";

#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSnapshotClass {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub driver: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    pub deletion_policy: DeletionPolicy,
}

impl VolumeSnapshotClass {
    pub fn is_default(&self) -> bool {
        self.metadata
            .annotations
            .as_ref()
            .and_then(|a| a.get(ANN_IS_DEFAULT_CLASS))
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    pub fn name(&self) -> Option<&str> {
        self.metadata.name.as_deref()
    }
}

impl Resource for VolumeSnapshotClass {
    const API_VERSION: &'static str = "snapshot.storage.k8s.io/v1";
    const GROUP: &'static str = "snapshot.storage.k8s.io";
    const KIND: &'static str = "VolumeSnapshotClass";
    const VERSION: &'static str = "v1";
    const URL_PATH_SEGMENT: &'static str = "volumesnapshotclasses";
    type Scope = k8s_openapi::ClusterResourceScope;
}

impl Metadata for VolumeSnapshotClass {
    type Ty = ObjectMeta;

    fn metadata(&self) -> &Self::Ty {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut Self::Ty {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    #[test]
    fn detects_default_annotation() {
        let mut annotations = Map::new();
        annotations.insert(ANN_IS_DEFAULT_CLASS.to_string(), "true".to_string());
        let class = VolumeSnapshotClass {
            metadata: ObjectMeta {
                name: Some("gold".into()),
                annotations: Some(annotations),
                ..Default::default()
            },
            driver: "mock.csi.k8s.io".to_string(),
            parameters: Map::new(),
            deletion_policy: DeletionPolicy::Delete,
        };
        assert!(class.is_default());
        assert_eq!(class.name(), Some("gold"));
    }

    #[test]
    fn non_default_without_annotation() {
        let class = VolumeSnapshotClass {
            metadata: ObjectMeta::default(),
            driver: "mock.csi.k8s.io".to_string(),
            parameters: Map::new(),
            deletion_policy: DeletionPolicy::Retain,
        };
        assert!(!class.is_default());
    }
}
