//! Data-model patch/update utilities: the version-aware cache store (§4.1)
//! and the JSON-patch emission helpers that implement the "idempotent
//! patch" rule (§4.10 step 6, §9).

pub mod cache;
pub mod patch;

pub use cache::VersionedCache;
pub use patch::{annotation_patch, status_patch};

/// Build the `<namespace>/<name>` cache key for a namespaced object, or
/// just `<name>` for a cluster-scoped one.
pub fn object_key(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) => format!("{ns}/{name}"),
        None => name.to_string(),
    }
}
