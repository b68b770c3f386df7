//! Crate-wide error taxonomy.
//!
//! Variant names mirror the error kinds enumerated in the design (store CAS
//! loss, malformed resource versions, secret template problems, binding
//! invariant violations, scheduler gating, backend RPC classification). Most
//! reconciliation code returns `Result<T>` and lets the controller's
//! `error_policy` turn an `Err` into a requeue with backoff.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Kube Error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Finalizer Error: {0}")]
    FinalizerError(#[source] Box<kube::runtime::finalizer::Error<Error>>),

    #[error("SerializationError: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("cached resourceVersion is not a base-10 integer: {0:?}")]
    VersionParseError(String),

    #[error("object store returned a stale or conflicting resourceVersion for {0}")]
    VersionConflict(String),

    #[error("object {0} not found")]
    NotFound(String),

    #[error("controller failed to persist an update for {0}: {1}")]
    ControllerUpdateFailed(String, String),

    #[error("VolumeSnapshotContent {0} has an empty snapshot reference name")]
    ContentNotBound(String),

    #[error("binding mismatch: {0}")]
    BindMismatch(String),

    #[error("secret parameters incomplete: {0}")]
    SecretParamIncomplete(String),

    #[error("secret name/namespace template references unrecognized tokens: {0:?}")]
    SecretTemplateInvalidToken(Vec<String>),

    #[error("resolved secret {kind} {value:?} is not a valid DNS-1123 {rule}")]
    InvalidSecretName {
        kind: &'static str,
        value: String,
        rule: &'static str,
    },

    #[error("secret {namespace}/{name} not found")]
    SecretNotFound { namespace: String, name: String },

    #[error("operation {0} is already running")]
    AlreadyRunning(String),

    #[error("operation {0} is in its backoff window")]
    Backoff(String),

    #[error("backend call failed transiently: {0}")]
    BackendTransient(String),

    #[error("backend call failed terminally: {0}")]
    BackendTerminal(String),

    #[error("volume snapshot class {0} not found")]
    ClassNotFound(String),

    #[error("no default volume snapshot class found for driver {0}")]
    NoDefaultClass(String),

    #[error("ambiguous default volume snapshot classes for driver {0}: {1:?}")]
    AmbiguousDefaultClass(String, Vec<String>),

    #[error("source PVC {0} is not bound to a PersistentVolume")]
    PvcNotBound(String),

    #[error("backend driver {actual:?} does not match volume snapshot class driver {expected:?}")]
    DriverMismatch { expected: String, actual: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Lowercased variant name, used as a metrics/event label.
    pub fn metric_label(&self) -> String {
        match self {
            Error::KubeError(_) => "kube_error",
            Error::FinalizerError(_) => "finalizer_error",
            Error::SerializationError(_) => "serialization_error",
            Error::VersionParseError(_) => "version_parse_error",
            Error::VersionConflict(_) => "version_conflict",
            Error::NotFound(_) => "not_found",
            Error::ControllerUpdateFailed(..) => "controller_update_failed",
            Error::ContentNotBound(_) => "content_not_bound",
            Error::BindMismatch(_) => "bind_mismatch",
            Error::SecretParamIncomplete(_) => "secret_param_incomplete",
            Error::SecretTemplateInvalidToken(_) => "secret_template_invalid_token",
            Error::InvalidSecretName { .. } => "invalid_secret_name",
            Error::SecretNotFound { .. } => "secret_not_found",
            Error::AlreadyRunning(_) => "already_running",
            Error::Backoff(_) => "backoff",
            Error::BackendTransient(_) => "backend_transient",
            Error::BackendTerminal(_) => "backend_terminal",
            Error::ClassNotFound(_) => "class_not_found",
            Error::NoDefaultClass(_) => "no_default_class",
            Error::AmbiguousDefaultClass(..) => "ambiguous_default_class",
            Error::PvcNotBound(_) => "pvc_not_bound",
            Error::DriverMismatch { .. } => "driver_mismatch",
            Error::InvalidConfig(_) => "invalid_config",
            Error::Other(_) => "other",
        }
        .to_string()
    }

    /// True for the one permanent-failure kind that the dynamic-create path
    /// is allowed to auto-retry (see spec §4.4.2 / §7).
    pub fn is_controller_update_failed(&self) -> bool {
        matches!(self, Error::ControllerUpdateFailed(..))
    }

    /// True only for a terminal gRPC failure from the backend. Everything
    /// else — a transient gRPC error, or a non-gRPC error like a Kubernetes
    /// API hiccup or a secret lookup failure — means the in-flight create
    /// may still be running on the backend, so the `BeingCreated` sentinel
    /// must stay set until a later status probe resolves it.
    pub fn clears_being_created_sentinel(&self) -> bool {
        matches!(self, Error::BackendTerminal(_))
    }
}
