//! Control-plane reconciliation for CSI `VolumeSnapshot`/`VolumeSnapshotContent`:
//! the common controller (binding, classing, create/delete dispatch), the
//! driver-scoped sidecar that talks to the backend over gRPC, the group-
//! snapshot extensions, and the conversion/admission webhook.

pub mod config;
pub mod controller;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod scheduler;
pub mod secret;
pub mod store;
pub mod telemetry;
pub mod types;

#[cfg(feature = "webhook")]
pub mod webhook;

pub use error::Error;
