//! Driver-scoped sidecar entry point (spec §4.9-§4.11, §4.13): drives the
//! CSI backend for `VolumeSnapshotContent` and `VolumeGroupSnapshotContent`
//! objects whose driver matches `--csi-driver-name`. Both loops share one
//! `Context` and run concurrently in this process, the way a CSI driver's
//! snapshotter sidecar container watches both kinds side by side.

use std::sync::Arc;

use clap::Parser;
use csi_snapshotter::controller::{self, Context};
use csi_snapshotter::handler::grpc::{GrpcSnapshotHandler, UnimplementedCsiClient};
use csi_snapshotter::{config::Config, telemetry, Error};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::parse();

    let env_filter = EnvFilter::builder().with_default_directive(Level::INFO.into()).from_env_lossy();
    let fmt_layer = fmt::layer().with_target(true);
    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    let otel_enabled = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").is_ok();
    if otel_enabled {
        let otel_layer = telemetry::init_telemetry(&registry);
        registry.with(otel_layer).init();
        info!("OpenTelemetry tracing initialized");
    } else {
        registry.init();
    }

    if config.driver_name.is_empty() {
        tracing::warn!("--csi-driver-name is empty; sidecar will not match any content");
    }
    info!(driver = %config.driver_name, "Starting csi-snapshot-sidecar v{}", env!("CARGO_PKG_VERSION"));

    let client = kube::Client::try_default().await.map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    let timeout = config.timeout;
    let handler = Arc::new(GrpcSnapshotHandler::new(UnimplementedCsiClient, timeout));
    let ctx = Context::new(client, config, handler, "csi-snapshot-sidecar");

    tokio::join!(
        controller::run_sidecar_controller(ctx.clone()),
        controller::run_group_controller(ctx),
    );

    telemetry::shutdown_telemetry();
    Ok(())
}
