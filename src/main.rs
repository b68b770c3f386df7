//! Common controller entry point (spec §4.3-§4.8): binds `VolumeSnapshot` to
//! `VolumeSnapshotContent`, resolves classes, and dispatches dynamic
//! provisioning. Carries no backend RPC traffic itself — that's the sidecar
//! binary's job — so it runs with the unwired CSI client.

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

    info!("Starting csi-snapshot-controller v{}", env!("CARGO_PKG_VERSION"));

    let client = kube::Client::try_default().await.map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    let timeout = config.timeout;
    let handler = Arc::new(GrpcSnapshotHandler::new(UnimplementedCsiClient, timeout));
    let ctx = Context::new(client, config, handler, "csi-snapshot-controller");

    controller::run_common_controller(ctx).await;

    telemetry::shutdown_telemetry();
    Ok(())
}
