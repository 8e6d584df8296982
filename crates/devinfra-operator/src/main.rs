//! devinfra Operator - Requirement reconciler with a warm Operation cache

use clap::Parser;
use kube::Client;

use devinfra_common::telemetry::{init_telemetry, TelemetryConfig};
use devinfra_operator::config::{Cli, Commands, ControllerArgs};
use devinfra_operator::controller_runner::build_requirement_controller;
use devinfra_operator::startup::{crd_manifests, ensure_crds_installed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        print!("{}", crd_manifests()?);
        return Ok(());
    }

    init_telemetry(TelemetryConfig::default())?;

    match cli.command {
        Some(Commands::Controller) | None => run_controller(cli.controller).await,
    }
}

async fn run_controller(args: ControllerArgs) -> anyhow::Result<()> {
    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {}", e))?;

    if args.skip_crd_install {
        tracing::info!("CRD installation skipped");
    } else {
        ensure_crds_installed(&client).await?;
    }

    tracing::info!("Starting devinfra controllers:");
    build_requirement_controller(client, &args).await;

    tracing::info!("Shutting down");
    Ok(())
}
