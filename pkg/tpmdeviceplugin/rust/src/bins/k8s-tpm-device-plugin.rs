// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tpm_device_plugin::PluginPaths;
use tpm_device_plugin::config::Args;
use tpm_device_plugin::coordinator::Coordinator;
use tpm_device_plugin::device::{AlwaysHealthy, HealthSource};
use tpm_device_plugin::events::NodeEvents;
use tpm_device_plugin::logging;
use tpm_device_plugin::plugin::{Lifecycle, Plugin};
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = logging::init(&args.log_config()) {
        eprintln!("k8s-tpm-device-plugin: {err:#}");
        return ExitCode::FAILURE;
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        num_tpmrm_devices = args.num_tpmrm_devices,
        pass_tpm2tools_tcti_env_var = args.pass_tpm2tools_tcti_env_var,
        "k8s-tpm-device-plugin starting"
    );

    match run(&args).await {
        Ok(()) => {
            info!("k8s-tpm-device-plugin shut down");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "k8s-tpm-device-plugin failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<()> {
    let paths = PluginPaths::default();
    let health: Arc<dyn HealthSource> = Arc::new(AlwaysHealthy);
    let plugins = args
        .device_classes()
        .into_iter()
        .map(|class| Box::new(Plugin::new(class, Arc::clone(&health), &paths)) as Box<dyn Lifecycle>)
        .collect();
    let mut coordinator = Coordinator::new(plugins);

    // Watch before starting so a kubelet restart during startup is not missed.
    let mut events = NodeEvents::new(&paths.kubelet_socket).context("setting up event sources")?;

    if let Err(err) = coordinator.start_all().await {
        coordinator.stop_all().await;
        return Err(err);
    }
    info!("device plugins registered, waiting for events");

    coordinator.run(&mut events).await
}
