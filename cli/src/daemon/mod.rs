// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Server daemon
//!
//! Handles:
//! - Wiring the destroy workflow and provisioners from configuration
//! - Opening the server and logging service faults while it runs
//! - Graceful shutdown on Ctrl-C / SIGTERM

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use vertice_core::application::destroy_workflow::DestroyWorkflow;
use vertice_core::application::dns::DnsSettings;
use vertice_core::application::server::Server;
use vertice_core::domain::server_config::ServerConfigManifest;
use vertice_core::infrastructure::diagnostics::TracingDiagnostics;
use vertice_core::infrastructure::docker::{self, DockerProvisioner};
use vertice_core::infrastructure::event_bus::EventBus;
use vertice_core::infrastructure::log_store::FileLogStore;
use vertice_core::infrastructure::provisioner_registry::ProvisionerRegistry;
use vertice_core::infrastructure::repositories::InMemoryResourceGraph;

mod services;

use services::DaemonServices;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub async fn start_server(manifest: ServerConfigManifest) -> Result<()> {
    manifest
        .validate()
        .context("Configuration validation failed")?;

    let config = &manifest.spec;
    info!(name = %manifest.metadata.name, version = VERSION, "Vertice server starting");

    let bus = EventBus::new(config.eventsd.channel_capacity);

    let mut registry = ProvisionerRegistry::new();
    let docker_client = if config.docker.enabled {
        let client = docker::connect(&config.docker).context("Failed to connect to Docker")?;
        registry.register(Arc::new(DockerProvisioner::new(
            client.clone(),
            config.docker.stop_timeout_seconds,
        )));
        Some(client)
    } else {
        None
    };
    if registry.is_empty() {
        warn!("No provisioners registered, every destroy will fail with an unknown provider");
    }

    let workflow = DestroyWorkflow::new(
        Arc::new(registry),
        Arc::new(InMemoryResourceGraph::new()),
        Arc::new(FileLogStore::new(&config.logs.dir)),
        Arc::new(TracingDiagnostics::new()),
    )
    .with_events(Arc::new(bus.clone()));

    let factory = DaemonServices::new(
        config.clone(),
        Arc::new(workflow),
        bus,
        DnsSettings::new(),
        docker_client,
        VERSION,
    );

    let server = Server::new(config, &factory, VERSION)?;
    let faults = server.errors();

    server.open().await.context("Failed to start server")?;

    let fault_logger = faults.map(|mut faults| {
        tokio::spawn(async move {
            while let Some(fault) = faults.recv().await {
                error!(service = %fault.service, "Service fault: {}", fault.error);
            }
        })
    });

    let signal_result = shutdown_signal().await;

    info!("Server shutting down");
    server.close().await;
    if let Some(handle) = fault_logger {
        handle.abort();
    }

    signal_result
}

async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    #[cfg(unix)]
    let terminate = async move {
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = signal::ctrl_c() => {
            result.context("Failed to install Ctrl+C handler")?;
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    Ok(())
}
