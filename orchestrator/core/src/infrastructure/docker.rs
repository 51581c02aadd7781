// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Docker backend
//!
//! - [`DockerProvisioner`] tears down a box's container: stop with a grace
//!   period, then force-remove. A container Docker no longer knows about
//!   counts as already destroyed.
//! - [`DockerService`] is the `dockerd` subsystem; opening it verifies the
//!   daemon answers a ping so a dead socket fails startup instead of the
//!   first destroy.

use async_trait::async_trait;
use bollard::errors::Error as DockerError;
use bollard::query_parameters::{RemoveContainerOptionsBuilder, StopContainerOptionsBuilder};
use bollard::Docker;
use std::io::Write;
use tracing::{debug, info};

use crate::domain::compute_box::ComputeBox;
use crate::domain::provisioner::{ProvisionError, Provisioner};
use crate::domain::server_config::DockerConfig;
use crate::domain::service::{Service, ServiceError};

pub const DOCKER_PROVIDER: &str = "docker";

/// Connect to the configured socket, or auto-detect the local daemon
pub fn connect(config: &DockerConfig) -> Result<Docker, DockerError> {
    match config.socket_path.as_deref() {
        Some(path) => {
            #[cfg(unix)]
            let docker = Docker::connect_with_unix(path, config.timeout_seconds, bollard::API_DEFAULT_VERSION);

            #[cfg(windows)]
            let docker = Docker::connect_with_named_pipe(path, config.timeout_seconds, bollard::API_DEFAULT_VERSION);

            docker
        }
        None => Docker::connect_with_local_defaults(),
    }
}

fn status_code(error: &DockerError) -> Option<u16> {
    match error {
        DockerError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}

fn classify(error: DockerError) -> ProvisionError {
    match error {
        DockerError::DockerResponseServerError { status_code, message } => {
            ProvisionError::DestroyFailed(format!("docker returned {}: {}", status_code, message))
        }
        other => ProvisionError::Connection(other.to_string()),
    }
}

pub struct DockerProvisioner {
    docker: Docker,
    stop_timeout_seconds: i32,
}

impl DockerProvisioner {
    pub fn new(docker: Docker, stop_timeout_seconds: i32) -> Self {
        Self {
            docker,
            stop_timeout_seconds,
        }
    }

    pub fn from_config(config: &DockerConfig) -> Result<Self, ProvisionError> {
        let docker = connect(config).map_err(|e| ProvisionError::Connection(e.to_string()))?;
        Ok(Self::new(docker, config.stop_timeout_seconds))
    }
}

#[async_trait]
impl Provisioner for DockerProvisioner {
    fn provider(&self) -> &str {
        DOCKER_PROVIDER
    }

    async fn destroy(
        &self,
        target: &ComputeBox,
        output: &mut (dyn Write + Send),
    ) -> Result<(), ProvisionError> {
        let container = target.instance_ref();

        writeln!(output, "stopping container {} ({}s grace)", container, self.stop_timeout_seconds)?;
        let stop = StopContainerOptionsBuilder::default()
            .t(self.stop_timeout_seconds)
            .build();
        match self.docker.stop_container(&container, Some(stop)).await {
            Ok(()) => writeln!(output, "container {} stopped", container)?,
            // 304: already stopped
            Err(e) if status_code(&e) == Some(304) => {
                writeln!(output, "container {} was not running", container)?
            }
            Err(e) if status_code(&e) == Some(404) => {
                writeln!(output, "container {} not found, nothing to destroy", container)?;
                info!(container = %container, "Container already gone");
                return Ok(());
            }
            Err(e) => return Err(classify(e)),
        }

        writeln!(output, "removing container {}", container)?;
        let remove = RemoveContainerOptionsBuilder::default().force(true).v(true).build();
        match self.docker.remove_container(&container, Some(remove)).await {
            Ok(()) => {}
            Err(e) if status_code(&e) == Some(404) => {
                debug!(container = %container, "Container vanished before removal");
            }
            Err(e) => return Err(classify(e)),
        }

        writeln!(output, "container {} removed", container)?;
        info!(container = %container, box_id = %target.id, "Destroyed container");
        Ok(())
    }
}

pub struct DockerService {
    docker: Docker,
}

impl DockerService {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl Service for DockerService {
    fn name(&self) -> &str {
        "dockerd"
    }

    async fn open(&self) -> Result<(), ServiceError> {
        self.docker.ping().await.map_err(|e| {
            ServiceError::Unavailable(format!(
                "cannot reach Docker daemon: {}. Check that Docker is running and the socket path is correct",
                e
            ))
        })?;
        info!("Docker daemon reachable");
        Ok(())
    }

    async fn close(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
