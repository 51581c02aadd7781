// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Concrete subsystem construction for the server daemon.

use anyhow::Context;
use bollard::Docker;
use parking_lot::Mutex;
use std::sync::Arc;

use vertice_core::application::deploy_queue::{DeployQueueHandle, DeploydService};
use vertice_core::application::destroy_workflow::DestroyWorkflow;
use vertice_core::application::dns::{DnsService, DnsSettings};
use vertice_core::application::events_relay::EventsdService;
use vertice_core::application::server::ServiceFactory;
use vertice_core::domain::server_config::ServerConfig;
use vertice_core::domain::service::{Service, SubsystemKind};
use vertice_core::infrastructure::docker::DockerService;
use vertice_core::infrastructure::event_bus::EventBus;
use vertice_core::infrastructure::metrics::MetricsService;
use vertice_core::presentation::api::{AppState, HttpdService};

pub struct DaemonServices {
    config: ServerConfig,
    workflow: Arc<DestroyWorkflow>,
    bus: EventBus,
    dns: DnsSettings,
    docker: Option<Docker>,
    version: String,
    // Set when deployd is built; subsystems build in order so httpd sees it
    queue: Mutex<Option<DeployQueueHandle>>,
}

impl DaemonServices {
    pub fn new(
        config: ServerConfig,
        workflow: Arc<DestroyWorkflow>,
        bus: EventBus,
        dns: DnsSettings,
        docker: Option<Docker>,
        version: &str,
    ) -> Self {
        Self {
            config,
            workflow,
            bus,
            dns,
            docker,
            version: version.to_string(),
            queue: Mutex::new(None),
        }
    }
}

impl ServiceFactory for DaemonServices {
    fn build(&self, kind: SubsystemKind) -> anyhow::Result<Box<dyn Service>> {
        let service: Box<dyn Service> = match kind {
            SubsystemKind::Deployd => {
                let deployd = DeploydService::new(self.workflow.clone(), &self.config.deployd);
                *self.queue.lock() = Some(deployd.queue());
                Box::new(deployd)
            }
            SubsystemKind::Httpd => {
                let state = AppState::new(self.workflow.clone(), self.queue.lock().clone(), &self.version)
                    .with_dns(self.dns.clone());
                Box::new(HttpdService::new(self.config.httpd.clone(), Arc::new(state)))
            }
            SubsystemKind::Docker => {
                let docker = self.docker.clone().context("Docker client was not initialised")?;
                Box::new(DockerService::new(docker))
            }
            SubsystemKind::Metricsd => Box::new(MetricsService::new(self.config.metricsd.clone())),
            SubsystemKind::Eventsd => Box::new(EventsdService::new(self.bus.clone())),
            SubsystemKind::Dns => Box::new(DnsService::new(self.config.dns.clone(), self.dns.clone())),
        };
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vertice_core::infrastructure::diagnostics::TracingDiagnostics;
    use vertice_core::infrastructure::log_store::InMemoryLogStore;
    use vertice_core::infrastructure::provisioner_registry::ProvisionerRegistry;
    use vertice_core::infrastructure::repositories::InMemoryResourceGraph;

    fn services(docker: Option<Docker>) -> DaemonServices {
        let workflow = DestroyWorkflow::new(
            Arc::new(ProvisionerRegistry::new()),
            Arc::new(InMemoryResourceGraph::new()),
            Arc::new(InMemoryLogStore::new()),
            Arc::new(TracingDiagnostics::new()),
        );
        DaemonServices::new(
            ServerConfig::default(),
            Arc::new(workflow),
            EventBus::new(8),
            DnsSettings::new(),
            docker,
            "test",
        )
    }

    #[test]
    fn test_builds_every_subsystem_under_its_name() {
        let factory = services(None);
        for kind in SubsystemKind::ALL {
            if kind == SubsystemKind::Docker {
                continue;
            }
            let service = factory.build(kind).unwrap();
            assert_eq!(service.name(), kind.name());
        }
    }

    #[test]
    fn test_deployd_queue_handed_to_httpd() {
        let factory = services(None);
        assert!(factory.queue.lock().is_none());
        factory.build(SubsystemKind::Deployd).unwrap();
        assert!(factory.queue.lock().is_some());
    }

    #[test]
    fn test_docker_requires_client() {
        assert!(services(None).build(SubsystemKind::Docker).is_err());
    }
}
