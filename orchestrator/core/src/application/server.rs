// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Server Lifecycle Orchestrator
//!
//! Owns the configured subsystems and drives them through one lifecycle:
//!
//! ```text
//! Closed --open()--> Opening --all opened--> Open --close()--> ShutDown
//!                       |
//!                       +--first failure--> close() everything --> ShutDown
//! ```
//!
//! Services open sequentially in the fixed subsystem order and close in the
//! same order. Errors raised by a running service after open are funnelled
//! into one fan-in channel handed out by [`Server::errors`].
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Subsystem composition, startup unwind and shutdown

use anyhow::Context;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::server_config::{ProfilingConfig, ServerConfig};
use crate::domain::service::{Service, ServiceError, ServiceFault, SubsystemKind};
use crate::infrastructure::profiling::{ProfileError, ProfileSession};

const FAULT_CHANNEL_CAPACITY: usize = 64;

/// Builds the concrete service for an enabled subsystem
pub trait ServiceFactory: Send + Sync {
    fn build(&self, kind: SubsystemKind) -> anyhow::Result<Box<dyn Service>>;
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to open {service} service: {source}")]
    OpenService {
        service: String,
        #[source]
        source: ServiceError,
    },

    #[error("Server is already open")]
    AlreadyOpen,

    #[error("Server has been shut down")]
    ShutDown,

    #[error(transparent)]
    Profiling(#[from] ProfileError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Closed,
    Opening,
    Open,
    ShutDown,
}

pub struct Server {
    version: String,
    services: Vec<Arc<dyn Service>>,
    profiling: ProfilingConfig,
    profile: Mutex<Option<ProfileSession>>,
    state: Mutex<ServerState>,
    closed: AtomicBool,
    closing: CancellationToken,
    fault_tx: mpsc::Sender<ServiceFault>,
    fault_rx: Mutex<Option<mpsc::Receiver<ServiceFault>>>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
}

impl Server {
    /// Instantiate every enabled subsystem, in the fixed subsystem order
    pub fn new(config: &ServerConfig, factory: &dyn ServiceFactory, version: &str) -> anyhow::Result<Self> {
        let mut services: Vec<Arc<dyn Service>> = Vec::new();

        for kind in SubsystemKind::ALL {
            if !config.is_enabled(kind) {
                warn!("skip {} service", kind);
                continue;
            }
            let service = factory
                .build(kind)
                .with_context(|| format!("failed to build {} service", kind))?;
            services.push(Arc::from(service));
        }

        Ok(Self::with_services(services, config.profiling.clone(), version))
    }

    /// Compose a server from an explicit, ordered list of services
    pub fn with_services(services: Vec<Arc<dyn Service>>, profiling: ProfilingConfig, version: &str) -> Self {
        let (fault_tx, fault_rx) = mpsc::channel(FAULT_CHANNEL_CAPACITY);

        Self {
            version: version.to_string(),
            services,
            profiling,
            profile: Mutex::new(None),
            state: Mutex::new(ServerState::Closed),
            closed: AtomicBool::new(false),
            closing: CancellationToken::new(),
            fault_tx,
            fault_rx: Mutex::new(Some(fault_rx)),
            forwarders: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> ServerState {
        *self.state.lock()
    }

    pub fn service_names(&self) -> Vec<String> {
        self.services.iter().map(|s| s.name().to_string()).collect()
    }

    /// Fires once the server starts closing
    pub fn closing_token(&self) -> CancellationToken {
        self.closing.clone()
    }

    /// The fan-in receiver of runtime service faults. Only the first call gets it.
    pub fn errors(&self) -> Option<mpsc::Receiver<ServiceFault>> {
        self.fault_rx.lock().take()
    }

    pub async fn open(&self) -> Result<(), ServerError> {
        {
            let mut state = self.state.lock();
            match *state {
                ServerState::Closed => *state = ServerState::Opening,
                ServerState::ShutDown => return Err(ServerError::ShutDown),
                ServerState::Opening | ServerState::Open => return Err(ServerError::AlreadyOpen),
            }
        }

        match ProfileSession::start(&self.profiling) {
            Ok(session) => *self.profile.lock() = session,
            Err(e) => {
                *self.state.lock() = ServerState::Closed;
                return Err(e.into());
            }
        }

        for service in &self.services {
            info!("opening {} service", service.name());

            if let Err(e) = service.open().await {
                error!("Failed to open {} service: {}", service.name(), e);
                self.close().await;
                return Err(ServerError::OpenService {
                    service: service.name().to_string(),
                    source: e,
                });
            }

            if let Some(errors) = service.take_errors() {
                self.spawn_forwarder(service.name().to_string(), errors);
            }
        }

        *self.state.lock() = ServerState::Open;
        info!(version = %self.version, services = self.services.len(), "engine up");
        Ok(())
    }

    /// Stop profiling and close every service. Safe to call more than once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Server already closed");
            return;
        }
        *self.state.lock() = ServerState::ShutDown;

        let session = self.profile.lock().take();
        if let Some(session) = session {
            if let Err(e) = session.stop() {
                warn!("Failed to write profiles: {}", e);
            }
        }

        for service in &self.services {
            debug!("closing {} service", service.name());
            if let Err(e) = service.close().await {
                warn!("Failed to close {} service: {}", service.name(), e);
            }
        }

        self.closing.cancel();

        let forwarders = std::mem::take(&mut *self.forwarders.lock());
        for forwarder in forwarders {
            let _ = forwarder.await;
        }

        info!("engine down");
    }

    fn spawn_forwarder(&self, service: String, mut errors: mpsc::Receiver<ServiceError>) {
        let faults = self.fault_tx.clone();
        let closing = self.closing.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = closing.cancelled() => break,
                    received = errors.recv() => {
                        let Some(error) = received else {
                            break;
                        };
                        let fault = ServiceFault {
                            service: service.clone(),
                            error,
                        };
                        match faults.try_send(fault) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(fault)) => {
                                warn!("Fault channel full, dropping: {}", fault);
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => break,
                        }
                    }
                }
            }
            debug!("{} fault forwarder stopped", service);
        });

        self.forwarders.lock().push(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NoopService(&'static str);

    #[async_trait]
    impl Service for NoopService {
        fn name(&self) -> &str {
            self.0
        }

        async fn open(&self) -> Result<(), ServiceError> {
            Ok(())
        }

        async fn close(&self) -> Result<(), ServiceError> {
            Ok(())
        }
    }

    struct NoopFactory;

    impl ServiceFactory for NoopFactory {
        fn build(&self, kind: SubsystemKind) -> anyhow::Result<Box<dyn Service>> {
            Ok(Box::new(NoopService(kind.name())))
        }
    }

    #[test]
    fn test_disabled_subsystems_are_never_built() {
        let mut config = ServerConfig::default();
        config.httpd.enabled = false;
        config.eventsd.enabled = false;
        config.docker.enabled = true;

        let server = Server::new(&config, &NoopFactory, "test").unwrap();
        assert_eq!(server.service_names(), vec!["deployd", "dockerd"]);
        assert_eq!(server.state(), ServerState::Closed);
    }

    #[tokio::test]
    async fn test_cannot_reopen_after_close() {
        let server = Server::with_services(
            vec![Arc::new(NoopService("httpd"))],
            ProfilingConfig::default(),
            "test",
        );

        server.open().await.unwrap();
        assert!(matches!(server.open().await, Err(ServerError::AlreadyOpen)));

        server.close().await;
        assert_eq!(server.state(), ServerState::ShutDown);
        assert!(matches!(server.open().await, Err(ServerError::ShutDown)));
        assert!(server.closing_token().is_cancelled());
    }

    #[test]
    fn test_errors_handed_out_once() {
        let server = Server::with_services(Vec::new(), ProfilingConfig::default(), "test");
        assert!(server.errors().is_some());
        assert!(server.errors().is_none());
    }
}
