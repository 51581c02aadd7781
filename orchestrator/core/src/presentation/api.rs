// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP Daemon
//!
//! Exposes the destroy workflow over HTTP:
//!
//! - `GET  /health` - liveness, version, uptime, registered providers and
//!   the active DNS zone
//! - `POST /boxes/destroy` - destroy a box synchronously
//! - `POST /boxes/destroy/queue` - hand a box to the deploy daemon
//!
//! [`HttpdService`] binds the listener on open (a bind failure fails server
//! startup) and shuts the server down gracefully on close.

use async_trait::async_trait;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::application::deploy_queue::{DeployQueueHandle, QueueError};
use crate::application::destroy_workflow::{DestroyError, DestroyWorkflow};
use crate::application::dns::DnsSettings;
use crate::domain::compute_box::DestroyRequest;
use crate::domain::server_config::HttpdConfig;
use crate::domain::service::{Service, ServiceError};

pub struct AppState {
    pub workflow: Arc<DestroyWorkflow>,
    /// Absent when the deploy daemon is disabled
    pub queue: Option<DeployQueueHandle>,
    pub dns: DnsSettings,
    pub version: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(workflow: Arc<DestroyWorkflow>, queue: Option<DeployQueueHandle>, version: &str) -> Self {
        Self {
            workflow,
            queue,
            dns: DnsSettings::new(),
            version: version.to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn with_dns(mut self, dns: DnsSettings) -> Self {
        self.dns = dns;
        self
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/boxes/destroy", post(destroy_handler))
        .route("/boxes/destroy/queue", post(enqueue_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "version": state.version,
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "providers": state.workflow.registry().providers(),
        "queue_pending": state.queue.as_ref().map(DeployQueueHandle::pending),
        "dns": state.dns.current().map(|dns| json!({ "provider": dns.provider, "zone": dns.zone })),
    }))
}

async fn destroy_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DestroyRequest>,
) -> (StatusCode, Json<Value>) {
    let box_id = request.target.id.clone();

    match state.workflow.destroy(request).await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "box_id": box_id, "status": "destroyed" })),
        ),
        Err(e) => {
            let status = match &e {
                DestroyError::UnknownProvider(_) => StatusCode::NOT_FOUND,
                DestroyError::AlreadyInProgress(_) => StatusCode::CONFLICT,
                DestroyError::Provisioner(_) => StatusCode::BAD_GATEWAY,
                DestroyError::Aborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(json!({ "box_id": box_id, "error": e.to_string() })))
        }
    }
}

async fn enqueue_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DestroyRequest>,
) -> (StatusCode, Json<Value>) {
    let box_id = request.target.id.clone();

    let Some(queue) = &state.queue else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "box_id": box_id, "error": "deploy daemon is disabled" })),
        );
    };

    match queue.enqueue(request) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(json!({ "box_id": box_id, "status": "queued" })),
        ),
        Err(e @ (QueueError::Full | QueueError::Closed)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "box_id": box_id, "error": e.to_string() })),
        ),
    }
}

struct Running {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
    local_addr: SocketAddr,
}

pub struct HttpdService {
    config: HttpdConfig,
    state: Arc<AppState>,
    running: Mutex<Option<Running>>,
    error_tx: mpsc::Sender<ServiceError>,
    error_rx: Mutex<Option<mpsc::Receiver<ServiceError>>>,
}

impl HttpdService {
    pub fn new(config: HttpdConfig, state: Arc<AppState>) -> Self {
        let (error_tx, error_rx) = mpsc::channel(4);
        Self {
            config,
            state,
            running: Mutex::new(None),
            error_tx,
            error_rx: Mutex::new(Some(error_rx)),
        }
    }

    /// Address actually bound, once open
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().as_ref().map(|r| r.local_addr)
    }
}

#[async_trait]
impl Service for HttpdService {
    fn name(&self) -> &str {
        "httpd"
    }

    async fn open(&self) -> Result<(), ServiceError> {
        if self.running.lock().is_some() {
            return Err(ServiceError::AlreadyOpen);
        }

        let addr = self.config.bind_address.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServiceError::Bind { addr: addr.clone(), source })?;
        let local_addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let router = app(self.state.clone());
        let errors = self.error_tx.clone();
        let signal = shutdown.clone().cancelled_owned();

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(signal).await {
                warn!("HTTP server failed: {}", e);
                let _ = errors.try_send(ServiceError::Io(e));
            }
        });

        info!("HTTP daemon listening on {}", local_addr);
        *self.running.lock() = Some(Running {
            shutdown,
            handle,
            local_addr,
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), ServiceError> {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return Ok(());
        };

        running.shutdown.cancel();
        running
            .handle
            .await
            .map_err(|e| ServiceError::Runtime(format!("HTTP server task failed: {}", e)))?;
        info!("HTTP daemon stopped");
        Ok(())
    }

    fn take_errors(&self) -> Option<mpsc::Receiver<ServiceError>> {
        self.error_rx.lock().take()
    }
}
