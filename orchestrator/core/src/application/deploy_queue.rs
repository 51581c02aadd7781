// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Deploy Daemon
//!
//! Accepts destroy requests on a bounded queue and runs them through the
//! [`DestroyWorkflow`] in the background, at most `max_concurrent_destroys`
//! at a time. Failed destroys are reported on the service's error channel,
//! which the server fans in with every other service fault.
//!
//! Requests still queued when the daemon closes are dropped; destroys already
//! dispatched run to completion before `close` returns.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::destroy_workflow::DestroyWorkflow;
use crate::domain::compute_box::DestroyRequest;
use crate::domain::server_config::DeploydConfig;
use crate::domain::service::{Service, ServiceError};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Deploy queue is full")]
    Full,

    #[error("Deploy queue is closed")]
    Closed,
}

/// Producer side of the deploy queue
#[derive(Clone)]
pub struct DeployQueueHandle {
    sender: mpsc::Sender<DestroyRequest>,
}

impl DeployQueueHandle {
    /// Queue a destroy without waiting for room
    pub fn enqueue(&self, request: DestroyRequest) -> Result<(), QueueError> {
        self.sender.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    pub fn pending(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }
}

struct Running {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct DeploydService {
    workflow: Arc<DestroyWorkflow>,
    max_concurrent: usize,
    handle: DeployQueueHandle,
    receiver: Mutex<Option<mpsc::Receiver<DestroyRequest>>>,
    running: Mutex<Option<Running>>,
    error_tx: mpsc::Sender<ServiceError>,
    error_rx: Mutex<Option<mpsc::Receiver<ServiceError>>>,
}

impl DeploydService {
    pub fn new(workflow: Arc<DestroyWorkflow>, config: &DeploydConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (error_tx, error_rx) = mpsc::channel(64);

        Self {
            workflow,
            max_concurrent: config.max_concurrent_destroys.max(1),
            handle: DeployQueueHandle { sender },
            receiver: Mutex::new(Some(receiver)),
            running: Mutex::new(None),
            error_tx,
            error_rx: Mutex::new(Some(error_rx)),
        }
    }

    pub fn queue(&self) -> DeployQueueHandle {
        self.handle.clone()
    }
}

#[async_trait]
impl Service for DeploydService {
    fn name(&self) -> &str {
        "deployd"
    }

    async fn open(&self) -> Result<(), ServiceError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(ServiceError::AlreadyOpen);
        }
        let receiver = self
            .receiver
            .lock()
            .take()
            .ok_or_else(|| ServiceError::Unavailable("deploy queue already drained".to_string()))?;

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_worker(
            self.workflow.clone(),
            receiver,
            Arc::new(Semaphore::new(self.max_concurrent)),
            shutdown.clone(),
            self.error_tx.clone(),
        ));

        *running = Some(Running { shutdown, handle });
        info!(max_concurrent = self.max_concurrent, "Deploy daemon started");
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
            .map_err(|e| ServiceError::Runtime(format!("deploy worker failed: {}", e)))
    }

    fn take_errors(&self) -> Option<mpsc::Receiver<ServiceError>> {
        self.error_rx.lock().take()
    }
}

async fn run_worker(
    workflow: Arc<DestroyWorkflow>,
    mut receiver: mpsc::Receiver<DestroyRequest>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    errors: mpsc::Sender<ServiceError>,
) {
    let mut tasks = JoinSet::new();

    loop {
        let request = tokio::select! {
            _ = shutdown.cancelled() => break,
            request = receiver.recv() => match request {
                Some(request) => request,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        while tasks.try_join_next().is_some() {}

        let workflow = workflow.clone();
        let errors = errors.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let box_id = request.target.id.clone();
            debug!(box_id = %box_id, "Dispatching queued destroy");

            if let Err(e) = workflow.destroy(request).await {
                let error = ServiceError::Runtime(format!("destroy of box {} failed: {}", box_id, e));
                if errors.try_send(error).is_err() {
                    warn!(box_id = %box_id, "Could not report failed destroy: {}", e);
                }
            }
        });
    }

    receiver.close();
    let mut dropped = 0usize;
    while receiver.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        warn!(dropped, "Deploy daemon closing with queued destroys, dropping them");
    }

    while tasks.join_next().await.is_some() {}
    info!("Deploy daemon stopped");
}
