// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Events Daemon
//!
//! Follows the lifecycle event bus for as long as the server is open: every
//! event is logged and counted per action and type. A receiver that falls
//! behind the bus loses events; each such gap is reported as a service fault.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::service::{Service, ServiceError};
use crate::infrastructure::event_bus::{EventBus, EventBusError, EventReceiver};

struct Running {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct EventsdService {
    bus: EventBus,
    seen: Arc<AtomicU64>,
    running: Mutex<Option<Running>>,
    error_tx: mpsc::Sender<ServiceError>,
    error_rx: Mutex<Option<mpsc::Receiver<ServiceError>>>,
}

impl EventsdService {
    pub fn new(bus: EventBus) -> Self {
        let (error_tx, error_rx) = mpsc::channel(16);
        Self {
            bus,
            seen: Arc::new(AtomicU64::new(0)),
            running: Mutex::new(None),
            error_tx,
            error_rx: Mutex::new(Some(error_rx)),
        }
    }

    /// Events observed since the service was created
    pub fn events_seen(&self) -> u64 {
        self.seen.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Service for EventsdService {
    fn name(&self) -> &str {
        "eventsd"
    }

    async fn open(&self) -> Result<(), ServiceError> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Err(ServiceError::AlreadyOpen);
        }

        let receiver = self.bus.subscribe();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(relay(
            receiver,
            shutdown.clone(),
            self.seen.clone(),
            self.error_tx.clone(),
        ));

        *running = Some(Running { shutdown, handle });
        info!("Events daemon subscribed to lifecycle events");
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
            .map_err(|e| ServiceError::Runtime(format!("events relay task failed: {}", e)))
    }

    fn take_errors(&self) -> Option<mpsc::Receiver<ServiceError>> {
        self.error_rx.lock().take()
    }
}

async fn relay(
    mut receiver: EventReceiver,
    shutdown: CancellationToken,
    seen: Arc<AtomicU64>,
    errors: mpsc::Sender<ServiceError>,
) {
    loop {
        let received = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = receiver.recv() => received,
        };

        match received {
            Ok(event) => {
                seen.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(
                    "vertice_lifecycle_events_total",
                    "action" => event.action.as_str(),
                    "type" => event.event_type.as_str()
                )
                .increment(1);
                info!(
                    action = event.action.as_str(),
                    event_type = event.event_type.as_str(),
                    attributes = ?event.attributes,
                    "Lifecycle event {}",
                    event
                );
            }
            Err(EventBusError::Lagged(missed)) => {
                let error = ServiceError::Runtime(format!("event relay lagged, {} events dropped", missed));
                if errors.try_send(error).is_err() {
                    warn!("Could not report event relay lag of {} events", missed);
                }
            }
            Err(EventBusError::Closed) => {
                debug!("Event bus closed, stopping relay");
                break;
            }
            Err(EventBusError::Empty) => {}
        }
    }
}
