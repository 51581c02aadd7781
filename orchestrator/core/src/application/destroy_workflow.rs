// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Destroy Workflow Application Service
//!
//! Tears down a single compute box end to end:
//!
//! 1. Dispatch to the provisioner registered for the box's provider, with all
//!    provisioner output captured in memory and streamed to the box log.
//! 2. Record diagnostics for the attempt, whatever the outcome.
//! 3. Only when the provisioner succeeded, cascade through the resource
//!    graph (assembly, leaf component, parent cartons collection) and publish
//!    a `Destroy` lifecycle event.
//!
//! Diagnostics, graph and event failures are logged and counted; the caller
//! only ever sees the provisioner's own error.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Orchestrates provisioner dispatch and resource graph cleanup

use dashmap::DashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::log_sink::{FanOutWriter, LogSink};
use crate::domain::box_log::{BoxLogStore, DestroyRecord, DiagnosticsRecorder};
use crate::domain::compute_box::{BoxId, CartonId, ComputeBox, DestroyRequest};
use crate::domain::events::{EventAction, EventPublisher, EventType, LifecycleEvent};
use crate::domain::provisioner::ProvisionError;
use crate::domain::resource_graph::ResourceGraph;
use crate::infrastructure::provisioner_registry::ProvisionerRegistry;

#[derive(Debug, Error)]
pub enum DestroyError {
    #[error("No provisioner registered for provider '{0}'")]
    UnknownProvider(String),

    #[error("Box {0} is already being destroyed")]
    AlreadyInProgress(BoxId),

    #[error(transparent)]
    Provisioner(#[from] ProvisionError),

    #[error("Destroy task aborted: {0}")]
    Aborted(#[from] tokio::task::JoinError),
}

pub struct DestroyWorkflow {
    registry: Arc<ProvisionerRegistry>,
    graph: Arc<dyn ResourceGraph>,
    log_store: Arc<dyn BoxLogStore>,
    diagnostics: Arc<dyn DiagnosticsRecorder>,
    events: Option<Arc<dyn EventPublisher>>,
    in_flight: Arc<DashSet<BoxId>>,
}

/// Releases a box's in-flight slot on every exit path
struct InFlightGuard {
    in_flight: Arc<DashSet<BoxId>>,
    box_id: BoxId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.box_id);
    }
}

/// Owned handles for one teardown, moved onto its own task
struct Teardown {
    registry: Arc<ProvisionerRegistry>,
    graph: Arc<dyn ResourceGraph>,
    log_store: Arc<dyn BoxLogStore>,
    diagnostics: Arc<dyn DiagnosticsRecorder>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl DestroyWorkflow {
    pub fn new(
        registry: Arc<ProvisionerRegistry>,
        graph: Arc<dyn ResourceGraph>,
        log_store: Arc<dyn BoxLogStore>,
        diagnostics: Arc<dyn DiagnosticsRecorder>,
    ) -> Self {
        Self {
            registry,
            graph,
            log_store,
            diagnostics,
            events: None,
            in_flight: Arc::new(DashSet::new()),
        }
    }

    /// Publish a lifecycle event after each successful teardown
    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn registry(&self) -> &ProvisionerRegistry {
        &self.registry
    }

    pub fn is_in_flight(&self, box_id: &BoxId) -> bool {
        self.in_flight.contains(box_id)
    }

    /// Runs the teardown on a detached task. Dropping the returned future
    /// does not interrupt the provisioner; diagnostics and the cascade still
    /// happen and the in-flight slot is released when the task finishes.
    pub async fn destroy(&self, request: DestroyRequest) -> Result<(), DestroyError> {
        let target = request.target;

        if !self.in_flight.insert(target.id.clone()) {
            return Err(DestroyError::AlreadyInProgress(target.id));
        }
        let guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
            box_id: target.id.clone(),
        };

        let teardown = Teardown {
            registry: self.registry.clone(),
            graph: self.graph.clone(),
            log_store: self.log_store.clone(),
            diagnostics: self.diagnostics.clone(),
            events: self.events.clone(),
        };

        tokio::spawn(async move {
            let _guard = guard;
            teardown.run(target).await
        })
        .await?
    }
}

impl Teardown {
    async fn run(self, target: ComputeBox) -> Result<(), DestroyError> {
        let started = Instant::now();
        let sink = LogSink::start(self.log_store.clone(), &target);
        let mut output = FanOutWriter::new(sink.writer());

        let result = match self.registry.lookup(&target.provider) {
            Some(provisioner) => provisioner
                .destroy(&target, &mut output)
                .await
                .map_err(DestroyError::from),
            None => Err(DestroyError::UnknownProvider(target.provider.clone())),
        };

        let elapsed = started.elapsed();
        sink.close().await;

        let record = DestroyRecord::new(
            &target,
            output.captured(),
            elapsed,
            result.as_ref().err().map(ToString::to_string),
        );
        if let Err(e) = self.diagnostics.record(&record).await {
            metrics::counter!("vertice_destroy_record_failures_total").increment(1);
            warn!(box_id = %target.id, "Failed to record destroy diagnostics: {}", e);
        }

        let outcome = if result.is_ok() { "success" } else { "failure" };
        metrics::counter!(
            "vertice_box_destroy_total",
            "provider" => target.provider.clone(),
            "outcome" => outcome
        )
        .increment(1);

        match &result {
            Ok(()) => {
                self.cascade(&target).await;
                self.publish_destroyed(&target);
                info!(
                    box_id = %target.id,
                    provider = %target.provider,
                    "Destroyed {} in {:?}",
                    target.full_name(),
                    elapsed
                );
            }
            Err(e) => {
                warn!(box_id = %target.id, provider = %target.provider, "Destroy of {} failed: {}", target.full_name(), e);
            }
        }

        result
    }

    async fn cascade(&self, target: &ComputeBox) {
        let mut removed: Vec<CartonId> = Vec::new();

        match self.graph.find_assembly(&target.carton_id).await {
            Ok(Some(assembly)) => removed.push(assembly.id),
            Ok(None) => debug!(carton_id = %target.carton_id, "No assembly for box, skipping"),
            Err(e) => warn!(carton_id = %target.carton_id, "Assembly lookup failed, skipping: {}", e),
        }

        // Composite boxes have no component record of their own
        if target.is_leaf() {
            match self.graph.find_component(&target.id).await {
                Ok(Some(component)) => {
                    if let Err(e) = self.graph.delete_component(&component.id).await {
                        warn!(box_id = %target.id, "Failed to delete component: {}", e);
                    }
                }
                Ok(None) => debug!(box_id = %target.id, "No component for box, skipping"),
                Err(e) => warn!(box_id = %target.id, "Component lookup failed, skipping: {}", e),
            }
        }

        match self.graph.find_cartons(&target.cartons_id).await {
            Ok(Some(collection)) if !removed.is_empty() => {
                if let Err(e) = self.graph.remove_cartons(&collection.id, &removed).await {
                    warn!(cartons_id = %target.cartons_id, "Failed to update cartons collection: {}", e);
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => debug!(cartons_id = %target.cartons_id, "No cartons collection for box, skipping"),
            Err(e) => warn!(cartons_id = %target.cartons_id, "Cartons lookup failed, skipping: {}", e),
        }
    }

    fn publish_destroyed(&self, target: &ComputeBox) {
        let Some(events) = &self.events else {
            return;
        };

        let event = LifecycleEvent::new(EventAction::Destroy, EventType::from(target.kind))
            .with_attribute("box_id", target.id.as_str())
            .with_attribute("box_name", target.full_name())
            .with_attribute("provider", target.provider.as_str());

        if let Err(e) = events.write(event) {
            warn!(box_id = %target.id, "Failed to publish destroy event: {}", e);
        }
    }
}
