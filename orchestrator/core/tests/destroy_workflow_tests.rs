// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the box destroy workflow.
//!
//! Uses a scripted provisioner and a resource graph that journals every call,
//! so each test can assert exactly which cleanup steps ran.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use vertice_core::application::destroy_workflow::{DestroyError, DestroyWorkflow};
use vertice_core::domain::box_log::{
    BoxLogStore, DestroyRecord, DiagnosticsError, DiagnosticsRecorder,
};
use vertice_core::domain::compute_box::{
    BoxId, BoxKind, BoxLevel, CartonId, CartonsId, ComputeBox, DestroyRequest,
};
use vertice_core::domain::events::{EventAction, EventType};
use vertice_core::domain::provisioner::{ProvisionError, Provisioner};
use vertice_core::domain::resource_graph::{
    Assembly, CartonsCollection, Component, RepositoryError, ResourceGraph,
};
use vertice_core::infrastructure::event_bus::EventBus;
use vertice_core::infrastructure::log_store::{FileLogStore, InMemoryLogStore};
use vertice_core::infrastructure::provisioner_registry::ProvisionerRegistry;
use vertice_core::infrastructure::repositories::InMemoryResourceGraph;

/// Writes `lines` to the output, then succeeds or fails as configured
struct ScriptedProvisioner {
    lines: Vec<String>,
    failure: Option<String>,
}

#[async_trait]
impl Provisioner for ScriptedProvisioner {
    fn provider(&self) -> &str {
        "one"
    }

    async fn destroy(
        &self,
        _target: &ComputeBox,
        output: &mut (dyn Write + Send),
    ) -> Result<(), ProvisionError> {
        for line in &self.lines {
            output.write_all(line.as_bytes())?;
        }
        match &self.failure {
            Some(reason) => Err(ProvisionError::DestroyFailed(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Writes one line, pauses, then writes a second line and succeeds
struct SlowProvisioner {
    pause: Duration,
}

#[async_trait]
impl Provisioner for SlowProvisioner {
    fn provider(&self) -> &str {
        "one"
    }

    async fn destroy(
        &self,
        _target: &ComputeBox,
        output: &mut (dyn Write + Send),
    ) -> Result<(), ProvisionError> {
        output.write_all(b"stopping\n")?;
        tokio::time::sleep(self.pause).await;
        output.write_all(b"removed\n")?;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingDiagnostics {
    records: Mutex<Vec<DestroyRecord>>,
}

#[async_trait]
impl DiagnosticsRecorder for RecordingDiagnostics {
    async fn record(&self, record: &DestroyRecord) -> Result<(), DiagnosticsError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Delegates to the in-memory graph and journals every call
struct JournalingGraph {
    inner: InMemoryResourceGraph,
    calls: Mutex<Vec<String>>,
    fail_lookups: bool,
}

impl JournalingGraph {
    fn new(inner: InMemoryResourceGraph) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            fail_lookups: false,
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn log(&self, call: String) -> Result<(), RepositoryError> {
        self.calls.lock().push(call);
        if self.fail_lookups {
            return Err(RepositoryError::Storage("graph offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceGraph for JournalingGraph {
    async fn find_assembly(&self, id: &CartonId) -> Result<Option<Assembly>, RepositoryError> {
        self.log(format!("find_assembly:{}", id))?;
        self.inner.find_assembly(id).await
    }

    async fn find_component(&self, id: &BoxId) -> Result<Option<Component>, RepositoryError> {
        self.log(format!("find_component:{}", id))?;
        self.inner.find_component(id).await
    }

    async fn delete_component(&self, id: &BoxId) -> Result<(), RepositoryError> {
        self.calls.lock().push(format!("delete_component:{}", id));
        self.inner.delete_component(id).await
    }

    async fn find_cartons(&self, id: &CartonsId) -> Result<Option<CartonsCollection>, RepositoryError> {
        self.log(format!("find_cartons:{}", id))?;
        self.inner.find_cartons(id).await
    }

    async fn remove_cartons(&self, id: &CartonsId, cartons: &[CartonId]) -> Result<(), RepositoryError> {
        let removed: Vec<&str> = cartons.iter().map(CartonId::as_str).collect();
        self.calls
            .lock()
            .push(format!("remove_cartons:{}:{}", id, removed.join(",")));
        self.inner.remove_cartons(id, cartons).await
    }
}

fn target(level: BoxLevel) -> ComputeBox {
    ComputeBox {
        id: BoxId::new("b1"),
        carton_id: CartonId::new("c1"),
        cartons_id: CartonsId::new("cs1"),
        provider: "one".to_string(),
        level,
        name: "tiny".to_string(),
        domain: Some("megam.io".to_string()),
        kind: BoxKind::Container,
        instance_id: None,
    }
}

fn seeded_graph() -> InMemoryResourceGraph {
    let graph = InMemoryResourceGraph::new();
    graph.insert_assembly(Assembly {
        id: CartonId::new("c1"),
        name: "tiny".to_string(),
        components: vec![BoxId::new("b1")],
        created_at: Utc::now(),
    });
    graph.insert_component(Component {
        id: BoxId::new("b1"),
        name: "tiny".to_string(),
        created_at: Utc::now(),
    });
    graph.insert_cartons(CartonsCollection {
        id: CartonsId::new("cs1"),
        cartons: vec![CartonId::new("c0"), CartonId::new("c1")],
        created_at: Utc::now(),
    });
    graph
}

struct Fixture {
    workflow: DestroyWorkflow,
    graph: Arc<JournalingGraph>,
    diagnostics: Arc<RecordingDiagnostics>,
    log_store: Arc<InMemoryLogStore>,
    bus: EventBus,
}

fn fixture(provisioner: ScriptedProvisioner, graph: JournalingGraph) -> Fixture {
    let graph = Arc::new(graph);
    let diagnostics = Arc::new(RecordingDiagnostics::default());
    let log_store = Arc::new(InMemoryLogStore::new());
    let bus = EventBus::new(16);

    let workflow = DestroyWorkflow::new(
        Arc::new(ProvisionerRegistry::new().with(Arc::new(provisioner))),
        graph.clone(),
        log_store.clone(),
        diagnostics.clone(),
    )
    .with_events(Arc::new(bus.clone()));

    Fixture {
        workflow,
        graph,
        diagnostics,
        log_store,
        bus,
    }
}

fn succeeding(lines: &[&str]) -> ScriptedProvisioner {
    ScriptedProvisioner {
        lines: lines.iter().map(|l| l.to_string()).collect(),
        failure: None,
    }
}

#[tokio::test]
async fn test_leaf_success_cascades_through_graph() {
    let f = fixture(succeeding(&["stopped\n", "removed\n"]), JournalingGraph::new(seeded_graph()));
    let mut events = f.bus.subscribe();

    f.workflow
        .destroy(DestroyRequest::new(target(BoxLevel::Leaf)))
        .await
        .unwrap();

    assert_eq!(
        f.graph.calls(),
        vec![
            "find_assembly:c1",
            "find_component:b1",
            "delete_component:b1",
            "find_cartons:cs1",
            "remove_cartons:cs1:c1",
        ]
    );
    assert_eq!(f.graph.inner.component_count(), 0);
    let collection = f.graph.inner.find_cartons(&CartonsId::new("cs1")).await.unwrap().unwrap();
    assert_eq!(collection.cartons, vec![CartonId::new("c0")]);

    let records = f.diagnostics.records.lock().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].box_name, "tiny.megam.io");
    assert_eq!(records[0].output, "stopped\nremoved\n");
    assert!(records[0].succeeded());

    let event = events.try_recv().unwrap();
    assert_eq!(event.action, EventAction::Destroy);
    assert_eq!(event.event_type, EventType::Container);
    assert_eq!(event.attribute("box_id"), Some("b1"));
}

#[tokio::test]
async fn test_failing_provisioner_skips_cascade_but_records() {
    let provisioner = ScriptedProvisioner {
        lines: vec!["trying\n".to_string()],
        failure: Some("instance locked".to_string()),
    };
    let f = fixture(provisioner, JournalingGraph::new(seeded_graph()));
    let mut events = f.bus.subscribe();

    let err = f
        .workflow
        .destroy(DestroyRequest::new(target(BoxLevel::Leaf)))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DestroyError::Provisioner(ProvisionError::DestroyFailed(ref reason)) if reason == "instance locked"
    ));
    assert!(f.graph.calls().is_empty());
    assert_eq!(f.graph.inner.component_count(), 1);
    assert!(events.try_recv().is_err());

    let records = f.diagnostics.records.lock().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].output, "trying\n");
    assert!(records[0].error.as_deref().unwrap().contains("instance locked"));

    // Output reaches the box log even on failure
    let logged = f.log_store.read(&BoxId::new("b1")).await.unwrap();
    assert_eq!(logged.len(), 1);
}

#[tokio::test]
async fn test_composite_box_keeps_component() {
    let f = fixture(succeeding(&["done\n"]), JournalingGraph::new(seeded_graph()));

    f.workflow
        .destroy(DestroyRequest::new(target(BoxLevel::Composite)))
        .await
        .unwrap();

    assert_eq!(
        f.graph.calls(),
        vec!["find_assembly:c1", "find_cartons:cs1", "remove_cartons:cs1:c1"]
    );
    assert_eq!(f.graph.inner.component_count(), 1);
}

#[tokio::test]
async fn test_missing_graph_entries_are_skipped() {
    let f = fixture(succeeding(&[]), JournalingGraph::new(InMemoryResourceGraph::new()));

    f.workflow
        .destroy(DestroyRequest::new(target(BoxLevel::Leaf)))
        .await
        .unwrap();

    // No assembly means nothing to remove from the collection
    assert_eq!(
        f.graph.calls(),
        vec!["find_assembly:c1", "find_component:b1", "find_cartons:cs1"]
    );
}

#[tokio::test]
async fn test_graph_lookup_errors_are_not_escalated() {
    let mut graph = JournalingGraph::new(seeded_graph());
    graph.fail_lookups = true;
    let f = fixture(succeeding(&["ok\n"]), graph);

    f.workflow
        .destroy(DestroyRequest::new(target(BoxLevel::Leaf)))
        .await
        .unwrap();

    assert_eq!(
        f.graph.calls(),
        vec!["find_assembly:c1", "find_component:b1", "find_cartons:cs1"]
    );
    assert_eq!(f.graph.inner.component_count(), 1);
}

#[tokio::test]
async fn test_output_lines_round_trip_in_order_through_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileLogStore::new(dir.path()));
    let lines: Vec<String> = (0..200).map(|i| format!("progress {:03}\n", i)).collect();
    let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();

    let diagnostics = Arc::new(RecordingDiagnostics::default());
    let workflow = DestroyWorkflow::new(
        Arc::new(ProvisionerRegistry::new().with(Arc::new(succeeding(&line_refs)))),
        Arc::new(InMemoryResourceGraph::new()),
        store.clone(),
        diagnostics.clone(),
    );

    workflow
        .destroy(DestroyRequest::new(target(BoxLevel::Leaf)))
        .await
        .unwrap();

    // destroy returns only after the sink has drained
    let logged: Vec<String> = store
        .read(&BoxId::new("b1"))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(logged, lines);
    assert_eq!(diagnostics.records.lock()[0].output, lines.concat());
}

#[tokio::test]
async fn test_unknown_provider_touches_nothing() {
    let f = fixture(succeeding(&["never\n"]), JournalingGraph::new(seeded_graph()));
    let mut box_ = target(BoxLevel::Leaf);
    box_.provider = "vmware".to_string();

    let err = f.workflow.destroy(DestroyRequest::new(box_)).await.unwrap_err();

    assert!(matches!(err, DestroyError::UnknownProvider(ref p) if p == "vmware"));
    assert!(f.graph.calls().is_empty());
    assert_eq!(f.diagnostics.records.lock().len(), 1);
}

#[tokio::test]
async fn test_dropped_caller_still_finishes_teardown() {
    let graph = Arc::new(JournalingGraph::new(seeded_graph()));
    let diagnostics = Arc::new(RecordingDiagnostics::default());
    let log_store = Arc::new(InMemoryLogStore::new());
    let provisioner = SlowProvisioner {
        pause: Duration::from_millis(200),
    };
    let workflow = DestroyWorkflow::new(
        Arc::new(ProvisionerRegistry::new().with(Arc::new(provisioner))),
        graph.clone(),
        log_store.clone(),
        diagnostics.clone(),
    );

    // The caller gives up while the provisioner is mid-teardown
    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        workflow.destroy(DestroyRequest::new(target(BoxLevel::Leaf))),
    )
    .await;
    assert!(abandoned.is_err());

    for _ in 0..300 {
        if !workflow.is_in_flight(&BoxId::new("b1")) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!workflow.is_in_flight(&BoxId::new("b1")));

    let records = diagnostics.records.lock().clone();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].output, "stopping\nremoved\n");
    assert!(records[0].succeeded());

    let logged = log_store.read(&BoxId::new("b1")).await.unwrap();
    assert_eq!(logged.len(), 2);
    assert_eq!(graph.inner.component_count(), 0);
}
