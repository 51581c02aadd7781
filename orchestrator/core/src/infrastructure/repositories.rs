// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! In-memory implementation of the [`ResourceGraph`] contract, used by the
//! embedded server and by tests. Production deployments plug in their own
//! store behind the same trait.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Persist and retrieve resource graph nodes
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::compute_box::{BoxId, CartonId, CartonsId};
use crate::domain::resource_graph::{
    Assembly, CartonsCollection, Component, RepositoryError, ResourceGraph,
};

#[derive(Default)]
struct GraphState {
    assemblies: HashMap<CartonId, Assembly>,
    components: HashMap<BoxId, Component>,
    cartons: HashMap<CartonsId, CartonsCollection>,
}

#[derive(Clone, Default)]
pub struct InMemoryResourceGraph {
    state: Arc<RwLock<GraphState>>,
}

impl InMemoryResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_assembly(&self, assembly: Assembly) {
        self.state.write().assemblies.insert(assembly.id.clone(), assembly);
    }

    pub fn insert_component(&self, component: Component) {
        self.state.write().components.insert(component.id.clone(), component);
    }

    pub fn insert_cartons(&self, collection: CartonsCollection) {
        self.state.write().cartons.insert(collection.id.clone(), collection);
    }

    pub fn component_count(&self) -> usize {
        self.state.read().components.len()
    }
}

#[async_trait]
impl ResourceGraph for InMemoryResourceGraph {
    async fn find_assembly(&self, id: &CartonId) -> Result<Option<Assembly>, RepositoryError> {
        Ok(self.state.read().assemblies.get(id).cloned())
    }

    async fn find_component(&self, id: &BoxId) -> Result<Option<Component>, RepositoryError> {
        Ok(self.state.read().components.get(id).cloned())
    }

    async fn delete_component(&self, id: &BoxId) -> Result<(), RepositoryError> {
        self.state
            .write()
            .components
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(format!("component {}", id)))
    }

    async fn find_cartons(&self, id: &CartonsId) -> Result<Option<CartonsCollection>, RepositoryError> {
        Ok(self.state.read().cartons.get(id).cloned())
    }

    async fn remove_cartons(&self, id: &CartonsId, cartons: &[CartonId]) -> Result<(), RepositoryError> {
        let mut state = self.state.write();
        let collection = state
            .cartons
            .get_mut(id)
            .ok_or_else(|| RepositoryError::NotFound(format!("cartons {}", id)))?;
        collection.remove_cartons(cartons);
        Ok(())
    }
}
