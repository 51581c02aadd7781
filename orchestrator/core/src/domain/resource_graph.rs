// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Resource Graph
//!
//! Deployed resources form a three-level graph:
//!
//! | Node | Keyed by | Owns |
//! |------|----------|------|
//! | `CartonsCollection` | cartons id | list of carton ids |
//! | `Assembly` | carton id | the carton-level record |
//! | `Component` | box id | the box-level record (leaf boxes only) |
//!
//! The graph is a shared store owned elsewhere; the destroy workflow only
//! performs point lookups and deletions against it through [`ResourceGraph`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::compute_box::{BoxId, CartonId, CartonsId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assembly {
    pub id: CartonId,
    pub name: String,
    pub components: Vec<BoxId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub id: BoxId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartonsCollection {
    pub id: CartonsId,
    pub cartons: Vec<CartonId>,
    pub created_at: DateTime<Utc>,
}

impl CartonsCollection {
    /// Drop every carton in `removed`, preserving the order of the rest.
    /// Returns how many entries were removed.
    pub fn remove_cartons(&mut self, removed: &[CartonId]) -> usize {
        let before = self.cartons.len();
        self.cartons.retain(|c| !removed.contains(c));
        before - self.cartons.len()
    }
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

#[async_trait]
pub trait ResourceGraph: Send + Sync {
    async fn find_assembly(&self, id: &CartonId) -> Result<Option<Assembly>, RepositoryError>;

    async fn find_component(&self, id: &BoxId) -> Result<Option<Component>, RepositoryError>;

    async fn delete_component(&self, id: &BoxId) -> Result<(), RepositoryError>;

    async fn find_cartons(&self, id: &CartonsId) -> Result<Option<CartonsCollection>, RepositoryError>;

    /// Remove the given cartons from the parent collection
    async fn remove_cartons(&self, id: &CartonsId, cartons: &[CartonId]) -> Result<(), RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_cartons_keeps_order_of_rest() {
        let mut collection = CartonsCollection {
            id: CartonsId::new("cs1"),
            cartons: vec!["c1".into(), "c2".into(), "c3".into()],
            created_at: Utc::now(),
        };

        assert_eq!(collection.remove_cartons(&["c2".into()]), 1);
        assert_eq!(collection.cartons, vec![CartonId::new("c1"), CartonId::new("c3")]);

        assert_eq!(collection.remove_cartons(&["missing".into()]), 0);
        assert_eq!(collection.remove_cartons(&[]), 0);
        assert_eq!(collection.cartons.len(), 2);
    }
}
