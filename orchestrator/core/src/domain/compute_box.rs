// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Compute Box
//!
//! A box is one provisioned compute unit (a VM or a container) under
//! orchestration. Boxes are grouped into cartons, and cartons into a parent
//! cartons collection; the identifiers of both groupings travel with the box
//! so teardown can cascade through the resource graph.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Value types shared by provisioners and the destroy workflow

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Unique identifier of a box
    BoxId
);
string_id!(
    /// Identifier of the carton (deployable unit) a box belongs to
    CartonId
);
string_id!(
    /// Identifier of the parent collection grouping cartons
    CartonsId
);

/// Position of a box in the resource graph.
///
/// Only leaf boxes own a component record of their own; composite boxes are
/// represented entirely by their assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxLevel {
    Leaf,
    Composite,
}

/// What kind of compute the box is backed by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoxKind {
    Machine,
    Container,
}

impl Default for BoxKind {
    fn default() -> Self {
        Self::Machine
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeBox {
    pub id: BoxId,
    pub carton_id: CartonId,
    pub cartons_id: CartonsId,
    /// Key into the provisioner registry (e.g. "docker", "one")
    pub provider: String,
    pub level: BoxLevel,
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub kind: BoxKind,
    /// Backend handle of the running instance, when it differs from the full name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
}

impl ComputeBox {
    /// Display name used in diagnostics: `name.domain`, or just the name
    pub fn full_name(&self) -> String {
        match self.domain.as_deref() {
            Some(domain) if !domain.is_empty() => format!("{}.{}", self.name, domain),
            _ => self.name.clone(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.level == BoxLevel::Leaf
    }

    /// Handle the backend knows this box by
    pub fn instance_ref(&self) -> String {
        self.instance_id.clone().unwrap_or_else(|| self.full_name())
    }
}

/// A single unit of work for the destroy workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestroyRequest {
    #[serde(rename = "box")]
    pub target: ComputeBox,
}

impl DestroyRequest {
    pub fn new(target: ComputeBox) -> Self {
        Self { target }
    }
}
