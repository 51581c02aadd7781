// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Value types and the trait seams the rest of the crate is built on.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Boxes, resource graph, lifecycle events, service and
//!   provisioner contracts, server configuration

pub mod compute_box;
pub mod resource_graph;
pub mod provisioner;
pub mod box_log;
pub mod events;
pub mod service;
pub mod server_config;
