// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Vertice Orchestrator Core
//!
//! Service lifecycle orchestration and compute box teardown.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** [`application::server::Server`] opens and closes the
//!   configured subsystems; [`application::destroy_workflow::DestroyWorkflow`]
//!   destroys boxes through pluggable provisioners and cleans up the
//!   resource graph.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
