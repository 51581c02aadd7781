// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod server;
pub mod destroy_workflow;
pub mod log_sink;
pub mod deploy_queue;
pub mod events_relay;
pub mod dns;

// Re-export the entry points for convenience
pub use destroy_workflow::{DestroyError, DestroyWorkflow};
pub use server::{Server, ServerError, ServerState, ServiceFactory};
