// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;
pub mod event_bus;
pub mod provisioner_registry;
pub mod log_store;
pub mod diagnostics;
pub mod docker;
pub mod metrics;
pub mod profiling;

pub use provisioner_registry::ProvisionerRegistry;
