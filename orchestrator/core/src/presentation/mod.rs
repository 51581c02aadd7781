// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer (`vertice-core`)
//!
//! HTTP surface that translates external requests into application service
//! calls. All real work is delegated to `crate::application`.
//!
//! | Module | Transport | Description |
//! |--------|-----------|-------------|
//! | [`api`] | HTTP (Axum) | Health, synchronous and queued box destroy |

pub mod api;
