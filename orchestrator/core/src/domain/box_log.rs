// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Box log and destroy diagnostics contracts.
//!
//! Provisioner output is persisted line by line through [`BoxLogStore`];
//! the summary of each destroy attempt goes to a [`DiagnosticsRecorder`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::domain::compute_box::{BoxId, ComputeBox};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub box_id: BoxId,
    pub box_name: String,
    pub message: String,
    pub logged_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable, append-only log per box
#[async_trait]
pub trait BoxLogStore: Send + Sync {
    /// Append entries in the given order
    async fn append(&self, entries: Vec<LogEntry>) -> Result<(), LogStoreError>;

    async fn read(&self, box_id: &BoxId) -> Result<Vec<LogEntry>, LogStoreError>;
}

/// Outcome of one destroy attempt: what the provisioner printed, how long it
/// took, and how it ended.
#[derive(Debug, Clone, PartialEq)]
pub struct DestroyRecord {
    pub box_id: BoxId,
    pub box_name: String,
    pub provider: String,
    pub output: String,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl DestroyRecord {
    pub fn new(target: &ComputeBox, output: String, elapsed: Duration, error: Option<String>) -> Self {
        Self {
            box_id: target.id.clone(),
            box_name: target.full_name(),
            provider: target.provider.clone(),
            output,
            elapsed,
            error,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Error)]
pub enum DiagnosticsError {
    #[error("Failed to record destroy diagnostics: {0}")]
    Record(String),
}

#[async_trait]
pub trait DiagnosticsRecorder: Send + Sync {
    async fn record(&self, record: &DestroyRecord) -> Result<(), DiagnosticsError>;
}
