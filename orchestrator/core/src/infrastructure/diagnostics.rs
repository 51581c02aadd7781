// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use tracing::debug;

use crate::domain::box_log::{DestroyRecord, DiagnosticsError, DiagnosticsRecorder};

/// Records destroy attempts as a structured log line plus a duration histogram
#[derive(Debug, Default, Clone)]
pub struct TracingDiagnostics;

impl TracingDiagnostics {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DiagnosticsRecorder for TracingDiagnostics {
    async fn record(&self, record: &DestroyRecord) -> Result<(), DiagnosticsError> {
        let outcome = if record.succeeded() { "success" } else { "failure" };

        debug!(
            box_name = %record.box_name,
            box_id = %record.box_id,
            elapsed = ?record.elapsed,
            outcome,
            error = record.error.as_deref().unwrap_or(""),
            "{} in ({:?})\n{}",
            record.box_name,
            record.elapsed,
            record.output
        );

        metrics::histogram!(
            "vertice_box_destroy_duration_seconds",
            "provider" => record.provider.clone(),
            "outcome" => outcome
        )
        .record(record.elapsed.as_secs_f64());

        Ok(())
    }
}
