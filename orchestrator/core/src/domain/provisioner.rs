// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::io::Write;
use thiserror::Error;

use crate::domain::compute_box::ComputeBox;

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Failed to connect to provider backend: {0}")]
    Connection(String),
    #[error("Failed to destroy box: {0}")]
    DestroyFailed(String),
    #[error("Box not found on provider: {0}")]
    NotFound(String),
    #[error("Failed to write provisioner output: {0}")]
    Output(#[from] std::io::Error),
}

/// Backend-specific lifecycle operations for boxes, looked up by provider id.
///
/// Provisioners stream human-readable progress into `output` while they
/// work; the caller decides where that output ends up.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Provider identifier this backend registers under
    fn provider(&self) -> &str;

    async fn destroy(
        &self,
        target: &ComputeBox,
        output: &mut (dyn Write + Send),
    ) -> Result<(), ProvisionError>;
}
