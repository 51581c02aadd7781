// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service Contract
//!
//! Every long-running subsystem the server composes (deploy daemon, HTTP
//! daemon, Docker daemon, metrics daemon, events daemon, DNS) implements
//! [`Service`]. The server only ever calls `open` once and `close` once, in
//! configuration order.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Lifecycle seam between the server and its subsystems

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// Subsystems known to the server, in startup order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubsystemKind {
    Deployd,
    Httpd,
    Docker,
    Metricsd,
    Eventsd,
    Dns,
}

impl SubsystemKind {
    pub const ALL: [SubsystemKind; 6] = [
        SubsystemKind::Deployd,
        SubsystemKind::Httpd,
        SubsystemKind::Docker,
        SubsystemKind::Metricsd,
        SubsystemKind::Eventsd,
        SubsystemKind::Dns,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SubsystemKind::Deployd => "deployd",
            SubsystemKind::Httpd => "httpd",
            SubsystemKind::Docker => "dockerd",
            SubsystemKind::Metricsd => "metricsd",
            SubsystemKind::Eventsd => "eventsd",
            SubsystemKind::Dns => "dns",
        }
    }
}

impl fmt::Display for SubsystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Service already open")]
    AlreadyOpen,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Runtime(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An asynchronous error raised by a running service, tagged with its origin
#[derive(Debug)]
pub struct ServiceFault {
    pub service: String,
    pub error: ServiceError,
}

impl fmt::Display for ServiceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.service, self.error)
    }
}

#[async_trait]
pub trait Service: Send + Sync {
    /// Stable name used in logs and error messages
    fn name(&self) -> &str;

    async fn open(&self) -> Result<(), ServiceError>;

    /// Must be safe to call on a service that was never opened.
    async fn close(&self) -> Result<(), ServiceError>;

    /// Out-of-band error stream for a running service.
    ///
    /// Handed out at most once; the server forwards everything received on it
    /// into its own fan-in channel until the sender side is dropped.
    fn take_errors(&self) -> Option<mpsc::Receiver<ServiceError>> {
        None
    }
}
