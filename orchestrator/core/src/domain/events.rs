// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::compute_box::BoxKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    Add,
    Destroy,
    Deduct,
    Alert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Machine,
    Container,
    Bill,
    User,
}

impl From<BoxKind> for EventType {
    fn from(kind: BoxKind) -> Self {
        match kind {
            BoxKind::Machine => EventType::Machine,
            BoxKind::Container => EventType::Container,
        }
    }
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Add => "add",
            EventAction::Destroy => "destroy",
            EventAction::Deduct => "deduct",
            EventAction::Alert => "alert",
        }
    }
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Machine => "machine",
            EventType::Container => "container",
            EventType::Bill => "bill",
            EventType::User => "user",
        }
    }
}

/// A resource lifecycle event (machine added, container destroyed, bill
/// deducted, user alerted, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub timestamp: DateTime<Utc>,
    pub action: EventAction,
    pub event_type: EventType,
    /// Free-form attributes (box id, carton id, ...)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, String)>,
}

impl LifecycleEvent {
    pub fn new(action: EventAction, event_type: EventType) -> Self {
        Self {
            timestamp: Utc::now(),
            action,
            event_type,
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((key.into(), value.into()));
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.event_type.as_str(), self.action.as_str())
    }
}

#[derive(Debug, Error)]
pub enum EventPublishError {
    #[error("Event bus is closed")]
    Closed,

    #[error("Failed to publish event: {0}")]
    Rejected(String),
}

/// Synchronous publish capability for lifecycle events.
///
/// Delivery guarantees belong to the implementation; callers only learn
/// whether the event was accepted.
pub trait EventPublisher: Send + Sync {
    fn write(&self, event: LifecycleEvent) -> Result<(), EventPublishError>;
}
