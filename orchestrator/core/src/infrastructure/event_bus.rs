// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Lifecycle Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Lets the events daemon and any other observer follow resource lifecycle
// changes (boxes added and destroyed, bills deducted, users alerted).
//
// In-memory only: events published while nobody listens are dropped.

use crate::domain::events::{EventPublishError, EventPublisher, LifecycleEvent};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to lifecycle events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<LifecycleEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before slow
    /// receivers start lagging
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: LifecycleEvent) {
        debug!(event = %event, "Publishing lifecycle event");

        // send() only fails when there are no receivers
        let receiver_count = self.sender.send(event).unwrap_or(0);

        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all lifecycle events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl EventPublisher for EventBus {
    fn write(&self, event: LifecycleEvent) -> Result<(), EventPublishError> {
        self.publish(event);
        Ok(())
    }
}

/// Receiver for all lifecycle events
pub struct EventReceiver {
    receiver: broadcast::Receiver<LifecycleEvent>,
}

impl EventReceiver {
    /// Receive the next event (waits until an event is available)
    pub async fn recv(&mut self) -> Result<LifecycleEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<LifecycleEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{EventAction, EventType};

    #[tokio::test]
    async fn test_event_bus_publish_subscribe() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let event = LifecycleEvent::new(EventAction::Add, EventType::Machine)
            .with_attribute("box_id", "b1");
        event_bus.write(event.clone()).unwrap();

        let received = receiver.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn test_write_without_subscribers_is_accepted() {
        let event_bus = EventBus::new(4);
        assert_eq!(event_bus.subscriber_count(), 0);
        assert!(event_bus
            .write(LifecycleEvent::new(EventAction::Alert, EventType::User))
            .is_ok());
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus.publish(LifecycleEvent::new(EventAction::Deduct, EventType::Bill));

        assert_eq!(receiver1.recv().await.unwrap().action, EventAction::Deduct);
        assert_eq!(receiver2.recv().await.unwrap().event_type, EventType::Bill);
    }

    #[tokio::test]
    async fn test_slow_receiver_lags() {
        let event_bus = EventBus::new(2);
        let mut receiver = event_bus.subscribe();

        for _ in 0..5 {
            event_bus.publish(LifecycleEvent::new(EventAction::Add, EventType::Container));
        }

        assert!(matches!(receiver.try_recv(), Err(EventBusError::Lagged(3))));
        assert!(receiver.try_recv().is_ok());
    }
}
