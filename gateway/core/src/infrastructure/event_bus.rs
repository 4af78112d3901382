// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Lifecycle Event Bus - Pub/Sub for store lifecycle events
//
// Delivers store/version create and purge events from the store to every
// registered share context using tokio broadcast channels.
//
// In-memory only: a receiver that lags behind loses events and must resync.

use crate::domain::events::StoreLifecycleEvent;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to lifecycle events
#[derive(Clone)]
pub struct LifecycleEventBus {
    sender: Arc<broadcast::Sender<StoreLifecycleEvent>>,
}

impl LifecycleEventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
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

    /// Publish a lifecycle event to all subscribers
    pub fn publish(&self, event: StoreLifecycleEvent) {
        debug!("Publishing lifecycle event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to lifecycle event");
        }
    }

    pub fn subscribe(&self) -> LifecycleEventReceiver {
        LifecycleEventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LifecycleEventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for lifecycle events
pub struct LifecycleEventReceiver {
    receiver: broadcast::Receiver<StoreLifecycleEvent>,
}

impl LifecycleEventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<StoreLifecycleEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Lifecycle receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<StoreLifecycleEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Lifecycle receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::store_type::StoreType;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = LifecycleEventBus::new(10);
        let mut receiver = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(StoreLifecycleEvent::store_created("main", StoreType::Normal));

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.store_name(), "main");
        assert_eq!(receiver.try_recv(), Err(EventBusError::Empty));
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = LifecycleEventBus::default();
        bus.publish(StoreLifecycleEvent::store_purged("main"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_lagged_receiver() {
        let bus = LifecycleEventBus::new(2);
        let mut receiver = bus.subscribe();
        for id in 1..=4 {
            bus.publish(StoreLifecycleEvent::version_created("main", id));
        }

        assert_eq!(receiver.try_recv(), Err(EventBusError::Lagged(2)));
        assert!(matches!(
            receiver.try_recv(),
            Ok(StoreLifecycleEvent::VersionCreated { id: 3, .. })
        ));
    }
}
