//! EventBus service for lifecycle event distribution.
//!
//! Broadcast-based publisher with sequence numbering. Implements the
//! [`DomainEventPublisher`] port so executors publish straight into it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

use crate::domain::errors::DomainResult;
use crate::domain::models::TaskDomainEvent;
use crate::domain::ports::DomainEventPublisher;

/// Monotonically increasing sequence number assigned by EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    pub fn zero() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub sequence: SequenceNumber,
    pub event: TaskDomainEvent,
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast channel.
    pub channel_capacity: usize,
    /// Log every published event at debug level.
    pub log_events: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            log_events: true,
        }
    }
}

/// Central event bus for broadcasting lifecycle events to multiple consumers.
pub struct EventBus {
    sender: broadcast::Sender<PublishedEvent>,
    sequence: AtomicU64,
    config: EventBusConfig,
}

impl EventBus {
    /// Create a new EventBus with the given configuration.
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);
        Self {
            sender,
            sequence: AtomicU64::new(0),
            config,
        }
    }

    /// Publish a single event, assigning the next sequence number.
    pub fn publish_event(&self, event: TaskDomainEvent) -> SequenceNumber {
        let seq = SequenceNumber(self.sequence.fetch_add(1, Ordering::SeqCst));

        if self.config.log_events {
            tracing::debug!(
                sequence = seq.0,
                kind = event.kind(),
                task_id = %event.task.task_id,
                tenant_id = %event.task.tenant_id,
                status = %event.status,
                "event published"
            );
        }

        // Broadcast to subscribers (ignore send errors - may have no subscribers)
        let _ = self.sender.send(PublishedEvent {
            sequence: seq,
            event,
        });
        seq
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

#[async_trait]
impl DomainEventPublisher for EventBus {
    async fn publish(&self, events: Vec<TaskDomainEvent>) -> DomainResult<()> {
        for event in events {
            self.publish_event(event);
        }
        Ok(())
    }
}
