//! Domain event publisher port.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::TaskDomainEvent;

/// Sink for lifecycle events.
///
/// Batches arrive in causal order per task. Cross-task ordering and delivery
/// retries are the sink's concern.
#[async_trait]
pub trait DomainEventPublisher: Send + Sync {
    async fn publish(&self, events: Vec<TaskDomainEvent>) -> DomainResult<()>;
}

/// Publisher that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventPublisher;

#[async_trait]
impl DomainEventPublisher for NullEventPublisher {
    async fn publish(&self, _events: Vec<TaskDomainEvent>) -> DomainResult<()> {
        Ok(())
    }
}
