//! Switchover - resumable multi-stage deployment tasks
//!
//! A task rolls a tenant from one version to another by running an ordered
//! list of stages. After every successful stage a checkpoint is persisted, so
//! a failed or interrupted task can be retried from the checkpoint, retried
//! from scratch, or rolled back by replaying the previous version's stages.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): task state machine, value types and ports
//! - **Service Layer** (`services`): executor, task service, heartbeat, event bus
//! - **Adapters** (`adapters`): in-memory and `SQLite` implementations of the ports
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, storage setup
//! - **CLI Layer** (`cli`): operator commands over persisted tasks
//!
//! # Example
//!
//! ```ignore
//! use switchover::services::TaskService;
//!
//! let service = TaskService::new(deps, runtimes, factory);
//! let task = service.create_task("plan-1", "tenant-a", target, previous).await?;
//! service.start_task(task.task_id()).await?;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Config, ExecutionRange, FailureInfo, StageProgress, TargetVersion, TaskAggregate,
    TaskCheckpoint, TaskDomainEvent, TaskEventPayload, TaskIdentity, TaskRuntimeContext,
    TaskStatus,
};
pub use domain::ports::{
    CheckpointRepository, ConflictRegistry, DomainEventPublisher, Stage, StageError,
    StageFactory, TaskRepository, TaskRuntimeRepository,
};
pub use domain::{DomainError, DomainResult, ErrorType};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{EventBus, TaskExecutor, TaskService};
