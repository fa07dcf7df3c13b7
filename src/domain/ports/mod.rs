//! Port trait definitions (Hexagonal Architecture)
//!
//! Contracts the engine depends on, implemented by adapters or by the
//! embedding application:
//! - Stage / StageFactory: the units of deployment work
//! - CheckpointRepository, TaskRepository: durable persistence
//! - TaskRuntimeRepository: transient runtime artifacts of live runs
//! - DomainEventPublisher: lifecycle event sink
//! - ConflictRegistry: one active run per tenant

pub mod checkpoint_repository;
pub mod conflict_registry;
pub mod event_publisher;
pub mod stage;
pub mod task_repository;
pub mod task_runtime_repository;

pub use checkpoint_repository::CheckpointRepository;
pub use conflict_registry::ConflictRegistry;
pub use event_publisher::{DomainEventPublisher, NullEventPublisher};
pub use stage::{stage_names, Stage, StageError, StageFactory};
pub use task_repository::TaskRepository;
pub use task_runtime_repository::{
    ExecutionHandle, RunningGuard, TaskRuntime, TaskRuntimeRepository,
};
