//! Service layer: the executor and the pieces that drive it.

pub mod event_bus;
pub mod heartbeat;
pub mod task_executor;
pub mod task_service;

pub use event_bus::{EventBus, EventBusConfig, PublishedEvent, SequenceNumber};
pub use heartbeat::{HeartbeatScheduler, ProgressGauge};
pub use task_executor::{ExecutorDeps, RunSettings, TaskExecutor};
pub use task_service::TaskService;
