pub mod checkpoint;
pub mod config;
pub mod context;
pub mod events;
pub mod execution_range;
pub mod failure;
pub mod retry_policy;
pub mod run_outcome;
pub mod stage_progress;
pub mod task;
pub mod time_range;

pub use checkpoint::TaskCheckpoint;
pub use config::{
    Config, DatabaseConfig, ExecutorConfig, LogFormat, LoggingConfig, RetryConfig,
    RotationPolicy, StorageBackend,
};
pub use context::TaskRuntimeContext;
pub use events::{TaskDomainEvent, TaskEventPayload};
pub use execution_range::ExecutionRange;
pub use failure::{FailureInfo, StageResult, StageResultStatus};
pub use retry_policy::RetryPolicy;
pub use run_outcome::{RunOutcome, TaskExecutionResult};
pub use stage_progress::StageProgress;
pub use task::{TargetVersion, TaskAggregate, TaskIdentity, TaskStatus};
pub use time_range::{TaskDuration, TimeRange};
