//! In-memory adapters.
//!
//! Process-local implementations of the persistence ports, used by tests and
//! by embeddings that do not need durability.

mod checkpoint_repository;
mod conflict_registry;
mod runtime_repository;
mod task_repository;

pub use checkpoint_repository::InMemoryCheckpointRepository;
pub use conflict_registry::InMemoryConflictRegistry;
pub use runtime_repository::InMemoryTaskRuntimeRepository;
pub use task_repository::InMemoryTaskRepository;
