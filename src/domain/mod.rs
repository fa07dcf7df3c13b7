//! Domain layer for the switchover engine
//!
//! Task lifecycle state machine, progress/range/checkpoint value types and
//! the ports the engine depends on.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult, ErrorType};
