//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty console output (stderr)
//! - Rolling JSON log files
//! - Retention-based cleanup of old log files

pub mod logger;
pub mod retention;

pub use logger::{LoggerImpl, LOG_FILE_NAME};
pub use retention::cleanup_old_logs;
