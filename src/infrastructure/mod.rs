//! Infrastructure layer
//!
//! Configuration loading, logging and storage wiring.

pub mod config;
pub mod logging;
pub mod setup;
