//! Recovery checkpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Durable record of the last stage completed inside the current execution range.
///
/// `all_stage_names` carries the full stage list so progress can be rebuilt
/// after a restart without re-running stage construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskCheckpoint {
    pub last_completed_stage_index: usize,
    pub completed_stage_names: Vec<String>,
    pub all_stage_names: Vec<String>,
    #[serde(default)]
    pub custom_data: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl TaskCheckpoint {
    pub fn new(
        last_completed_stage_index: usize,
        completed_stage_names: Vec<String>,
        all_stage_names: Vec<String>,
    ) -> Self {
        Self {
            last_completed_stage_index,
            completed_stage_names,
            all_stage_names,
            custom_data: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_custom_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.custom_data.insert(key.into(), value);
        self
    }

    /// Index the next run should start from.
    pub fn next_stage_index(&self) -> usize {
        self.last_completed_stage_index + 1
    }

    pub fn total_stages(&self) -> usize {
        self.all_stage_names.len()
    }

    pub fn last_completed_stage_name(&self) -> Option<&str> {
        self.all_stage_names
            .get(self.last_completed_stage_index)
            .map(String::as_str)
    }
}
