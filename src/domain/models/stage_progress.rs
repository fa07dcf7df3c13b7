//! Stage progress: "how far we got".

use serde::{Deserialize, Serialize};

use super::checkpoint::TaskCheckpoint;
use crate::domain::errors::{DomainError, DomainResult};

/// Current stage index over an ordered, non-empty list of stage names.
///
/// Replaced, never mutated: `next` and `reset` return new values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageProgress {
    current_stage_index: usize,
    stage_names: Vec<String>,
}

impl StageProgress {
    pub fn initial(stage_names: Vec<String>) -> DomainResult<Self> {
        Self::at(0, stage_names)
    }

    pub fn at(current_stage_index: usize, stage_names: Vec<String>) -> DomainResult<Self> {
        if stage_names.is_empty() {
            return Err(DomainError::ValidationFailed(
                "stage list must not be empty".to_string(),
            ));
        }
        if current_stage_index > stage_names.len() {
            return Err(DomainError::ValidationFailed(format!(
                "stage index {current_stage_index} beyond {} stages",
                stage_names.len()
            )));
        }
        Ok(Self {
            current_stage_index,
            stage_names,
        })
    }

    /// Rebuild from a checkpoint: positioned just after the last completed stage.
    pub fn of(checkpoint: &TaskCheckpoint) -> DomainResult<Self> {
        Self::at(
            checkpoint.next_stage_index(),
            checkpoint.all_stage_names.clone(),
        )
    }

    pub fn current_stage_index(&self) -> usize {
        self.current_stage_index
    }

    pub fn stage_names(&self) -> &[String] {
        &self.stage_names
    }

    pub fn total_stages(&self) -> usize {
        self.stage_names.len()
    }

    pub fn current_stage_name(&self) -> Option<&str> {
        self.stage_names
            .get(self.current_stage_index)
            .map(String::as_str)
    }

    /// Names of the stages before the current index, in order.
    pub fn completed_stage_names(&self) -> Vec<String> {
        self.stage_names[..self.current_stage_index.min(self.stage_names.len())].to_vec()
    }

    pub fn is_completed(&self) -> bool {
        self.current_stage_index >= self.stage_names.len()
    }

    /// Advance by one stage, saturating at the total.
    pub fn next(&self) -> Self {
        Self {
            current_stage_index: (self.current_stage_index + 1).min(self.stage_names.len()),
            stage_names: self.stage_names.clone(),
        }
    }

    pub fn reset(&self) -> Self {
        Self {
            current_stage_index: 0,
            stage_names: self.stage_names.clone(),
        }
    }

    /// Fraction of all stages completed, in percent.
    pub fn percentage(&self) -> u8 {
        let pct = self.current_stage_index * 100 / self.stage_names.len();
        u8::try_from(pct.min(100)).unwrap_or(100)
    }
}
