//! Execution range: "what subset this run must execute".

use serde::{Deserialize, Serialize};

use super::checkpoint::TaskCheckpoint;
use crate::domain::errors::{DomainError, DomainResult};

/// Half-open stage interval `[start_index, end_index)`.
///
/// `end_index = None` means "through the last stage". Ends beyond the stage
/// count are clamped by [`ExecutionRange::effective_end_index`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRange {
    start_index: usize,
    end_index: Option<usize>,
}

impl ExecutionRange {
    pub fn new(start_index: usize, end_index: Option<usize>) -> DomainResult<Self> {
        if let Some(end) = end_index {
            if end <= start_index {
                return Err(DomainError::ValidationFailed(format!(
                    "execution range end {end} must be greater than start {start_index}"
                )));
            }
        }
        Ok(Self {
            start_index,
            end_index,
        })
    }

    /// Every stage: `[0, total_stages)`.
    pub fn full(total_stages: usize) -> Self {
        Self {
            start_index: 0,
            end_index: (total_stages > 0).then_some(total_stages),
        }
    }

    /// Resume after the checkpoint: `[last_completed + 1, total_stages)`.
    ///
    /// When the checkpoint already covers the final stage the range is empty
    /// and a run over it completes immediately.
    pub fn for_retry(checkpoint: &TaskCheckpoint, total_stages: usize) -> Self {
        let start_index = checkpoint.next_stage_index();
        Self {
            start_index,
            end_index: (total_stages > start_index).then_some(total_stages),
        }
    }

    /// Re-execute everything already touched: `[0, last_completed + 2)`.
    ///
    /// The `+ 2` includes the stage that was in flight when the task stopped.
    pub fn for_rollback(checkpoint: &TaskCheckpoint) -> Self {
        Self {
            start_index: 0,
            end_index: Some(checkpoint.last_completed_stage_index + 2),
        }
    }

    /// Resume a rollback after the checkpoint, never past `rollback_end`.
    ///
    /// Once the checkpoint reaches `rollback_end` the range is the empty
    /// `[rollback_end, rollback_end)`.
    pub fn for_rollback_retry(checkpoint: &TaskCheckpoint, rollback_end: usize) -> Self {
        Self {
            start_index: checkpoint.next_stage_index().min(rollback_end),
            end_index: Some(rollback_end),
        }
    }

    pub fn start_index(&self) -> usize {
        self.start_index
    }

    pub fn end_index(&self) -> Option<usize> {
        self.end_index
    }

    pub fn effective_end_index(&self, total_stages: usize) -> usize {
        self.end_index
            .map_or(total_stages, |end| end.min(total_stages))
    }

    pub fn contains(&self, index: usize, total_stages: usize) -> bool {
        index >= self.start_index && index < self.effective_end_index(total_stages)
    }

    pub fn is_last_in_range(&self, index: usize, total_stages: usize) -> bool {
        self.contains(index, total_stages) && index + 1 == self.effective_end_index(total_stages)
    }

    /// Number of stages this range covers.
    pub fn len(&self, total_stages: usize) -> usize {
        self.effective_end_index(total_stages)
            .saturating_sub(self.start_index)
    }

    pub fn is_empty(&self, total_stages: usize) -> bool {
        self.len(total_stages) == 0
    }

    /// Whether the range covers all stages.
    pub fn is_full(&self, total_stages: usize) -> bool {
        self.start_index == 0 && self.effective_end_index(total_stages) == total_stages
    }
}

impl std::fmt::Display for ExecutionRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.end_index {
            Some(end) => write!(f, "[{}, {})", self.start_index, end),
            None => write!(f, "[{}, end)", self.start_index),
        }
    }
}
