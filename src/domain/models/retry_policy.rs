//! Retry-limit policy.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// Retry count plus an optional per-task cap.
///
/// Cap resolution order: per-task cap, then the global cap, then unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetryPolicy {
    retry_count: u32,
    max_retry: Option<u32>,
}

impl RetryPolicy {
    /// Policy that defers to the global cap.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retry(max_retry: u32) -> Self {
        Self {
            retry_count: 0,
            max_retry: Some(max_retry),
        }
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn max_retry(&self) -> Option<u32> {
        self.max_retry
    }

    /// `None` means unbounded.
    pub fn effective_max(&self, global_max: Option<u32>) -> Option<u32> {
        self.max_retry.or(global_max)
    }

    pub fn can_retry(&self, global_max: Option<u32>) -> bool {
        self.effective_max(global_max)
            .map_or(true, |max| self.retry_count < max)
    }

    /// Consume one retry, rejecting once the effective cap is reached.
    pub fn increment(&self, global_max: Option<u32>) -> DomainResult<Self> {
        if let Some(max) = self.effective_max(global_max) {
            if self.retry_count >= max {
                return Err(DomainError::RetryLimitExceeded {
                    retry_count: self.retry_count,
                    max_retry: max,
                });
            }
        }
        Ok(Self {
            retry_count: self.retry_count + 1,
            max_retry: self.max_retry,
        })
    }

    pub fn reset(&self) -> Self {
        Self {
            retry_count: 0,
            max_retry: self.max_retry,
        }
    }
}
