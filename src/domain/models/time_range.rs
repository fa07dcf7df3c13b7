//! Task timing value types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Created/started/ended timestamps of a task.
///
/// Replaced rather than mutated: `start` and `end` return new values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new() -> Self {
        Self {
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
        }
    }

    /// Stamp a (re)start. Any previous end time is cleared.
    pub fn start(&self) -> Self {
        self.start_at(Utc::now())
    }

    pub fn start_at(&self, at: DateTime<Utc>) -> Self {
        Self {
            created_at: self.created_at,
            started_at: Some(at),
            ended_at: None,
        }
    }

    pub fn end(&self) -> Self {
        self.end_at(Utc::now())
    }

    pub fn end_at(&self, at: DateTime<Utc>) -> Self {
        Self {
            ended_at: Some(at),
            ..*self
        }
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Elapsed time between start and end; unknown until both are stamped.
    pub fn duration(&self) -> TaskDuration {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => TaskDuration::between(start, end),
            _ => TaskDuration::unknown(),
        }
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::new()
    }
}

/// Elapsed execution time in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TaskDuration {
    millis: Option<u64>,
}

impl TaskDuration {
    pub fn unknown() -> Self {
        Self { millis: None }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self {
            millis: Some(millis),
        }
    }

    /// Clock skew (end before start) is clamped to zero.
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let millis = (end - start).num_milliseconds().max(0);
        Self::from_millis(u64::try_from(millis).unwrap_or(0))
    }

    pub fn as_millis(&self) -> Option<u64> {
        self.millis
    }

    pub fn is_known(&self) -> bool {
        self.millis.is_some()
    }
}

impl std::fmt::Display for TaskDuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(millis) = self.millis else {
            return f.write_str("-");
        };
        let secs = millis / 1000;
        if secs >= 3600 {
            write!(f, "{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        } else if secs >= 60 {
            write!(f, "{}m {}s", secs / 60, secs % 60)
        } else if secs > 0 {
            write!(f, "{}.{:03}s", secs, millis % 1000)
        } else {
            write!(f, "{millis}ms")
        }
    }
}
