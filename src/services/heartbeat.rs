//! Heartbeat scheduler.
//!
//! Emits a `TaskProgress` event on a fixed interval while a run is active, so
//! observers get a signal even when a single stage runs for a long time.
//! The only state it shares with the executor is an atomic completed-stage
//! counter, read through [`ProgressGauge`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::domain::models::{TaskDomainEvent, TaskEventPayload, TaskIdentity, TaskStatus};
use crate::domain::ports::DomainEventPublisher;

/// Read-only view of a run's completed-stage count.
#[derive(Debug, Clone)]
pub struct ProgressGauge {
    completed: Arc<AtomicUsize>,
    stage_names: Arc<[String]>,
}

impl ProgressGauge {
    pub fn new(stage_names: Vec<String>) -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            stage_names: stage_names.into(),
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.stage_names.len()
    }

    pub fn current_stage(&self) -> Option<&str> {
        self.stage_names.get(self.completed()).map(String::as_str)
    }

    /// Writer side, used by the executor only.
    pub(crate) fn set_completed(&self, completed: usize) {
        self.completed.store(completed, Ordering::Release);
    }
}

struct RunningHeartbeat {
    stop_flag: Arc<AtomicBool>,
    wakeup: Arc<Notify>,
    handle: JoinHandle<()>,
}

/// Periodic progress ticker bound to one task.
///
/// `start` and `stop` may be called repeatedly: stopping twice is harmless
/// and a stopped scheduler can be started again for the next run.
pub struct HeartbeatScheduler {
    identity: TaskIdentity,
    interval: Duration,
    gauge: ProgressGauge,
    publisher: Arc<dyn DomainEventPublisher>,
    running: Option<RunningHeartbeat>,
}

impl HeartbeatScheduler {
    pub fn new(
        identity: TaskIdentity,
        interval: Duration,
        gauge: ProgressGauge,
        publisher: Arc<dyn DomainEventPublisher>,
    ) -> Self {
        Self {
            identity,
            interval,
            gauge,
            publisher,
            running: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Spawn the ticker. No-op if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        let stop_flag = Arc::new(AtomicBool::new(false));
        let wakeup = Arc::new(Notify::new());
        let handle = tokio::spawn(heartbeat_loop(
            self.identity.clone(),
            self.interval,
            self.gauge.clone(),
            Arc::clone(&self.publisher),
            Arc::clone(&stop_flag),
            Arc::clone(&wakeup),
        ));
        tracing::debug!(
            task_id = %self.identity.task_id,
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "heartbeat started"
        );
        self.running = Some(RunningHeartbeat {
            stop_flag,
            wakeup,
            handle,
        });
    }

    /// Signal the ticker to exit. Idempotent.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.stop_flag.store(true, Ordering::Release);
            running.wakeup.notify_one();
            tracing::debug!(task_id = %self.identity.task_id, "heartbeat stopped");
        }
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn heartbeat_loop(
    identity: TaskIdentity,
    period: Duration,
    gauge: ProgressGauge,
    publisher: Arc<dyn DomainEventPublisher>,
    stop_flag: Arc<AtomicBool>,
    wakeup: Arc<Notify>,
) {
    // First tick one full period after start.
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            () = wakeup.notified() => {}
        }
        if stop_flag.load(Ordering::Acquire) {
            break;
        }

        let event = TaskDomainEvent::new(
            identity.clone(),
            TaskStatus::Running,
            TaskEventPayload::TaskProgress {
                completed_stages: gauge.completed(),
                total_stages: gauge.total(),
                current_stage: gauge.current_stage().map(str::to_string),
            },
        );
        if let Err(e) = publisher.publish(vec![event]).await {
            tracing::warn!(task_id = %identity.task_id, error = %e, "heartbeat publish failed");
        }
    }
}
