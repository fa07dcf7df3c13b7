//! Runtime context shared between a task run, its stages and its controllers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use uuid::Uuid;

use super::task::TaskIdentity;

/// Per-run context handed to every stage.
///
/// Cheap to clone; clones share the scratch map and the pause/cancel flags,
/// so a controller can hold one while the executor runs with another.
#[derive(Debug, Clone)]
pub struct TaskRuntimeContext {
    identity: TaskIdentity,
    correlation_id: Uuid,
    scratch: Arc<RwLock<HashMap<String, serde_json::Value>>>,
    pause_requested: Arc<AtomicBool>,
    cancel_requested: Arc<AtomicBool>,
    cancelled_by: Arc<Mutex<Option<String>>>,
}

impl TaskRuntimeContext {
    pub fn new(identity: TaskIdentity) -> Self {
        Self {
            identity,
            correlation_id: Uuid::new_v4(),
            scratch: Arc::new(RwLock::new(HashMap::new())),
            pause_requested: Arc::new(AtomicBool::new(false)),
            cancel_requested: Arc::new(AtomicBool::new(false)),
            cancelled_by: Arc::new(Mutex::new(None)),
        }
    }

    pub fn identity(&self) -> &TaskIdentity {
        &self.identity
    }

    pub fn task_id(&self) -> &str {
        &self.identity.task_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.identity.tenant_id
    }

    pub fn plan_id(&self) -> &str {
        &self.identity.plan_id
    }

    /// Identifier attached to every log line of this run.
    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    // -- Scratch data for inter-stage handoff --

    pub async fn put(&self, key: impl Into<String>, value: serde_json::Value) {
        self.scratch.write().await.insert(key.into(), value);
    }

    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.scratch.read().await.get(key).cloned()
    }

    pub async fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.scratch.write().await.remove(key)
    }

    pub async fn snapshot(&self) -> HashMap<String, serde_json::Value> {
        self.scratch.read().await.clone()
    }

    // -- Cooperative control flags --

    pub fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::Release);
    }

    pub fn is_pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::Acquire)
    }

    pub fn clear_pause(&self) {
        self.pause_requested.store(false, Ordering::Release);
    }

    pub fn request_cancel(&self, by: Option<String>) {
        if let Ok(mut slot) = self.cancelled_by.lock() {
            *slot = by;
        }
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub fn cancel_requested_by(&self) -> Option<String> {
        self.cancelled_by.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn clear_cancel(&self) {
        self.cancel_requested.store(false, Ordering::Release);
    }
}
