use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::ports::ConflictRegistry;

/// Tenant → running task id.
#[derive(Debug, Default)]
pub struct InMemoryConflictRegistry {
    holders: Mutex<HashMap<String, String>>,
}

impl InMemoryConflictRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn holders(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // The map stays consistent even if a holder panicked mid-call.
        self.holders.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ConflictRegistry for InMemoryConflictRegistry {
    fn try_acquire(&self, tenant_id: &str, task_id: &str) -> bool {
        let mut holders = self.holders();
        match holders.get(tenant_id) {
            Some(holder) => holder == task_id,
            None => {
                holders.insert(tenant_id.to_string(), task_id.to_string());
                true
            }
        }
    }

    fn release(&self, tenant_id: &str, task_id: &str) {
        let mut holders = self.holders();
        if holders.get(tenant_id).is_some_and(|h| h == task_id) {
            holders.remove(tenant_id);
        }
    }

    fn holder(&self, tenant_id: &str) -> Option<String> {
        self.holders().get(tenant_id).cloned()
    }
}
