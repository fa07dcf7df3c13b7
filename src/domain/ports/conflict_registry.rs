//! Conflict registry port: at most one active run per tenant.

/// Registry of tenants with an active run.
pub trait ConflictRegistry: Send + Sync {
    /// Claim the tenant for `task_id`.
    ///
    /// Returns `true` if the tenant was free or already held by `task_id`.
    fn try_acquire(&self, tenant_id: &str, task_id: &str) -> bool;

    /// Release the tenant if `task_id` holds it; otherwise a no-op.
    fn release(&self, tenant_id: &str, task_id: &str);

    /// Task currently holding the tenant.
    fn holder(&self, tenant_id: &str) -> Option<String>;
}
