use crate::core::{Result, SyncError};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Wraps one acquired resource and tracks its binding state.
///
/// The holder is shared between the context registry and the cleanup
/// synchronization, so all state is interior.
///
/// ```text
/// requested() ──> count += 1, open = true
/// released()  ──> count -= 1 (never below 0), open = false when count hits 0
/// ```
///
/// The resource must not be physically closed while the count is above zero.
pub struct ResourceHolder<R> {
    resource: Arc<R>,
    reference_count: AtomicUsize,
    open: AtomicBool,
    synchronized_with_scope: AtomicBool,
    rollback_only: AtomicBool,
    deadline: Mutex<Option<Instant>>,
}

impl<R> ResourceHolder<R> {
    pub fn new(resource: Arc<R>) -> Self {
        Self {
            resource,
            reference_count: AtomicUsize::new(0),
            open: AtomicBool::new(false),
            synchronized_with_scope: AtomicBool::new(false),
            rollback_only: AtomicBool::new(false),
            deadline: Mutex::new(None),
        }
    }

    pub fn resource(&self) -> &Arc<R> {
        &self.resource
    }

    /// Whether `resource` is the exact instance held here
    pub fn holds(&self, resource: &Arc<R>) -> bool {
        Arc::ptr_eq(&self.resource, resource)
    }

    pub fn requested(&self) {
        self.reference_count.fetch_add(1, Ordering::SeqCst);
        self.open.store(true, Ordering::SeqCst);
    }

    pub fn released(&self) {
        let previous = self
            .reference_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                Some(count.saturating_sub(1))
            })
            .unwrap_or(0);

        if previous <= 1 {
            self.open.store(false, Ordering::SeqCst);
        }
    }

    pub fn reference_count(&self) -> usize {
        self.reference_count.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn set_synchronized_with_scope(&self, synchronized: bool) {
        self.synchronized_with_scope
            .store(synchronized, Ordering::SeqCst);
    }

    pub fn is_synchronized_with_scope(&self) -> bool {
        self.synchronized_with_scope.load(Ordering::SeqCst)
    }

    pub fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Deadline handling
    // ========================================================================

    fn deadline_slot(&self) -> MutexGuard<'_, Option<Instant>> {
        // The guarded value is a plain Option, so a poisoned lock is still usable.
        self.deadline.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.set_deadline(Instant::now() + timeout);
    }

    pub fn set_deadline(&self, deadline: Instant) {
        *self.deadline_slot() = Some(deadline);
    }

    pub fn deadline(&self) -> Option<Instant> {
        *self.deadline_slot()
    }

    pub fn has_timeout(&self) -> bool {
        self.deadline().is_some()
    }

    /// Remaining time before the deadline.
    ///
    /// Once the deadline has passed the holder is marked rollback-only and
    /// `SyncError::TimedOut` is returned.
    pub fn time_to_live(&self) -> Result<Duration> {
        let deadline = self.deadline().ok_or_else(|| {
            SyncError::InvalidState("No timeout specified for this resource holder".into())
        })?;

        let now = Instant::now();
        if now >= deadline {
            self.set_rollback_only();
            return Err(SyncError::TimedOut {
                deadline_exceeded_by: now - deadline,
            });
        }

        Ok(deadline - now)
    }

    /// Remaining time rounded up to whole seconds
    pub fn time_to_live_in_seconds(&self) -> Result<u64> {
        let ttl = self.time_to_live()?;
        let rounded = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        Ok(rounded)
    }

    /// Reset all state except the held resource
    pub fn clear(&self) {
        self.reference_count.store(0, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
        self.synchronized_with_scope.store(false, Ordering::SeqCst);
        self.rollback_only.store(false, Ordering::SeqCst);
        *self.deadline_slot() = None;
    }
}

impl<R> std::fmt::Debug for ResourceHolder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceHolder")
            .field("reference_count", &self.reference_count())
            .field("open", &self.is_open())
            .field("synchronized_with_scope", &self.is_synchronized_with_scope())
            .field("deadline", &self.deadline())
            .finish()
    }
}
