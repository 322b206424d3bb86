// ============================================================================
// Synchronization Context
// ============================================================================
//
// Explicit replacement for thread-bound transaction state. One context per
// logical execution context; callers pass it by `&mut` through the call chain.
//
// Scope state machine:
//
//   active ──suspend──> suspended ──resume──> active ──commit/rollback──> completed
//
// ============================================================================

pub mod definition;
pub mod scope;

pub use definition::ScopeDefinition;
pub use scope::ScopeHandle;

use crate::core::{IsolationLevel, Result, SyncError};
use crate::registry::ResourceRegistry;
use crate::synchronization::{SyncPhase, Synchronization, SynchronizationList};
use std::time::Instant;
use tracing::{debug, warn};

/// Attributes of the scope currently active in a context
#[derive(Debug, Clone, Default)]
pub(crate) struct ScopeAttributes {
    pub(crate) name: Option<String>,
    pub(crate) read_only: bool,
    pub(crate) isolation: Option<IsolationLevel>,
    pub(crate) deadline: Option<Instant>,
    pub(crate) actual_active: bool,
    pub(crate) rollback_only: bool,
}

/// Per-execution-context resource bindings and scope synchronizations
#[derive(Debug, Default)]
pub struct SyncContext {
    registry: ResourceRegistry,
    synchronizations: Option<SynchronizationList>,
    attributes: ScopeAttributes,
}

/// A scope taken out of its context by `SyncContext::suspend`.
///
/// Owns the callbacks (and through them the holders) until it is resumed.
#[derive(Debug)]
#[must_use = "a suspended scope must be resumed or its resources stay unbound"]
pub struct SuspendedScope {
    synchronizations: Option<SynchronizationList>,
    attributes: ScopeAttributes,
}

impl SuspendedScope {
    pub fn name(&self) -> Option<&str> {
        self.attributes.name.as_deref()
    }

    pub fn synchronization_count(&self) -> usize {
        self.synchronizations.as_ref().map_or(0, |list| list.len())
    }
}

impl SyncContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.registry
    }

    // ========================================================================
    // Synchronization management
    // ========================================================================

    pub fn is_synchronization_active(&self) -> bool {
        self.synchronizations.is_some()
    }

    pub fn init_synchronization(&mut self) -> Result<()> {
        if self.is_synchronization_active() {
            return Err(SyncError::InvalidState(
                "Cannot activate synchronization - already active".into(),
            ));
        }

        debug!("Initializing scope synchronization");
        self.synchronizations = Some(SynchronizationList::new());
        Ok(())
    }

    pub fn register_synchronization(
        &mut self,
        synchronization: Box<dyn Synchronization>,
    ) -> Result<()> {
        let list = self.synchronizations.as_mut().ok_or_else(|| {
            SyncError::InvalidState("Scope synchronization is not active".into())
        })?;

        list.register(synchronization);
        Ok(())
    }

    pub fn synchronization_count(&self) -> usize {
        self.synchronizations.as_ref().map_or(0, |list| list.len())
    }

    /// Order values of the registered callbacks in invocation order
    pub fn synchronization_orders(&mut self) -> Vec<i32> {
        self.synchronizations
            .as_mut()
            .map_or_else(Vec::new, |list| list.orders())
    }

    pub fn clear_synchronization(&mut self) -> Result<()> {
        if self.synchronizations.take().is_none() {
            return Err(SyncError::InvalidState(
                "Cannot deactivate synchronization - not active".into(),
            ));
        }

        debug!("Clearing scope synchronization");
        Ok(())
    }

    pub(crate) fn take_synchronizations(&mut self) -> Option<SynchronizationList> {
        self.synchronizations.take()
    }

    // ========================================================================
    // Scope attributes
    // ========================================================================

    pub fn current_scope_name(&self) -> Option<&str> {
        self.attributes.name.as_deref()
    }

    pub fn is_current_scope_read_only(&self) -> bool {
        self.attributes.read_only
    }

    pub fn current_isolation_level(&self) -> Option<IsolationLevel> {
        self.attributes.isolation
    }

    /// Whether a scope owned by some `ScopeHandle` is active (as opposed to
    /// synchronization having been initialized by hand)
    pub fn is_actual_scope_active(&self) -> bool {
        self.attributes.actual_active
    }

    pub fn scope_deadline(&self) -> Option<Instant> {
        self.attributes.deadline
    }

    /// Whether the active scope can only roll back: marked directly, or a
    /// bound resource holder was marked (for example by an expired deadline)
    pub fn is_rollback_only(&self) -> bool {
        self.attributes.rollback_only
            || self
                .synchronizations
                .as_ref()
                .is_some_and(|list| list.is_rollback_only())
    }

    pub fn set_rollback_only(&mut self) {
        self.attributes.rollback_only = true;
    }

    pub(crate) fn set_attributes(&mut self, attributes: ScopeAttributes) {
        self.attributes = attributes;
    }

    pub(crate) fn clear_attributes(&mut self) {
        self.attributes = ScopeAttributes::default();
    }

    // ========================================================================
    // Suspend / resume
    // ========================================================================

    /// Take the active scope out of this context.
    ///
    /// Every callback sees `Suspend` (cleanup callbacks unbind their resources);
    /// the callbacks and scope attributes move into the returned value.
    pub fn suspend(&mut self) -> SuspendedScope {
        let synchronizations = self.synchronizations.take().map(|mut list| {
            let report = list.dispatch(SyncPhase::Suspend, &mut self.registry);
            if !report.is_clean() {
                warn!(
                    failures = report.failures.len(),
                    "Some synchronizations failed to suspend"
                );
            }
            list
        });

        let attributes = std::mem::take(&mut self.attributes);
        debug!(scope = ?attributes.name, "Suspended scope");

        SuspendedScope {
            synchronizations,
            attributes,
        }
    }

    /// Put a suspended scope back into this context.
    ///
    /// Callbacks see `Resume` and are re-armed. Fails with `InvalidState` if
    /// another scope's synchronization is still active, and with the first
    /// callback error (usually a `BindingConflict`) if a rebind failed; in the
    /// latter case the scope is still restored.
    pub fn resume(&mut self, suspended: SuspendedScope) -> Result<()> {
        if suspended.synchronizations.is_some() && self.is_synchronization_active() {
            return Err(SyncError::InvalidState(
                "Cannot resume a scope while another scope's synchronization is active".into(),
            ));
        }

        let SuspendedScope {
            synchronizations,
            attributes,
        } = suspended;

        debug!(scope = ?attributes.name, "Resuming scope");
        self.attributes = attributes;

        if let Some(mut list) = synchronizations {
            let report = list.dispatch(SyncPhase::Resume, &mut self.registry);
            self.synchronizations = Some(list);
            report.into_result()?;
        }

        Ok(())
    }
}
