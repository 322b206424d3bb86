use super::{ScopeAttributes, ScopeDefinition, SuspendedScope, SyncContext};
use crate::core::{CompletionStatus, Propagation, Result, SyncError};
use crate::synchronization::SyncPhase;
use std::time::Instant;
use tracing::{Level, event, info_span, warn};
use uuid::Uuid;

/// How a handle relates to the scope it was returned for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScopeRole {
    /// Opened the scope and drives its completion
    Owner,
    /// Joined a scope opened further up the call chain
    Participant,
    /// Runs without a scope (outer scope, if any, is suspended)
    Unscoped,
}

/// Returned by `SyncContext::begin`; consumed by `commit` or `rollback`.
///
/// Dropping a handle without completing it leaves its callbacks registered
/// and any suspended outer scope unresumed.
#[must_use = "a scope must be completed with commit or rollback"]
#[derive(Debug)]
pub struct ScopeHandle {
    id: Uuid,
    definition: ScopeDefinition,
    role: ScopeRole,
    suspended: Option<SuspendedScope>,
    completed: bool,
}

impl ScopeHandle {
    fn new(definition: ScopeDefinition, role: ScopeRole, suspended: Option<SuspendedScope>) -> Self {
        Self {
            id: Uuid::new_v4(),
            definition,
            role,
            suspended,
            completed: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        self.definition.display_name()
    }

    pub fn definition(&self) -> &ScopeDefinition {
        &self.definition
    }

    /// Whether this handle opened the scope (and so completes it)
    pub fn is_new_scope(&self) -> bool {
        self.role == ScopeRole::Owner
    }

    /// Whether an outer scope was suspended to begin this one
    pub fn has_suspended_scope(&self) -> bool {
        self.suspended.is_some()
    }
}

impl Drop for ScopeHandle {
    fn drop(&mut self) {
        if !self.completed {
            warn!(
                scope_id = %self.id,
                scope = %self.definition.display_name(),
                "ScopeHandle dropped without commit or rollback. Its resources stay bound until the context is cleaned up."
            );
        }
    }
}

impl SyncContext {
    /// Begin a scope according to the definition's propagation
    pub fn begin(&mut self, definition: ScopeDefinition) -> Result<ScopeHandle> {
        definition.validate()?;
        let active = self.is_actual_scope_active();

        match definition.propagation {
            Propagation::Required if active => {
                event!(
                    Level::DEBUG,
                    scope = %definition.display_name(),
                    outer = ?self.current_scope_name(),
                    "participating in existing scope"
                );
                Ok(ScopeHandle::new(definition, ScopeRole::Participant, None))
            }
            Propagation::Required => {
                let suspended = self.suspend_if_active();
                self.open_scope(definition, suspended)
            }
            Propagation::RequiresNew => {
                let suspended = self.suspend_if_active();
                self.open_scope(definition, suspended)
            }
            Propagation::NotSupported => {
                let suspended = self.suspend_if_active();
                event!(
                    Level::DEBUG,
                    scope = %definition.display_name(),
                    suspended_outer = suspended.is_some(),
                    "running without scope"
                );
                Ok(ScopeHandle::new(definition, ScopeRole::Unscoped, suspended))
            }
        }
    }

    fn suspend_if_active(&mut self) -> Option<SuspendedScope> {
        if self.is_synchronization_active() || self.is_actual_scope_active() {
            Some(self.suspend())
        } else {
            None
        }
    }

    fn open_scope(
        &mut self,
        definition: ScopeDefinition,
        suspended: Option<SuspendedScope>,
    ) -> Result<ScopeHandle> {
        if let Err(err) = self.init_synchronization() {
            if let Some(outer) = suspended {
                self.resume(outer)?;
            }
            return Err(err);
        }

        self.set_attributes(ScopeAttributes {
            name: definition.name.clone(),
            read_only: definition.read_only,
            isolation: definition.isolation,
            deadline: definition.timeout.map(|timeout| Instant::now() + timeout),
            actual_active: true,
            rollback_only: false,
        });

        let handle = ScopeHandle::new(definition, ScopeRole::Owner, suspended);
        event!(
            Level::DEBUG,
            scope_id = %handle.id,
            scope = %handle.name(),
            descriptor = %handle.definition.to_descriptor(),
            "scope opened"
        );
        Ok(handle)
    }

    /// Commit the scope behind `handle`.
    ///
    /// Participating handles only report success; the owner completes the scope.
    /// A `BeforeCommit` failure turns the completion into a rollback and is
    /// returned once cleanup has run. A rollback-only scope completes as rolled
    /// back and returns `UnexpectedRollback`.
    pub fn commit(&mut self, mut handle: ScopeHandle) -> Result<()> {
        handle.completed = true;
        let span = info_span!("scope.commit", scope_id = %handle.id, scope = %handle.name());
        let _enter = span.enter();

        match handle.role {
            ScopeRole::Participant => {
                event!(Level::DEBUG, "participant commit deferred to scope owner");
                Ok(())
            }
            ScopeRole::Unscoped => self.resume_outer(&mut handle),
            ScopeRole::Owner => {
                if self.is_rollback_only() {
                    event!(Level::DEBUG, "scope is rollback-only, rolling back");
                    self.complete(CompletionStatus::RolledBack);
                    self.resume_outer(&mut handle)?;
                    return Err(SyncError::UnexpectedRollback(handle.name().to_string()));
                }

                let read_only = self.is_current_scope_read_only();
                if let Err(err) = self.dispatch_before_commit(read_only) {
                    event!(Level::ERROR, error = %err, "before-commit failed, rolling back");
                    self.complete(CompletionStatus::RolledBack);
                    self.resume_outer(&mut handle)?;
                    return Err(err);
                }

                self.complete(CompletionStatus::Committed);
                self.resume_outer(&mut handle)
            }
        }
    }

    /// Roll back the scope behind `handle`.
    ///
    /// Participating handles mark the scope rollback-only instead.
    pub fn rollback(&mut self, mut handle: ScopeHandle) -> Result<()> {
        handle.completed = true;
        let span = info_span!("scope.rollback", scope_id = %handle.id, scope = %handle.name());
        let _enter = span.enter();

        match handle.role {
            ScopeRole::Participant => {
                event!(Level::DEBUG, "participant rollback, marking scope rollback-only");
                self.set_rollback_only();
                Ok(())
            }
            ScopeRole::Unscoped => self.resume_outer(&mut handle),
            ScopeRole::Owner => {
                self.complete(CompletionStatus::RolledBack);
                self.resume_outer(&mut handle)
            }
        }
    }

    /// Run `work` inside a scope: commit on `Ok`, roll back on `Err`.
    pub fn in_scope<T, F>(&mut self, definition: ScopeDefinition, work: F) -> Result<T>
    where
        F: FnOnce(&mut SyncContext) -> Result<T>,
    {
        let handle = self.begin(definition)?;

        match work(self) {
            Ok(value) => {
                self.commit(handle)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback(handle) {
                    event!(
                        Level::ERROR,
                        error = %rollback_err,
                        "rollback after failed scope work also failed"
                    );
                }
                Err(err)
            }
        }
    }

    fn dispatch_before_commit(&mut self, read_only: bool) -> Result<()> {
        let Some(mut list) = self.take_synchronizations() else {
            return Ok(());
        };

        let report = list.dispatch(SyncPhase::BeforeCommit { read_only }, self.registry_mut());
        // put the list back so completion still reaches every callback
        self.synchronizations = Some(list);
        report.into_result()
    }

    /// Deliver the completion phases and deactivate the scope.
    ///
    /// Callback failures are logged by the list and never abort cleanup.
    fn complete(&mut self, status: CompletionStatus) {
        if let Some(mut list) = self.take_synchronizations() {
            let before = list.dispatch(SyncPhase::BeforeCompletion(status), self.registry_mut());
            let after = list.dispatch(SyncPhase::AfterCompletion(status), self.registry_mut());

            let failures = before.failures.len() + after.failures.len();
            if failures > 0 {
                event!(Level::WARN, %status, failures, "scope completed with callback failures");
            } else {
                event!(Level::DEBUG, %status, callbacks = after.invoked, "scope completed");
            }
        }

        self.clear_attributes();
    }

    fn resume_outer(&mut self, handle: &mut ScopeHandle) -> Result<()> {
        match handle.suspended.take() {
            Some(outer) => self.resume(outer),
            None => Ok(()),
        }
    }
}
