use super::release_unbound;
use crate::core::{FactoryKey, Result};
use crate::registry::ResourceRegistry;
use crate::resource::{ResourceFactory, ResourceHolder};
use crate::synchronization::{CLEANUP_SYNCHRONIZATION_ORDER, SyncPhase, Synchronization};
use std::sync::Arc;
use tracing::debug;

/// Cleanup callback registered alongside the first binding of a factory in a scope.
///
/// Keeps the holder alive while the scope is suspended and releases the
/// resource at completion. Every phase tolerates the resource having already
/// been cleaned up by another path.
pub struct ResourceSynchronization<F: ResourceFactory> {
    holder: Arc<ResourceHolder<F::Resource>>,
    factory: Arc<F>,
    key: FactoryKey,
}

impl<F: ResourceFactory> ResourceSynchronization<F> {
    pub fn new(holder: Arc<ResourceHolder<F::Resource>>, factory: Arc<F>) -> Self {
        let key = factory.key();
        Self {
            holder,
            factory,
            key,
        }
    }

    pub fn holder(&self) -> &Arc<ResourceHolder<F::Resource>> {
        &self.holder
    }

    fn release_now(&self, registry: &mut ResourceRegistry) {
        registry.unbind_if_possible(self.key);
        self.holder.set_synchronized_with_scope(false);
        release_unbound(self.holder.resource(), self.factory.as_ref());
    }
}

impl<F: ResourceFactory> Synchronization for ResourceSynchronization<F> {
    fn order(&self) -> i32 {
        CLEANUP_SYNCHRONIZATION_ORDER
    }

    fn describe(&self) -> String {
        format!("resource cleanup for {}", self.key)
    }

    fn is_rollback_only(&self) -> bool {
        self.holder.is_rollback_only()
    }

    fn on_phase(&mut self, phase: SyncPhase, registry: &mut ResourceRegistry) -> Result<()> {
        match phase {
            SyncPhase::Suspend => {
                registry.unbind_if_possible(self.key);
            }
            SyncPhase::Resume => {
                let binding: crate::registry::Binding = self.holder.clone();
                registry.bind(self.key, binding)?;
            }
            SyncPhase::BeforeCommit { .. } => {}
            SyncPhase::BeforeCompletion(_) => {
                // Release early if no collaborator holds the resource anymore,
                // so the close happens strictly before the completion signal.
                if !self.holder.is_open() && registry.has_binding(self.key) {
                    debug!(key = %self.key, "Releasing resource before completion");
                    self.release_now(registry);
                }
            }
            SyncPhase::AfterCompletion(status) => {
                // Unconditional for any status; skipped if already released above.
                if registry.has_binding(self.key) {
                    debug!(key = %self.key, %status, "Releasing resource after completion");
                    self.release_now(registry);
                }
                self.holder.clear();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CompletionStatus;
    use crate::resource::MemoryResourceFactory;

    fn bound_setup() -> (
        ResourceRegistry,
        ResourceSynchronization<MemoryResourceFactory>,
        Arc<ResourceHolder<crate::resource::MemoryResource>>,
    ) {
        let factory = Arc::new(MemoryResourceFactory::new());
        let resource = Arc::new(factory.create().unwrap());
        let holder = Arc::new(ResourceHolder::new(resource));
        holder.requested();

        let mut registry = ResourceRegistry::new();
        registry.bind(factory.key(), holder.clone()).unwrap();

        let sync = ResourceSynchronization::new(holder.clone(), factory);
        (registry, sync, holder)
    }

    #[test]
    fn test_cleanup_order() {
        let (_, sync, _) = bound_setup();
        assert_eq!(sync.order(), CLEANUP_SYNCHRONIZATION_ORDER);
    }

    #[test]
    fn test_before_completion_keeps_open_holder() {
        let (mut registry, mut sync, holder) = bound_setup();

        sync.on_phase(
            SyncPhase::BeforeCompletion(CompletionStatus::Committed),
            &mut registry,
        )
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert!(!holder.resource().is_closed());
    }

    #[test]
    fn test_before_completion_releases_drained_holder() {
        let (mut registry, mut sync, holder) = bound_setup();
        holder.released();

        sync.on_phase(
            SyncPhase::BeforeCompletion(CompletionStatus::Committed),
            &mut registry,
        )
        .unwrap();
        assert!(registry.is_empty());
        assert!(holder.resource().is_closed());

        // after-completion sees no binding and does not close again
        sync.on_phase(
            SyncPhase::AfterCompletion(CompletionStatus::Committed),
            &mut registry,
        )
        .unwrap();
        assert_eq!(holder.resource().close_calls(), 1);
    }

    #[test]
    fn test_after_completion_releases_on_rollback() {
        let (mut registry, mut sync, holder) = bound_setup();

        sync.on_phase(
            SyncPhase::AfterCompletion(CompletionStatus::RolledBack),
            &mut registry,
        )
        .unwrap();

        assert!(registry.is_empty());
        assert!(holder.resource().is_closed());
        assert_eq!(holder.reference_count(), 0, "Holder is reset after completion");
    }

    #[test]
    fn test_reports_holder_rollback_only() {
        let (mut registry, mut sync, holder) = bound_setup();
        assert!(!sync.is_rollback_only());

        holder.set_rollback_only();
        assert!(sync.is_rollback_only());

        sync.on_phase(
            SyncPhase::AfterCompletion(CompletionStatus::RolledBack),
            &mut registry,
        )
        .unwrap();
        assert!(!holder.is_rollback_only());
    }

    #[test]
    fn test_suspend_resume_keeps_holder() {
        let (mut registry, mut sync, holder) = bound_setup();
        let key = sync.key;

        sync.on_phase(SyncPhase::Suspend, &mut registry).unwrap();
        assert!(!registry.has_binding(key));
        assert!(!holder.resource().is_closed());

        sync.on_phase(SyncPhase::Resume, &mut registry).unwrap();
        let rebound = registry
            .lookup::<ResourceHolder<crate::resource::MemoryResource>>(key)
            .unwrap();
        assert!(Arc::ptr_eq(&rebound, &holder));
    }

    #[test]
    fn test_resume_into_conflicting_binding() {
        let (mut registry, mut sync, _) = bound_setup();
        let result = sync.on_phase(SyncPhase::Resume, &mut registry);
        assert!(matches!(
            result,
            Err(crate::core::SyncError::BindingConflict(_))
        ));
    }
}
