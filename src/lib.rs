// ============================================================================
// txsync Library
// ============================================================================
//
// Scope-bound resource synchronization: at most one physical resource per
// factory per scope, reference-counted holders, and ordered cleanup callbacks
// run when the scope is suspended, resumed or completed.
//
// ============================================================================

pub mod core;
pub mod registry;
pub mod resource;
pub mod synchronization;
pub mod context;
pub mod manager;
pub mod prelude;

// Re-export main types for convenience
pub use crate::core::{BoxError, CompletionStatus, FactoryKey, IsolationLevel, Propagation, Result, SyncError};
pub use context::{ScopeDefinition, ScopeHandle, SuspendedScope, SyncContext};
pub use registry::ResourceRegistry;
pub use resource::{Resource, ResourceFactory, ResourceHolder, ScopedSettings, TimeoutTarget};
pub use synchronization::{
    CLEANUP_SYNCHRONIZATION_ORDER, SyncPhase, Synchronization, SynchronizationList, from_fn,
};
pub use manager::{acquire, acquire_unmanaged, acquire_with, release};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::MemoryResourceFactory;
    use std::sync::Arc;

    #[test]
    fn test_root_reexports() {
        let factory = Arc::new(MemoryResourceFactory::new());
        let mut ctx = SyncContext::new();

        let scope = ctx.begin(ScopeDefinition::new("root")).unwrap();
        let resource = acquire(&mut ctx, &factory).unwrap();
        release(&ctx, Some(&resource), factory.as_ref());
        ctx.commit(scope).unwrap();

        assert!(resource.is_closed());
        assert!(ctx.registry().is_empty());
    }

    #[test]
    fn test_cleanup_order_constant() {
        assert_eq!(CLEANUP_SYNCHRONIZATION_ORDER, 1000);
    }
}
