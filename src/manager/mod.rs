//! Acquire and release resources against a `SyncContext`.
//!
//! Within an active scope every factory yields at most one physical resource:
//! the first `acquire` binds it, later calls reuse it, and `release` only
//! decrements the holder's count. The physical close is left to the
//! `ResourceSynchronization` registered with the scope.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use txsync::{ScopeDefinition, SyncContext, manager};
//! use txsync::resource::MemoryResourceFactory;
//!
//! # fn main() -> txsync::Result<()> {
//! let factory = Arc::new(MemoryResourceFactory::new());
//! let mut ctx = SyncContext::new();
//!
//! let scope = ctx.begin(ScopeDefinition::new("transfer"))?;
//! let first = manager::acquire(&mut ctx, &factory)?;
//! let second = manager::acquire(&mut ctx, &factory)?;
//! assert!(Arc::ptr_eq(&first, &second));
//!
//! manager::release(&ctx, Some(&first), factory.as_ref());
//! manager::release(&ctx, Some(&second), factory.as_ref());
//! assert!(!first.is_closed());
//!
//! ctx.commit(scope)?;
//! assert!(first.is_closed());
//! # Ok(())
//! # }
//! ```

pub mod cleanup;

pub use cleanup::ResourceSynchronization;

use crate::context::{ScopeDefinition, SyncContext};
use crate::core::{BoxError, IsolationLevel, Result, SyncError};
use crate::resource::{Resource, ResourceFactory, ResourceHolder, ScopedSettings, TimeoutTarget};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Get a resource for `factory`, joining the active scope if there is one
pub fn acquire<F: ResourceFactory>(
    ctx: &mut SyncContext,
    factory: &Arc<F>,
) -> Result<Arc<F::Resource>> {
    acquire_with(ctx, factory, true)
}

/// Get a resource for `factory`.
///
/// A resource already bound in the context is reused. Otherwise a new one is
/// created and, when synchronization is active and `participate` is set, bound
/// for the rest of the scope with a cleanup callback registered. Creation
/// failures leave the context untouched.
pub fn acquire_with<F: ResourceFactory>(
    ctx: &mut SyncContext,
    factory: &Arc<F>,
    participate: bool,
) -> Result<Arc<F::Resource>> {
    let key = factory.key();

    if let Some(holder) = ctx.registry().lookup::<ResourceHolder<F::Resource>>(key) {
        holder.requested();
        return Ok(Arc::clone(holder.resource()));
    }

    if ctx.registry().has_binding(key) {
        // something of another type is bound under this key
        return Err(SyncError::BindingConflict(key));
    }

    debug!(%key, "Opening resource");
    let resource = Arc::new(create(factory.as_ref())?);

    if participate && ctx.is_synchronization_active() {
        debug!(%key, "Registering scope synchronization for resource");
        // Same resource for further work in this scope; the binding is removed
        // by the synchronization at completion.
        let holder = Arc::new(ResourceHolder::new(Arc::clone(&resource)));
        if let Some(deadline) = ctx.scope_deadline() {
            holder.set_deadline(deadline);
        }
        holder.set_synchronized_with_scope(true);

        ctx.registry_mut().bind(key, holder.clone())?;
        ctx.register_synchronization(Box::new(ResourceSynchronization::new(
            Arc::clone(&holder),
            Arc::clone(factory),
        )))?;
        holder.requested();
    }

    Ok(resource)
}

/// Get a fresh resource that is never bound, regardless of any active scope
pub fn acquire_unmanaged<F: ResourceFactory>(factory: &F) -> Result<Arc<F::Resource>> {
    debug!(key = %factory.key(), "Opening unmanaged resource");
    Ok(Arc::new(create(factory)?))
}

fn create<F: ResourceFactory>(factory: &F) -> Result<F::Resource> {
    factory
        .create()
        .map_err(|source| SyncError::AcquisitionFailure {
            key: factory.key(),
            source,
        })
}

/// Give a resource back.
///
/// `None` is ignored. The resource bound in `ctx` for this factory is only
/// marked released; any other resource is closed right away unless the
/// factory asks to keep it open. Close failures are logged, never returned.
pub fn release<F: ResourceFactory>(
    ctx: &SyncContext,
    resource: Option<&Arc<F::Resource>>,
    factory: &F,
) {
    let Some(resource) = resource else {
        return;
    };

    if let Some(holder) = ctx
        .registry()
        .lookup::<ResourceHolder<F::Resource>>(factory.key())
    {
        if holder.holds(resource) {
            // scope-bound: the cleanup callback closes it
            holder.released();
            return;
        }
    }

    release_unbound(resource, factory);
}

/// Close a resource that is not bound in any context, logging failures
pub(crate) fn release_unbound<F: ResourceFactory>(resource: &Arc<F::Resource>, factory: &F) {
    if let Err(source) = close_if_necessary(resource, factory) {
        let err = SyncError::ReleaseFailure {
            key: factory.key(),
            source,
        };
        error!(error = %err, "Could not close resource");
    }
}

fn close_if_necessary<F: ResourceFactory>(
    resource: &Arc<F::Resource>,
    factory: &F,
) -> std::result::Result<(), BoxError> {
    if !factory.should_close(resource) {
        debug!(key = %factory.key(), "Factory keeps resource open");
        return Ok(());
    }

    debug!(key = %factory.key(), "Closing resource");
    resource.close()
}

/// Push the remaining scope time of the bound holder onto `target`.
///
/// Does nothing when no holder is bound or the holder has no deadline.
/// Fails with `TimedOut` once the deadline has passed.
pub fn apply_timeout<F, T>(ctx: &SyncContext, target: &mut T, factory: &F) -> Result<()>
where
    F: ResourceFactory,
    T: TimeoutTarget,
{
    let Some(holder) = ctx
        .registry()
        .lookup::<ResourceHolder<F::Resource>>(factory.key())
    else {
        return Ok(());
    };

    if holder.has_timeout() {
        let remaining = holder.time_to_live()?;
        target.set_timeout(remaining);
    }
    Ok(())
}

/// Apply the read-only hint and isolation level of `definition` to a resource.
///
/// Returns the previous isolation level when it was changed, to hand back
/// to [`reset_after_scope`]. The read-only hint is best effort.
pub fn prepare_for_scope<R>(
    resource: &R,
    definition: &ScopeDefinition,
) -> Result<Option<IsolationLevel>>
where
    R: ScopedSettings + ?Sized,
{
    if definition.read_only {
        debug!("Setting resource read-only");
        if let Err(e) = resource.set_read_only(true) {
            debug!(error = %e, "Could not set resource read-only");
        }
    }

    let Some(level) = definition.isolation else {
        return Ok(None);
    };

    let previous = resource
        .isolation_level()
        .map_err(|e| SyncError::ResourceError(e.to_string()))?;
    debug!(%level, %previous, "Changing isolation level of resource");
    resource
        .set_isolation_level(level)
        .map_err(|e| SyncError::ResourceError(e.to_string()))?;

    Ok(Some(previous))
}

/// Undo [`prepare_for_scope`]. Failures are logged, never returned.
pub fn reset_after_scope<R>(resource: &R, previous_isolation: Option<IsolationLevel>)
where
    R: ScopedSettings + ?Sized,
{
    if let Some(level) = previous_isolation {
        debug!(%level, "Resetting isolation level of resource");
        if let Err(e) = resource.set_isolation_level(level) {
            info!(error = %e, "Could not reset resource isolation level");
        }
    }

    match resource.is_read_only() {
        Ok(true) => {
            debug!("Resetting read-only flag of resource");
            if let Err(e) = resource.set_read_only(false) {
                info!(error = %e, "Could not reset resource read-only flag");
            }
        }
        Ok(false) => {}
        Err(e) => warn!(error = %e, "Could not read resource read-only flag"),
    }
}
