/// Scope Propagation Tests
///
/// Nested scopes on one context: joining, suspending for an independent
/// scope, running without a scope, and scope deadlines on resources.
/// Run with: cargo test --test scope_propagation_tests

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use txsync::resource::{MemoryResource, MemoryResourceFactory};
use txsync::{
    CompletionStatus, IsolationLevel, Propagation, ResourceFactory, ResourceHolder,
    ScopeDefinition, SyncContext, SyncError, SyncPhase, acquire, from_fn, manager, release,
};

#[test]
fn test_participant_shares_outer_resource() {
    let factory = Arc::new(MemoryResourceFactory::new());
    let mut ctx = SyncContext::new();

    let outer = ctx.begin(ScopeDefinition::new("outer")).unwrap();
    let outer_resource = acquire(&mut ctx, &factory).unwrap();

    let inner = ctx.begin(ScopeDefinition::new("inner")).unwrap();
    let inner_resource = acquire(&mut ctx, &factory).unwrap();
    assert!(Arc::ptr_eq(&outer_resource, &inner_resource));

    release(&ctx, Some(&inner_resource), factory.as_ref());
    ctx.commit(inner).unwrap();
    assert!(!outer_resource.is_closed(), "Participant commit does not complete the scope");

    release(&ctx, Some(&outer_resource), factory.as_ref());
    ctx.commit(outer).unwrap();
    assert!(outer_resource.is_closed());
}

#[test]
fn test_requires_new_gets_independent_resource() {
    let factory = Arc::new(MemoryResourceFactory::new());
    let mut ctx = SyncContext::new();

    let outer = ctx.begin(ScopeDefinition::new("outer")).unwrap();
    let outer_resource = acquire(&mut ctx, &factory).unwrap();
    let outer_holder: Arc<ResourceHolder<MemoryResource>> =
        ctx.registry().lookup(factory.key()).unwrap();

    let inner = ctx
        .begin(ScopeDefinition::new("inner").propagation(Propagation::RequiresNew))
        .unwrap();
    assert!(!ctx.registry().has_binding(factory.key()), "Outer binding is suspended");

    let inner_resource = acquire(&mut ctx, &factory).unwrap();
    assert!(!Arc::ptr_eq(&outer_resource, &inner_resource));
    release(&ctx, Some(&inner_resource), factory.as_ref());
    ctx.commit(inner).unwrap();

    assert!(inner_resource.is_closed());
    assert!(!outer_resource.is_closed());

    let restored: Arc<ResourceHolder<MemoryResource>> =
        ctx.registry().lookup(factory.key()).unwrap();
    assert!(Arc::ptr_eq(&restored, &outer_holder));
    assert_eq!(restored.reference_count(), 1);

    ctx.commit(outer).unwrap();
    assert!(outer_resource.is_closed());
    assert_eq!(factory.created_count(), 2);
}

#[test]
fn test_not_supported_uses_unbound_resources() {
    let factory = Arc::new(MemoryResourceFactory::new());
    let mut ctx = SyncContext::new();

    let outer = ctx.begin(ScopeDefinition::new("outer")).unwrap();
    let outer_resource = acquire(&mut ctx, &factory).unwrap();

    let unscoped = ctx
        .begin(ScopeDefinition::new("report").propagation(Propagation::NotSupported))
        .unwrap();
    let plain = acquire(&mut ctx, &factory).unwrap();
    assert!(!Arc::ptr_eq(&outer_resource, &plain));
    assert!(ctx.registry().is_empty());

    release(&ctx, Some(&plain), factory.as_ref());
    assert!(plain.is_closed());
    ctx.commit(unscoped).unwrap();

    assert!(ctx.registry().has_binding(factory.key()));
    ctx.rollback(outer).unwrap();
    assert!(outer_resource.is_closed());
}

#[test]
fn test_nested_rollback_rolls_back_outer() {
    let factory = Arc::new(MemoryResourceFactory::new());
    let mut ctx = SyncContext::new();

    let outer = ctx.begin(ScopeDefinition::new("outer")).unwrap();
    let resource = acquire(&mut ctx, &factory).unwrap();

    let inner = ctx.begin(ScopeDefinition::new("inner")).unwrap();
    ctx.rollback(inner).unwrap();

    let result = ctx.commit(outer);
    assert!(matches!(result, Err(SyncError::UnexpectedRollback(_))));
    assert!(resource.is_closed(), "Cleanup still runs on the rollback path");
    assert!(ctx.registry().is_empty());
}

#[test]
fn test_scope_timeout_reaches_statements() {
    let factory = Arc::new(MemoryResourceFactory::new());
    let mut ctx = SyncContext::new();

    let scope = ctx
        .begin("PROPAGATION_REQUIRED,timeout_20".parse::<ScopeDefinition>().unwrap())
        .unwrap();
    let resource = acquire(&mut ctx, &factory).unwrap();

    let mut statement = resource.statement("UPDATE accounts SET balance = 0").unwrap();
    manager::apply_timeout(&ctx, &mut statement, factory.as_ref()).unwrap();

    let timeout = statement.timeout().unwrap();
    assert!(timeout <= Duration::from_secs(20));
    assert!(timeout > Duration::from_secs(19));

    ctx.commit(scope).unwrap();
}

#[test]
fn test_expired_deadline_rolls_back_commit() {
    let factory = Arc::new(MemoryResourceFactory::new());
    let mut ctx = SyncContext::new();

    let scope = ctx
        .begin(ScopeDefinition::new("slow").timeout(Duration::from_secs(30)))
        .unwrap();
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&statuses);
    ctx.register_synchronization(Box::new(from_fn(0, move |phase, _| {
        if let SyncPhase::AfterCompletion(status) = phase {
            log.lock().unwrap().push(status);
        }
        Ok(())
    })))
    .unwrap();

    let resource = acquire(&mut ctx, &factory).unwrap();
    let holder: Arc<ResourceHolder<MemoryResource>> =
        ctx.registry().lookup(factory.key()).unwrap();
    holder.set_deadline(Instant::now() - Duration::from_millis(1));

    let mut statement = resource.statement("UPDATE accounts SET balance = 0").unwrap();
    let applied = manager::apply_timeout(&ctx, &mut statement, factory.as_ref());
    assert!(matches!(applied, Err(SyncError::TimedOut { .. })));
    assert!(ctx.is_rollback_only(), "Expired holder dooms the scope");

    let result = ctx.commit(scope);
    assert!(matches!(result, Err(SyncError::UnexpectedRollback(_))));
    assert_eq!(*statuses.lock().unwrap(), vec![CompletionStatus::RolledBack]);
    assert!(resource.is_closed());
    assert!(ctx.registry().is_empty());
}

#[test]
fn test_prepare_resource_for_scope() {
    let factory = Arc::new(MemoryResourceFactory::new());
    let mut ctx = SyncContext::new();
    let definition = ScopeDefinition::new("reporting")
        .read_only(true)
        .isolation(IsolationLevel::RepeatableRead);

    let scope = ctx.begin(definition.clone()).unwrap();
    assert_eq!(ctx.current_isolation_level(), Some(IsolationLevel::RepeatableRead));

    let resource = acquire(&mut ctx, &factory).unwrap();
    let previous = manager::prepare_for_scope(resource.as_ref(), &definition).unwrap();
    assert_eq!(previous, Some(IsolationLevel::ReadCommitted));

    manager::reset_after_scope(resource.as_ref(), previous);
    release(&ctx, Some(&resource), factory.as_ref());
    ctx.commit(scope).unwrap();
    assert!(resource.is_closed());
}

#[test]
fn test_in_scope_releases_on_error() {
    let factory = Arc::new(MemoryResourceFactory::new());
    let mut ctx = SyncContext::new();
    let mut seen = None;

    let result: txsync::Result<()> = ctx.in_scope(ScopeDefinition::new("work"), |ctx| {
        let resource = acquire(ctx, &factory)?;
        seen = Some(Arc::clone(&resource));
        Err(SyncError::ResourceError("business rule violated".into()))
    });

    assert!(result.is_err());
    assert!(seen.unwrap().is_closed());
    assert!(ctx.registry().is_empty());
}
