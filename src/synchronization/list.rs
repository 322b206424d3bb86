use super::{SyncPhase, Synchronization};
use crate::core::SyncError;
use crate::registry::ResourceRegistry;
use tracing::{error, trace};

/// Ordered callback list of one scope
#[derive(Default)]
pub struct SynchronizationList {
    entries: Vec<Box<dyn Synchronization>>,
}

/// Outcome of delivering one phase to every callback
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub invoked: usize,
    pub failures: Vec<SyncError>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// First failure, if any
    pub fn into_result(self) -> crate::core::Result<()> {
        match self.failures.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl SynchronizationList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, synchronization: Box<dyn Synchronization>) {
        self.entries.push(synchronization);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any callback reports its state as rollback-only
    pub fn is_rollback_only(&self) -> bool {
        self.entries.iter().any(|s| s.is_rollback_only())
    }

    /// Order values in invocation order
    pub fn orders(&mut self) -> Vec<i32> {
        self.sort();
        self.entries.iter().map(|s| s.order()).collect()
    }

    fn sort(&mut self) {
        // stable: equal orders keep registration order
        self.entries.sort_by_key(|s| s.order());
    }

    /// Deliver `phase` to every callback in ascending order.
    ///
    /// Failures are logged and collected; they never cut the phase short.
    pub fn dispatch(&mut self, phase: SyncPhase, registry: &mut ResourceRegistry) -> DispatchReport {
        self.sort();

        let mut report = DispatchReport::default();
        for synchronization in self.entries.iter_mut() {
            trace!(
                %phase,
                order = synchronization.order(),
                callback = %synchronization.describe(),
                "Invoking synchronization"
            );
            report.invoked += 1;

            if let Err(e) = synchronization.on_phase(phase, registry) {
                error!(
                    %phase,
                    callback = %synchronization.describe(),
                    error = %e,
                    "Synchronization failed, continuing with remaining callbacks"
                );
                report.failures.push(match e {
                    err @ SyncError::BindingConflict(_) => err,
                    other => SyncError::callback(phase, other.to_string()),
                });
            }
        }

        report
    }
}

impl std::fmt::Debug for SynchronizationList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|s| (s.order(), s.describe())))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::super::{CLEANUP_SYNCHRONIZATION_ORDER, from_fn};
    use super::*;
    use crate::core::{CompletionStatus, FactoryKey};
    use std::sync::{Arc, Mutex};

    fn recorder(order: i32, log: &Arc<Mutex<Vec<i32>>>) -> Box<dyn Synchronization> {
        let log = Arc::clone(log);
        Box::new(from_fn(order, move |_, _| {
            log.lock().unwrap().push(order);
            Ok(())
        }))
    }

    #[test]
    fn test_ascending_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = SynchronizationList::new();
        list.register(recorder(500, &log));
        list.register(recorder(CLEANUP_SYNCHRONIZATION_ORDER, &log));
        list.register(recorder(10, &log));

        let mut registry = ResourceRegistry::new();
        let report = list.dispatch(
            SyncPhase::AfterCompletion(CompletionStatus::Committed),
            &mut registry,
        );

        assert!(report.is_clean());
        assert_eq!(report.invoked, 3);
        assert_eq!(*log.lock().unwrap(), vec![10, 500, CLEANUP_SYNCHRONIZATION_ORDER]);
    }

    #[test]
    fn test_equal_orders_keep_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = SynchronizationList::new();

        for tag in [1, 2, 3] {
            let log = Arc::clone(&log);
            list.register(Box::new(from_fn(7, move |_, _| {
                log.lock().unwrap().push(tag);
                Ok(())
            })));
        }

        let mut registry = ResourceRegistry::new();
        list.dispatch(SyncPhase::Suspend, &mut registry);
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_failure_does_not_stop_phase() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = SynchronizationList::new();
        list.register(Box::new(from_fn(1, |_, _| {
            Err(SyncError::ResourceError("boom".into()))
        })));
        list.register(recorder(2, &log));

        let mut registry = ResourceRegistry::new();
        let report = list.dispatch(
            SyncPhase::BeforeCompletion(CompletionStatus::RolledBack),
            &mut registry,
        );

        assert_eq!(report.invoked, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(*log.lock().unwrap(), vec![2]);
        assert!(matches!(
            report.into_result(),
            Err(SyncError::CallbackFailed { .. })
        ));
    }

    #[test]
    fn test_binding_conflict_is_reported_verbatim() {
        let key = FactoryKey::new();
        let mut list = SynchronizationList::new();
        list.register(Box::new(from_fn(1, move |_, _| {
            Err(SyncError::BindingConflict(key))
        })));

        let mut registry = ResourceRegistry::new();
        let report = list.dispatch(SyncPhase::Resume, &mut registry);
        assert!(matches!(
            report.into_result(),
            Err(SyncError::BindingConflict(k)) if k == key
        ));
    }

    #[test]
    fn test_orders() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut list = SynchronizationList::new();
        list.register(recorder(3, &log));
        list.register(recorder(-1, &log));

        assert_eq!(list.orders(), vec![-1, 3]);
        assert_eq!(list.len(), 2);
        assert!(log.lock().unwrap().is_empty());
    }
}
