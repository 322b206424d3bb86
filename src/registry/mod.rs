// ============================================================================
// Resource Registry
// ============================================================================
//
// Maps a factory key to the holder bound for it in one execution context.
// The registry is a plain field of `SyncContext`; it is never shared between
// contexts, so it needs no locking.
//
// Invariant: at most one binding per factory key.
//
// ============================================================================

use crate::core::{FactoryKey, Result, SyncError};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Type-erased bound value, normally an `Arc<ResourceHolder<R>>`
pub type Binding = Arc<dyn Any + Send + Sync>;

#[derive(Default)]
pub struct ResourceRegistry {
    bindings: HashMap<FactoryKey, Binding>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `binding` to `key`. Fails if the key is already bound.
    pub fn bind(&mut self, key: FactoryKey, binding: Binding) -> Result<()> {
        if self.bindings.contains_key(&key) {
            return Err(SyncError::BindingConflict(key));
        }

        debug!(%key, "Bound resource");
        self.bindings.insert(key, binding);
        Ok(())
    }

    /// Look up the value bound to `key`, downcast to `T`
    pub fn lookup<T>(&self, key: FactoryKey) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let binding = self.bindings.get(&key)?;
        match Arc::clone(binding).downcast::<T>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(%key, "Bound value has an unexpected type");
                None
            }
        }
    }

    pub fn has_binding(&self, key: FactoryKey) -> bool {
        self.bindings.contains_key(&key)
    }

    /// Remove and return the binding for `key`. Fails if nothing is bound.
    pub fn unbind(&mut self, key: FactoryKey) -> Result<Binding> {
        let binding = self
            .bindings
            .remove(&key)
            .ok_or(SyncError::NoBinding(key))?;

        debug!(%key, "Unbound resource");
        Ok(binding)
    }

    /// Non-failing variant of `unbind` for cleanup paths
    pub fn unbind_if_possible(&mut self, key: FactoryKey) -> Option<Binding> {
        let binding = self.bindings.remove(&key);
        if binding.is_some() {
            debug!(%key, "Unbound resource");
        }
        binding
    }

    pub fn keys(&self) -> Vec<FactoryKey> {
        let mut keys: Vec<FactoryKey> = self.bindings.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Current bindings ordered by key.
    ///
    /// Compare two snapshots with `same_bindings` to check key and identity.
    pub fn snapshot(&self) -> Vec<(FactoryKey, Binding)> {
        let mut entries: Vec<(FactoryKey, Binding)> = self
            .bindings
            .iter()
            .map(|(key, binding)| (*key, Arc::clone(binding)))
            .collect();
        entries.sort_by_key(|(key, _)| *key);
        entries
    }
}

/// Whether two snapshots hold the same keys bound to the same instances
pub fn same_bindings(left: &[(FactoryKey, Binding)], right: &[(FactoryKey, Binding)]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .all(|((lk, lb), (rk, rb))| lk == rk && Arc::ptr_eq(lb, rb))
}

impl std::fmt::Debug for ResourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistry")
            .field("keys", &self.keys())
            .finish()
    }
}
