//! In-memory resource and factory.
//!
//! Stands in for a real connection source in tests and in the demo binary.
//! Every resource records how it was used (close calls, read-only flag,
//! isolation level) so the lifecycle can be asserted on afterwards.

use super::{Resource, ResourceFactory, ScopedSettings, TimeoutTarget};
use crate::core::{BoxError, FactoryKey, IsolationLevel, SyncError};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceState {
    Open,
    Closed,
}

/// A resource that lives purely in memory
#[derive(Debug)]
pub struct MemoryResource {
    id: u64,
    state: Mutex<ResourceState>,
    close_calls: AtomicUsize,
    fail_on_close: bool,
    read_only: AtomicBool,
    isolation: Mutex<IsolationLevel>,
}

impl MemoryResource {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: Mutex::new(ResourceState::Open),
            close_calls: AtomicUsize::new(0),
            fail_on_close: false,
            read_only: AtomicBool::new(false),
            isolation: Mutex::new(IsolationLevel::ReadCommitted),
        }
    }

    /// A resource whose `close` always fails
    pub fn failing_on_close(id: u64) -> Self {
        Self {
            fail_on_close: true,
            ..Self::new(id)
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.current_state(), Ok(ResourceState::Closed))
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Draw a statement from this resource
    pub fn statement(&self, sql: &str) -> Result<MemoryStatement, SyncError> {
        if self.is_closed() {
            return Err(SyncError::ResourceError(format!(
                "Resource {} is closed",
                self.id
            )));
        }

        Ok(MemoryStatement {
            sql: sql.to_string(),
            timeout: None,
        })
    }

    fn current_state(&self) -> Result<ResourceState, SyncError> {
        self.state
            .lock()
            .map(|state| *state)
            .map_err(|e| SyncError::ResourceError(e.to_string()))
    }
}

impl Resource for MemoryResource {
    fn close(&self) -> Result<(), BoxError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_on_close {
            return Err(format!("Resource {} refused to close", self.id).into());
        }

        let mut state = self
            .state
            .lock()
            .map_err(|e| SyncError::ResourceError(e.to_string()))?;
        *state = ResourceState::Closed;
        Ok(())
    }
}

impl ScopedSettings for MemoryResource {
    fn set_read_only(&self, read_only: bool) -> Result<(), BoxError> {
        self.read_only.store(read_only, Ordering::SeqCst);
        Ok(())
    }

    fn is_read_only(&self) -> Result<bool, BoxError> {
        Ok(self.read_only.load(Ordering::SeqCst))
    }

    fn isolation_level(&self) -> Result<IsolationLevel, BoxError> {
        let level = self
            .isolation
            .lock()
            .map_err(|e| SyncError::ResourceError(e.to_string()))?;
        Ok(*level)
    }

    fn set_isolation_level(&self, level: IsolationLevel) -> Result<(), BoxError> {
        let mut current = self
            .isolation
            .lock()
            .map_err(|e| SyncError::ResourceError(e.to_string()))?;
        *current = level;
        Ok(())
    }
}

/// Statement drawn from a `MemoryResource`
#[derive(Debug, Clone)]
pub struct MemoryStatement {
    sql: String,
    timeout: Option<Duration>,
}

impl MemoryStatement {
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl TimeoutTarget for MemoryStatement {
    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }
}

/// Factory producing `MemoryResource`s
///
/// Failure switches let tests drive the error paths of the manager.
#[derive(Debug)]
pub struct MemoryResourceFactory {
    key: FactoryKey,
    next_id: AtomicU64,
    created: AtomicUsize,
    fail_on_create: AtomicBool,
    fail_on_close: AtomicBool,
    keep_open: AtomicBool,
}

impl MemoryResourceFactory {
    pub fn new() -> Self {
        Self::with_key(FactoryKey::new())
    }

    pub fn with_key(key: FactoryKey) -> Self {
        Self {
            key,
            next_id: AtomicU64::new(1),
            created: AtomicUsize::new(0),
            fail_on_create: AtomicBool::new(false),
            fail_on_close: AtomicBool::new(false),
            keep_open: AtomicBool::new(false),
        }
    }

    /// Make subsequent `create` calls fail
    pub fn fail_on_create(self, fail: bool) -> Self {
        self.fail_on_create.store(fail, Ordering::SeqCst);
        self
    }

    /// Produce resources whose `close` fails
    pub fn fail_on_close(self, fail: bool) -> Self {
        self.fail_on_close.store(fail, Ordering::SeqCst);
        self
    }

    /// Ask the manager not to close released, unbound resources
    pub fn keep_open(self, keep: bool) -> Self {
        self.keep_open.store(keep, Ordering::SeqCst);
        self
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        self.fail_on_create.store(fail, Ordering::SeqCst);
    }

    /// Number of physical resources created so far
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl Default for MemoryResourceFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceFactory for MemoryResourceFactory {
    type Resource = MemoryResource;

    fn key(&self) -> FactoryKey {
        self.key
    }

    fn create(&self) -> Result<MemoryResource, BoxError> {
        if self.fail_on_create.load(Ordering::SeqCst) {
            return Err(format!("{} is unavailable", self.key).into());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.created.fetch_add(1, Ordering::SeqCst);

        if self.fail_on_close.load(Ordering::SeqCst) {
            Ok(MemoryResource::failing_on_close(id))
        } else {
            Ok(MemoryResource::new(id))
        }
    }

    fn should_close(&self, _resource: &MemoryResource) -> bool {
        !self.keep_open.load(Ordering::SeqCst)
    }
}
