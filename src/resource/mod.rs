//! Contracts for the physical resources managed by this crate.
//!
//! - `Resource`: something that can be physically closed
//! - `ResourceFactory`: produces new resources on demand, identified by a `FactoryKey`
//! - `TimeoutTarget`: a statement-like operation that accepts a request timeout
//! - `ScopedSettings`: optional read-only / isolation hints applied per scope

pub mod holder;
pub mod memory;

pub use holder::ResourceHolder;
pub use memory::{MemoryResource, MemoryResourceFactory, MemoryStatement};

use crate::core::{BoxError, FactoryKey, IsolationLevel};
use std::time::Duration;

/// A physical resource (connection, session, channel...)
pub trait Resource: Send + Sync + 'static {
    /// Physically close the resource.
    ///
    /// Implementations should tolerate being called on an already closed resource.
    fn close(&self) -> Result<(), BoxError>;
}

/// Produces physical resources
pub trait ResourceFactory: Send + Sync + 'static {
    type Resource: Resource;

    /// Registry key for resources produced by this factory
    fn key(&self) -> FactoryKey;

    /// Create a new physical resource. May block on I/O.
    fn create(&self) -> Result<Self::Resource, BoxError>;

    /// Whether a non-bound resource should actually be closed on release.
    ///
    /// Pooling wrappers return `false` to keep the resource open.
    fn should_close(&self, _resource: &Self::Resource) -> bool {
        true
    }
}

/// Statement-like operation drawn from a resource that honors a request timeout
pub trait TimeoutTarget {
    fn set_timeout(&mut self, timeout: Duration);
}

/// Resources that accept per-scope read-only and isolation settings
pub trait ScopedSettings {
    fn set_read_only(&self, read_only: bool) -> Result<(), BoxError>;

    fn is_read_only(&self) -> Result<bool, BoxError>;

    fn isolation_level(&self) -> Result<IsolationLevel, BoxError>;

    fn set_isolation_level(&self, level: IsolationLevel) -> Result<(), BoxError>;
}
