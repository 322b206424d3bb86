//! Everything application code usually needs in one import.
//!
//! `use txsync::prelude::*;`

pub use crate::context::{ScopeDefinition, ScopeHandle, SuspendedScope, SyncContext};
pub use crate::core::{CompletionStatus, FactoryKey, IsolationLevel, Propagation, Result, SyncError};
pub use crate::manager::{
    acquire, acquire_unmanaged, acquire_with, apply_timeout, prepare_for_scope, release,
    reset_after_scope,
};
pub use crate::resource::{Resource, ResourceFactory, ScopedSettings, TimeoutTarget};
pub use crate::synchronization::{CLEANUP_SYNCHRONIZATION_ORDER, SyncPhase, Synchronization, from_fn};
