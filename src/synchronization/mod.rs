// ============================================================================
// Scope Synchronization Callbacks
// ============================================================================
//
// Callbacks registered against the active scope. Each one carries an order
// value; at every phase the list is invoked in ascending order (stable for
// equal orders). A failing callback is logged and skipped over, the remaining
// callbacks of the phase still run.
//
// ============================================================================

pub mod list;

pub use list::{DispatchReport, SynchronizationList};

use crate::core::{CompletionStatus, Result};
use crate::registry::ResourceRegistry;

/// Default order value of callbacks
pub const LOWEST_PRECEDENCE: i32 = i32::MAX;

/// Order value of resource cleanup callbacks.
///
/// High enough that user-level synchronizations (usually lower numbers) run first.
pub const CLEANUP_SYNCHRONIZATION_ORDER: i32 = 1000;

/// Lifecycle phase delivered to synchronizations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// The scope is being suspended; unbind anything bound for it
    Suspend,
    /// The scope is being resumed; rebind what was unbound on suspend
    Resume,
    /// About to commit. Only delivered on the commit path.
    BeforeCommit { read_only: bool },
    /// About to complete with the given intended outcome
    BeforeCompletion(CompletionStatus),
    /// Completed with the given outcome
    AfterCompletion(CompletionStatus),
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncPhase::Suspend => write!(f, "suspend"),
            SyncPhase::Resume => write!(f, "resume"),
            SyncPhase::BeforeCommit { read_only } => {
                write!(f, "before-commit (read_only={})", read_only)
            }
            SyncPhase::BeforeCompletion(status) => write!(f, "before-completion ({})", status),
            SyncPhase::AfterCompletion(status) => write!(f, "after-completion ({})", status),
        }
    }
}

/// Callback invoked at the phases of a scope's lifecycle
pub trait Synchronization: Send {
    fn order(&self) -> i32 {
        LOWEST_PRECEDENCE
    }

    /// Label used in log output
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }

    /// Whether the state guarded by this callback can no longer be committed
    fn is_rollback_only(&self) -> bool {
        false
    }

    fn on_phase(&mut self, phase: SyncPhase, registry: &mut ResourceRegistry) -> Result<()>;
}

/// Closure-backed synchronization, see [`from_fn`]
pub struct FnSynchronization<F> {
    order: i32,
    label: String,
    callback: F,
}

impl<F> FnSynchronization<F> {
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

/// Wrap a closure as a synchronization with the given order
pub fn from_fn<F>(order: i32, callback: F) -> FnSynchronization<F>
where
    F: FnMut(SyncPhase, &mut ResourceRegistry) -> Result<()> + Send,
{
    FnSynchronization {
        order,
        label: format!("fn@{}", order),
        callback,
    }
}

impl<F> Synchronization for FnSynchronization<F>
where
    F: FnMut(SyncPhase, &mut ResourceRegistry) -> Result<()> + Send,
{
    fn order(&self) -> i32 {
        self.order
    }

    fn describe(&self) -> String {
        self.label.clone()
    }

    fn on_phase(&mut self, phase: SyncPhase, registry: &mut ResourceRegistry) -> Result<()> {
        (self.callback)(phase, registry)
    }
}
