use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global factory key counter
static NEXT_FACTORY_KEY: AtomicU64 = AtomicU64::new(1);

/// Identity of a resource factory inside a context registry.
///
/// Keys compare structurally, so two factories sharing a key are treated as the
/// same logical resource source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FactoryKey(u64);

impl FactoryKey {
    /// Allocate a new process-unique key
    pub fn new() -> Self {
        FactoryKey(NEXT_FACTORY_KEY.fetch_add(1, Ordering::SeqCst))
    }

    pub fn from_raw(raw: u64) -> Self {
        FactoryKey(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for FactoryKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FactoryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "factory_{}", self.0)
    }
}

/// Outcome reported to synchronizations when a scope completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    Committed,
    RolledBack,
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompletionStatus::Committed => write!(f, "COMMITTED"),
            CompletionStatus::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// Isolation levels a scope may request from its resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn descriptor(&self) -> &'static str {
        match self {
            Self::ReadUncommitted => "ISOLATION_READ_UNCOMMITTED",
            Self::ReadCommitted => "ISOLATION_READ_COMMITTED",
            Self::RepeatableRead => "ISOLATION_REPEATABLE_READ",
            Self::Serializable => "ISOLATION_SERIALIZABLE",
        }
    }

    pub fn from_descriptor(token: &str) -> Option<Self> {
        match token {
            "ISOLATION_READ_UNCOMMITTED" => Some(Self::ReadUncommitted),
            "ISOLATION_READ_COMMITTED" => Some(Self::ReadCommitted),
            "ISOLATION_REPEATABLE_READ" => Some(Self::RepeatableRead),
            "ISOLATION_SERIALIZABLE" => Some(Self::Serializable),
            _ => None,
        }
    }
}

impl std::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.descriptor())
    }
}

/// How `begin` treats a scope that is already active in the context
///
/// ```text
/// Required     ── active? ──yes──> join (participating handle)
///                        └─no───> open new scope
/// RequiresNew  ── suspend active (if any) ──> open new scope
/// NotSupported ── suspend active (if any) ──> run without scope
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Propagation {
    #[default]
    Required,
    RequiresNew,
    NotSupported,
}

impl Propagation {
    pub fn descriptor(&self) -> &'static str {
        match self {
            Self::Required => "PROPAGATION_REQUIRED",
            Self::RequiresNew => "PROPAGATION_REQUIRES_NEW",
            Self::NotSupported => "PROPAGATION_NOT_SUPPORTED",
        }
    }

    pub fn from_descriptor(token: &str) -> Option<Self> {
        match token {
            "PROPAGATION_REQUIRED" => Some(Self::Required),
            "PROPAGATION_REQUIRES_NEW" => Some(Self::RequiresNew),
            "PROPAGATION_NOT_SUPPORTED" => Some(Self::NotSupported),
            _ => None,
        }
    }
}

impl std::fmt::Display for Propagation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.descriptor())
    }
}
