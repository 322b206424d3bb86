pub mod error;
pub mod types;

pub use error::{BoxError, Result, SyncError};
pub use types::{CompletionStatus, FactoryKey, IsolationLevel, Propagation};
