use crate::core::{IsolationLevel, Propagation, Result, SyncError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

const READ_ONLY_TOKEN: &str = "readOnly";
const TIMEOUT_PREFIX: &str = "timeout_";

/// Attributes of a scope to begin
///
/// Built with chained setters, parsed from a descriptor string, or loaded
/// from JSON.
///
/// # Examples
///
/// ```
/// use txsync::{Propagation, ScopeDefinition};
/// use std::time::Duration;
///
/// let definition = ScopeDefinition::new("transfer")
///     .propagation(Propagation::RequiresNew)
///     .read_only(true)
///     .timeout(Duration::from_secs(30));
///
/// assert_eq!(
///     definition.to_descriptor(),
///     "PROPAGATION_REQUIRES_NEW,readOnly,timeout_30"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeDefinition {
    /// Scope name, used in log output
    pub name: Option<String>,

    pub propagation: Propagation,

    /// Isolation level requested from resources, `None` keeps their default
    pub isolation: Option<IsolationLevel>,

    /// Read-only hint for resources
    pub read_only: bool,

    /// Deadline applied to resources bound in the scope
    pub timeout: Option<Duration>,
}

impl ScopeDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn propagation(mut self, propagation: Propagation) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    /// Load a definition from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let definition: Self = serde_json::from_str(json)
            .map_err(|e| SyncError::InvalidDefinition(e.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Descriptor string, e.g. `PROPAGATION_REQUIRED,ISOLATION_SERIALIZABLE,readOnly,timeout_10`
    pub fn to_descriptor(&self) -> String {
        let mut tokens = vec![self.propagation.descriptor().to_string()];
        if let Some(isolation) = self.isolation {
            tokens.push(isolation.descriptor().to_string());
        }
        if self.read_only {
            tokens.push(READ_ONLY_TOKEN.to_string());
        }
        if let Some(timeout) = self.timeout {
            tokens.push(format!("{}{}", TIMEOUT_PREFIX, timeout.as_secs()));
        }
        tokens.join(",")
    }

    pub fn validate(&self) -> Result<()> {
        if matches!(self.name.as_deref(), Some("")) {
            return Err(SyncError::InvalidDefinition(
                "Scope name cannot be empty".into(),
            ));
        }

        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(SyncError::InvalidDefinition("timeout must be > 0".into()));
        }

        if self.propagation == Propagation::NotSupported
            && (self.isolation.is_some() || self.timeout.is_some())
        {
            return Err(SyncError::InvalidDefinition(format!(
                "{} runs without a scope and cannot carry isolation or timeout",
                self.propagation
            )));
        }

        Ok(())
    }
}

impl FromStr for ScopeDefinition {
    type Err = SyncError;

    fn from_str(descriptor: &str) -> Result<Self> {
        let mut definition = ScopeDefinition::default();

        for token in descriptor.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if let Some(propagation) = Propagation::from_descriptor(token) {
                definition.propagation = propagation;
            } else if let Some(isolation) = IsolationLevel::from_descriptor(token) {
                definition.isolation = Some(isolation);
            } else if token == "ISOLATION_DEFAULT" {
                definition.isolation = None;
            } else if token == READ_ONLY_TOKEN {
                definition.read_only = true;
            } else if let Some(seconds) = token.strip_prefix(TIMEOUT_PREFIX) {
                let seconds: u64 = seconds.parse().map_err(|_| {
                    SyncError::InvalidDefinition(format!("Invalid timeout token '{}'", token))
                })?;
                definition.timeout = Some(Duration::from_secs(seconds));
            } else {
                return Err(SyncError::InvalidDefinition(format!(
                    "Unknown descriptor token '{}'",
                    token
                )));
            }
        }

        definition.validate()?;
        Ok(definition)
    }
}

impl std::fmt::Display for ScopeDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]", self.display_name(), self.to_descriptor())
    }
}
