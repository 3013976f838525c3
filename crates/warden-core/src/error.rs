//! Error types for Warden Core
//!
//! Provides error handling for:
//! - Policy, profile and run configuration problems
//! - Check failures (surfaced as `Error` outcomes, never aborting a run)
//! - Assessment state machine violations
//! - Target binding failures and cancellation

use crate::assessment::AssessmentState;
use crate::tokens::TokenNotFound;
use warden_remote::{RemoteError, ResolutionError};

/// Main Warden error type
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Remote execution failed
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Check failed
    #[error("check error: {0}")]
    Check(#[from] CheckError),

    /// Assessment lifecycle violated
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Target could not be bound to a transport and drush binding
    #[error("failed to bind target {target}: {reason}")]
    TargetBinding {
        /// Target identity
        target: String,
        /// Why binding failed
        reason: String,
    },

    /// Run was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Unit of work died unexpectedly
    #[error("internal error: {0}")]
    Internal(String),
}

impl WardenError {
    /// Create a binding error from a drush resolution failure
    #[inline]
    pub fn binding(target: impl Into<String>, source: &ResolutionError) -> Self {
        Self::TargetBinding {
            target: target.into(),
            reason: source.to_string(),
        }
    }

    /// Check if error came from run cancellation
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Remote(e) => e.is_cancelled(),
            Self::Check(CheckError::Remote(e)) => e.is_cancelled(),
            _ => false,
        }
    }
}

/// Configuration errors
///
/// Raised before any unit of work starts, or at a typed boundary.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// Policy references a check class that is not registered
    #[error("unknown check class: {0}")]
    UnknownCheck(String),

    /// Profile or command line references an unknown policy
    #[error("unknown policy: {0}")]
    UnknownPolicy(String),

    /// Logical drush operation outside the command table
    #[error("unsupported drush command: {0}")]
    UnsupportedCommand(String),

    /// Version constraint is not a valid pattern
    #[error("invalid constraint `{constraint}`: {source}")]
    InvalidConstraint {
        /// Offending constraint
        constraint: String,
        /// Regex compilation error
        #[source]
        source: regex::Error,
    },

    /// Dependency expression could not be parsed
    #[error("invalid expression `{expression}`: {reason}")]
    InvalidExpression {
        /// Offending expression
        expression: String,
        /// Parser diagnostic
        reason: String,
    },

    /// Integer is not a known outcome code
    #[error("invalid outcome code: {0}")]
    InvalidOutcomeCode(i32),

    /// Name is not a known severity
    #[error("invalid severity: {0}")]
    InvalidSeverity(String),

    /// Semantically invalid configuration value
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// YAML document could not be parsed
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML document could not be parsed
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration file could not be read
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl From<RemoteError> for ConfigurationError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::UnsupportedCommand(name) => Self::UnsupportedCommand(name),
            other => Self::InvalidConfig(other.to_string()),
        }
    }
}

/// Errors raised by a check while auditing
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// Remote call failed
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Token lookup failed
    #[error(transparent)]
    TokenNotFound(#[from] TokenNotFound),

    /// Configuration problem discovered while auditing
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Parameter present but of the wrong shape
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// What was wrong
        reason: String,
    },

    /// Check-specific failure
    #[error("{0}")]
    Failed(String),
}

/// Assessment lifecycle errors
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Transition not allowed by the lifecycle
    #[error("illegal state transition: {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: AssessmentState,
        /// Requested state
        to: AssessmentState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_remote::TransportError;

    #[test]
    fn cancellation_is_detected_through_layers() {
        assert!(WardenError::Cancelled.is_cancelled());
        assert!(WardenError::from(RemoteError::from(TransportError::Cancelled)).is_cancelled());
        assert!(WardenError::from(CheckError::from(RemoteError::from(
            TransportError::Cancelled
        )))
        .is_cancelled());
        assert!(!WardenError::Internal("panic".to_string()).is_cancelled());
    }

    #[test]
    fn unsupported_remote_command_maps_to_configuration_error() {
        let err = ConfigurationError::from(RemoteError::UnsupportedCommand("sqlDrop".to_string()));
        assert!(matches!(err, ConfigurationError::UnsupportedCommand(name) if name == "sqlDrop"));
    }

    #[test]
    fn binding_error_carries_target() {
        let err = WardenError::binding(
            "site-b",
            &ResolutionError::NotFound {
                candidates: vec!["drush".to_string()],
            },
        );
        assert!(err.to_string().contains("site-b"));
        assert!(err.to_string().contains("no drush binary found"));
    }
}
