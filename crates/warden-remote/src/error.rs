//! Error types for remote execution
//!
//! Covers the failure modes of talking to a target:
//! - Transport failures (spawn, exit status, timeout, cancellation)
//! - Decode failures (missing sentinels, malformed JSON)
//! - Binary resolution failures
//! - Unsupported logical drush operations

/// Failure of the execution channel itself
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Process could not be started
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while collecting output
    #[error("i/o error while running command: {0}")]
    Io(#[from] std::io::Error),

    /// Command ran but exited unsuccessfully
    #[error("command exited with status {code:?}: {stderr}")]
    CommandFailed {
        /// Exit code, if the process was not killed by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// Command exceeded its time budget
    #[error("command timed out after {timeout_secs}s")]
    Timeout {
        /// Configured timeout
        timeout_secs: u64,
    },

    /// Command was terminated because the run was cancelled
    #[error("command cancelled")]
    Cancelled,
}

/// Output could not be framed or parsed
///
/// Every variant keeps the offending text for diagnosis.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Start sentinel not present in output
    #[error("start marker not found in output")]
    MissingStartMarker {
        /// Full output
        raw: String,
    },

    /// End sentinel not present after the start sentinel
    #[error("end marker not found after start marker")]
    MissingEndMarker {
        /// Output following the start marker
        raw: String,
    },

    /// Framed payload is not valid JSON
    #[error("invalid json payload: {source}")]
    InvalidJson {
        /// The payload that failed to parse
        raw: String,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },
}

impl DecodeError {
    /// Raw text that failed to decode
    #[inline]
    #[must_use]
    pub fn raw(&self) -> &str {
        match self {
            Self::MissingStartMarker { raw }
            | Self::MissingEndMarker { raw }
            | Self::InvalidJson { raw, .. } => raw,
        }
    }
}

/// Administration binary could not be located on the target
#[derive(Debug, thiserror::Error)]
pub enum ResolutionError {
    /// None of the candidate launchers exist
    #[error("no drush binary found (tried: {})", candidates.join(", "))]
    NotFound {
        /// Candidate locations probed
        candidates: Vec<String>,
    },

    /// Probe command itself failed
    #[error("drush resolution failed: {0}")]
    Transport(#[from] TransportError),
}

/// Umbrella error for remote operations
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Channel failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Output decoding failure
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Binary resolution failure
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// Logical operation outside the supported command table
    #[error("drush command not supported: {0}")]
    UnsupportedCommand(String),
}

impl RemoteError {
    /// Check if the failure is worth retrying by the caller
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(TransportError::Timeout { .. } | TransportError::Io(_))
        )
    }

    /// Check if the failure came from run cancellation
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_keeps_raw_text() {
        let err = DecodeError::MissingEndMarker {
            raw: "{\"a\":".to_string(),
        };
        assert_eq!(err.raw(), "{\"a\":");
    }

    #[test]
    fn resolution_error_lists_candidates() {
        let err = ResolutionError::NotFound {
            candidates: vec!["drush".to_string(), "drush-launcher".to_string()],
        };
        assert!(err.to_string().contains("drush, drush-launcher"));
    }

    #[test]
    fn remote_error_classification() {
        assert!(RemoteError::from(TransportError::Timeout { timeout_secs: 5 }).is_retryable());
        assert!(!RemoteError::UnsupportedCommand("rm".to_string()).is_retryable());
        assert!(RemoteError::from(TransportError::Cancelled).is_cancelled());
    }
}
