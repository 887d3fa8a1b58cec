//! Unified error types for the Berth workspace.
//!
//! Every provisioning failure is fatal: callers propagate these errors and
//! never retry a step.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ProvisionState;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum BerthError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// The recipe has a syntax or semantic error.
    #[error("recipe line {line}: {message}")]
    Parse {
        /// 1-based line of the offending instruction (0 for whole-file checks).
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// A dependency manifest is missing or malformed.
    #[error("manifest {path} line {line}: {message}")]
    Manifest {
        /// Manifest file.
        path: PathBuf,
        /// 1-based line number (0 when the file itself is the problem).
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// An external command run by a provisioning step failed.
    #[error("step '{step}' failed: `{command}` exited with {status}")]
    StepFailed {
        /// Name of the provisioning step.
        step: &'static str,
        /// Command line that was executed.
        command: String,
        /// Exit status description.
        status: String,
    },

    /// The provisioning state machine was asked to move backwards or skip.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: ProvisionState,
        /// Requested state.
        to: ProvisionState,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl BerthError {
    /// Builds an [`BerthError::Io`] for `path`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, BerthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_names_the_line() {
        let err = BerthError::Parse {
            line: 4,
            message: "unknown instruction VOLUME".into(),
        };
        assert_eq!(err.to_string(), "recipe line 4: unknown instruction VOLUME");
    }

    #[test]
    fn transition_error_uses_state_names() {
        let err = BerthError::InvalidTransition {
            from: ProvisionState::Running,
            to: ProvisionState::RootEstablished,
        };
        assert_eq!(
            err.to_string(),
            "invalid state transition: RUNNING -> ROOT_ESTABLISHED"
        );
    }
}
