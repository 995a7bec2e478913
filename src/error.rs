//! Error handling module for the provisioner
//!
//! Provides centralized error handling with proper error types using thiserror.
//! The variants mirror the failure taxonomy the step engine acts on: some are
//! recoverable (routed through the failure policy), the rest stop the run.

use thiserror::Error;

/// Main error type for the provisioner
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Host OS could not be mapped to a supported platform family
    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Orchestrator is not running with the privileges it needs
    #[error("Permission error: {0}")]
    Permission(String),

    /// Template references keys that were not supplied
    #[error("Template '{template}' references unknown placeholder(s): {}", keys.join(", "))]
    MissingPlaceholder { template: String, keys: Vec<String> },

    /// External command exited non-zero
    #[error("Command `{command}` failed (exit code {}): {stderr}", exit_code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// External command could not be started at all
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration input is invalid
    #[error("Validation error: {0}")]
    Validation(String),

    /// IO errors (file writes, reads)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Step lifecycle violated (engine bug, never a host problem)
    #[error(transparent)]
    StepState(#[from] crate::step_state::StepTransitionError),
}

/// Result type alias for provisioner operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

impl ProvisionError {
    /// Create an unsupported platform error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedPlatform(msg.into())
    }

    /// Create a permission error
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::Permission(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the failure may be handed to the failure policy.
    ///
    /// Command failures (including commands that could not be spawned) and
    /// IO errors are recoverable. Platform, permission, placeholder and
    /// validation errors always halt the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CommandFailed { .. } | Self::Spawn { .. } | Self::Io(_))
    }

    /// Exit code of the underlying command, if this error came from one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { exit_code, .. } => *exit_code,
            // Shell convention for "command not found"
            Self::Spawn { .. } => Some(127),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProvisionError::validation("admin email must be specified");
        assert_eq!(err.to_string(), "Validation error: admin email must be specified");

        let err = ProvisionError::MissingPlaceholder {
            template: "nginx.conf".to_string(),
            keys: vec!["domain".to_string(), "php_socket".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Template 'nginx.conf' references unknown placeholder(s): domain, php_socket"
        );
    }

    #[test]
    fn test_command_failed_display_without_code() {
        let err = ProvisionError::CommandFailed {
            command: "apt-get update".to_string(),
            exit_code: None,
            stderr: "killed".to_string(),
        };
        assert!(err.to_string().contains("exit code none"));
    }

    #[test]
    fn test_recoverable_classification() {
        let failed = ProvisionError::CommandFailed {
            command: "false".to_string(),
            exit_code: Some(1),
            stderr: String::new(),
        };
        assert!(failed.is_recoverable());
        assert_eq!(failed.exit_code(), Some(1));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: ProvisionError = io_err.into();
        assert!(err.is_recoverable());
        assert_eq!(err.exit_code(), None);

        assert!(!ProvisionError::unsupported("arch 0").is_recoverable());
        assert!(!ProvisionError::permission("not root").is_recoverable());
        assert!(!ProvisionError::validation("bad").is_recoverable());
    }
}
