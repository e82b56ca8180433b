//! Error types for gateway operations.

use std::time::Duration;

use thiserror::Error;

/// Coarse classification of a failure, as surfaced to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A path or command fell outside the allow-list.
    AccessDenied,
    /// An unknown handler or a missing required field.
    NotFound,
    /// The underlying storage or process call failed.
    IoFailure,
    /// Shell execution exceeded its deadline.
    Timeout,
    /// The external explanation backend failed.
    UpstreamFailure,
    /// The interpreter found no grammar match. This is a guided response, not an error.
    Unrecognized,
}

/// Errors produced by the gateway's operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A filesystem path resolved outside every allow-listed root.
    #[error("Access Denied")]
    AccessDenied {
        /// The path as supplied by the caller.
        path: String,
    },
    /// A shell command's leading token is not allow-listed.
    #[error("Command not allowed: {command}")]
    CommandDenied {
        /// The rejected command line.
        command: String,
    },
    /// Underlying I/O failure, passed through.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// The originating error.
        #[source]
        source: std::io::Error,
    },
    /// Shell execution exceeded the configured deadline.
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
    /// The explanation backend returned an error.
    #[error("{0}")]
    Upstream(String),
    /// A named entity does not exist.
    #[error("{0}")]
    NotFound(String),
    /// A task is missing a required field or has the wrong shape.
    #[error("{0}")]
    InvalidTask(String),
}

impl GatewayError {
    /// Wrap an I/O error with a short description of the attempted operation.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        GatewayError::Io {
            context: context.into(),
            source,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::AccessDenied { .. } | GatewayError::CommandDenied { .. } => {
                ErrorKind::AccessDenied
            }
            GatewayError::Io { .. } => ErrorKind::IoFailure,
            GatewayError::Timeout(_) => ErrorKind::Timeout,
            GatewayError::Upstream(_) => ErrorKind::UpstreamFailure,
            GatewayError::NotFound(_) | GatewayError::InvalidTask(_) => ErrorKind::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_message() {
        let err = GatewayError::AccessDenied {
            path: "/etc/passwd".to_string(),
        };
        assert_eq!(err.to_string(), "Access Denied");
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
    }

    #[test]
    fn test_command_denied_is_access_denied() {
        let err = GatewayError::CommandDenied {
            command: "rm -rf /".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::AccessDenied);
        assert!(err.to_string().contains("rm -rf /"));
    }

    #[test]
    fn test_io_message_includes_context() {
        let err = GatewayError::io(
            "reading /tmp/x",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert_eq!(err.to_string(), "reading /tmp/x: gone");
    }

    #[test]
    fn test_timeout_kind() {
        let err = GatewayError::Timeout(Duration::from_secs(5));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().contains("5s"));
    }
}
