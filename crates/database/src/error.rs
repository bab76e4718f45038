//! Error types for credential issuance
use std::time::Duration;

use thiserror::Error;

/// Boxed error produced by external collaborators (storage, connectors, targets).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for credential issuance
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by
/// [`DatabaseBackend::issue_credentials`](crate::DatabaseBackend::issue_credentials) and the
/// components it drives.
#[derive(Error, Debug)]
pub enum Error {
    /// The requested role does not exist
    #[error("unknown role: {role}")]
    NotFound {
        /// The requested role name
        role: String,
    },

    /// The role is not on its target's allow-list
    #[error("permission denied")]
    PermissionDenied,

    /// No usable connection to the target could be established
    #[error("could not retrieve connection for target '{target}': {source}")]
    Connection {
        /// The target name
        target: String,
        /// The underlying cause
        #[source]
        source: BoxError,
    },

    /// The target rejected or failed the credential-creation call
    #[error("failed to create credentials on target '{target}': {source}")]
    Generation {
        /// The target name
        target: String,
        /// Whether the failure indicates the connection itself is dead
        connection_fatal: bool,
        /// The underlying cause
        #[source]
        source: BoxError,
    },

    /// The storage backend failed while looking up roles or targets
    #[error("storage lookup for '{key}' failed: {source}")]
    Storage {
        /// The key being read
        key: String,
        /// The underlying cause
        #[source]
        source: BoxError,
    },

    /// Stored or supplied configuration is inconsistent
    #[error("configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a connection error for `target`
    pub fn connection(target: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Connection {
            target: target.into(),
            source: source.into(),
        }
    }

    /// Whether the caller may retry without risking duplicate side effects.
    ///
    /// Connection and storage failures happen before anything is created on
    /// the target.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Storage { .. })
    }

    /// Whether the target may already hold a principal created by this request.
    #[must_use]
    pub fn may_have_side_effects(&self) -> bool {
        matches!(self, Self::Generation { .. })
    }

    /// Expected, caller-facing conditions that are not system faults.
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::PermissionDenied)
    }

    /// Whether the error shows the pooled connection can no longer be used.
    #[must_use]
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            Self::Generation {
                connection_fatal: true,
                ..
            }
        )
    }

    /// Target name associated with this error (if any)
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Connection { target, .. } | Self::Generation { target, .. } => Some(target),
            Self::NotFound { .. }
            | Self::PermissionDenied
            | Self::Storage { .. }
            | Self::Configuration { .. } => None,
        }
    }
}

/// Cause attached to a connection or generation error when the operation
/// did not run to completion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Interrupted {
    /// The request's cancellation token fired
    #[error("{operation} cancelled")]
    Cancelled {
        /// The interrupted operation
        operation: &'static str,
    },

    /// The request deadline or an operation timeout elapsed
    #[error("{operation} timed out after {elapsed:?}")]
    TimedOut {
        /// The interrupted operation
        operation: &'static str,
        /// The budget that was exhausted
        elapsed: Duration,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation(fatal: bool) -> Error {
        Error::Generation {
            target: "pg".into(),
            connection_fatal: fatal,
            source: "boom".into(),
        }
    }

    #[test]
    fn retry_classification() {
        assert!(Error::connection("pg", "refused").is_retryable());
        assert!(!Error::connection("pg", "refused").may_have_side_effects());
        assert!(!generation(false).is_retryable());
        assert!(generation(false).may_have_side_effects());
        assert!(!Error::PermissionDenied.is_retryable());
    }

    #[test]
    fn user_errors_are_soft() {
        assert!(Error::NotFound { role: "r".into() }.is_user_error());
        assert!(Error::PermissionDenied.is_user_error());
        assert!(!Error::connection("pg", "refused").is_user_error());
    }

    #[test]
    fn connection_fatal_only_for_flagged_generation() {
        assert!(generation(true).is_connection_fatal());
        assert!(!generation(false).is_connection_fatal());
        assert!(!Error::connection("pg", "refused").is_connection_fatal());
    }

    #[test]
    fn permission_denied_does_not_name_role() {
        assert_eq!(Error::PermissionDenied.to_string(), "permission denied");
    }

    #[test]
    fn target_accessor() {
        assert_eq!(Error::connection("pg", "x").target(), Some("pg"));
        assert_eq!(Error::PermissionDenied.target(), None);
    }

    #[test]
    fn interrupted_display() {
        let err = Interrupted::TimedOut {
            operation: "connect",
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "connect timed out after 1.5s");
    }
}
