//! Common error types shared across `dockside` crates.

use std::fmt;

use thiserror::Error;

/// Kind of engine resource an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Container,
    Image,
    Network,
    Volume,
    Exec,
}

impl ResourceKind {
    /// Returns the lowercase name used in error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Image => "image",
            Self::Network => "network",
            Self::Volume => "volume",
            Self::Exec => "exec",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common errors that occur across multiple `dockside` crates.
///
/// Crate-specific errors should wrap this type using the `#[from]` attribute.
#[derive(Debug, Error)]
pub enum CommonError {
    /// I/O error from the standard library.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    ///
    /// Indicates invalid or missing configuration values such as an
    /// unsupported `DOCKER_HOST` scheme.
    #[error("configuration error: {0}")]
    Config(String),

    /// A builder or request field failed validation.
    #[error("invalid configuration for {field}: {message}")]
    InvalidConfig { field: String, message: String },

    /// Resource not found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    /// Resource already exists, e.g. a container or network name in use.
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: ResourceKind, id: String },

    /// An operation on a specific resource failed.
    ///
    /// Used when the engine accepted the request but reported a failure,
    /// e.g. a pull whose progress stream carried an error record.
    #[error("{kind} {id}: {op} failed: {message}")]
    Operation {
        kind: ResourceKind,
        id: String,
        op: String,
        message: String,
    },

    /// Invalid state transition.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The engine daemon could not be reached.
    #[error("docker daemon is not running: {0}")]
    DaemonNotRunning(String),
}

impl CommonError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new field validation error.
    #[must_use]
    pub fn invalid_config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates a new not found error.
    #[must_use]
    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Creates a new already exists error.
    #[must_use]
    pub fn already_exists(kind: ResourceKind, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            id: id.into(),
        }
    }

    /// Creates a new operation failure.
    #[must_use]
    pub fn operation(
        kind: ResourceKind,
        id: impl Into<String>,
        op: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Operation {
            kind,
            id: id.into(),
            op: op.into(),
            message: message.into(),
        }
    }

    /// Creates a new invalid state error.
    #[must_use]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Creates a new daemon-not-running error.
    #[must_use]
    pub fn daemon_not_running(msg: impl Into<String>) -> Self {
        Self::DaemonNotRunning(msg.into())
    }

    /// Returns true if this is an I/O error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Returns true if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is an already exists error.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns true for configuration and field validation errors.
    #[must_use]
    pub const fn is_invalid_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::InvalidConfig { .. })
    }

    /// Returns true if the daemon could not be reached.
    #[must_use]
    pub const fn is_daemon_not_running(&self) -> bool {
        matches!(self, Self::DaemonNotRunning(_))
    }

    /// Returns true if an engine operation reported a failure.
    #[must_use]
    pub const fn is_operation(&self) -> bool {
        matches!(self, Self::Operation { .. })
    }

    /// Returns true if the target is in the wrong state for the request.
    #[must_use]
    pub const fn is_invalid_state(&self) -> bool {
        matches!(self, Self::InvalidState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "socket not found");
        let common_err: CommonError = io_err.into();
        assert!(common_err.is_io());
        assert!(common_err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_not_found_error() {
        let err = CommonError::not_found(ResourceKind::Container, "abc123");
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());
        assert_eq!(err.to_string(), "container not found: abc123");
    }

    #[test]
    fn test_already_exists_error() {
        let err = CommonError::already_exists(ResourceKind::Network, "bridge0");
        assert!(err.is_already_exists());
        assert_eq!(err.to_string(), "network already exists: bridge0");
    }

    #[test]
    fn test_invalid_config_error() {
        let err = CommonError::invalid_config("build context", "no context supplied");
        assert!(err.is_invalid_config());
        assert_eq!(
            err.to_string(),
            "invalid configuration for build context: no context supplied"
        );
        assert!(CommonError::config("bad host").is_invalid_config());
    }

    #[test]
    fn test_operation_error() {
        let err = CommonError::operation(ResourceKind::Image, "alpine", "pull", "denied");
        assert_eq!(err.to_string(), "image alpine: pull failed: denied");
    }

    #[test]
    fn test_daemon_not_running_error() {
        let err = CommonError::daemon_not_running("connection refused");
        assert!(err.is_daemon_not_running());
        assert_eq!(
            err.to_string(),
            "docker daemon is not running: connection refused"
        );
    }

    #[test]
    fn test_resource_kind_display() {
        assert_eq!(ResourceKind::Volume.to_string(), "volume");
        assert_eq!(ResourceKind::Exec.as_str(), "exec");
    }
}
