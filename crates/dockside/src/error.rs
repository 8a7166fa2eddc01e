//! Error types for the engine client.

use dockside_error::{CommonError, ResourceKind};
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the client, transport and terminal layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Shared error taxonomy.
    #[error(transparent)]
    Common(#[from] CommonError),

    /// Framing, decoding or embedded-operation failure on a response stream.
    #[error(transparent)]
    Stream(#[from] dockside_stream::Error),

    /// HTTP connection failure.
    #[error("http error: {0}")]
    Http(#[from] hyper::Error),

    /// Request could not be built.
    #[error("invalid request: {0}")]
    Request(#[from] hyper::http::Error),

    /// The engine answered with a non-success status.
    #[error("engine returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Response or request body was not valid JSON for the expected type.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Terminal mode or size query failed.
    #[error("terminal {op} failed: {source}")]
    Terminal {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Common(CommonError::Io(err))
    }
}

impl Error {
    /// Creates an API error from a status code and engine message.
    #[must_use]
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Creates a terminal error.
    #[must_use]
    pub fn terminal(op: &'static str, source: std::io::Error) -> Self {
        Self::Terminal { op, source }
    }

    /// Returns the HTTP status if the engine rejected the request.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if the referenced object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Common(err) => err.is_not_found(),
            Self::Api { status, .. } => *status == 404,
            _ => false,
        }
    }

    /// Returns true if the request conflicts with existing state (name in use,
    /// container running, ...).
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Common(err) => err.is_already_exists(),
            Self::Api { status, .. } => *status == 409,
            _ => false,
        }
    }

    /// Returns true if the engine socket could not be reached.
    #[must_use]
    pub fn is_daemon_not_running(&self) -> bool {
        matches!(self, Self::Common(err) if err.is_daemon_not_running())
    }

    /// Returns true if an engine operation reported failure, either in its
    /// status or embedded in a progress stream.
    #[must_use]
    pub fn is_operation(&self) -> bool {
        match self {
            Self::Common(err) => err.is_operation(),
            Self::Stream(err) => err.is_operation(),
            _ => false,
        }
    }

    /// Returns true for invalid configuration.
    #[must_use]
    pub fn is_invalid_config(&self) -> bool {
        matches!(self, Self::Common(err) if err.is_invalid_config())
    }

    /// Rewrites an engine 404 into a typed not-found error for `kind`/`id`.
    #[must_use]
    pub(crate) fn not_found_as(self, kind: ResourceKind, id: &str) -> Self {
        if self.status() == Some(404) {
            Self::Common(CommonError::not_found(kind, id))
        } else {
            self
        }
    }

    /// Rewrites an engine 409 on a create into an already-exists error for
    /// `kind`/`name`.
    #[must_use]
    pub(crate) fn already_exists_as(self, kind: ResourceKind, name: &str) -> Self {
        if self.status() == Some(409) {
            Self::Common(CommonError::already_exists(kind, name))
        } else {
            self
        }
    }

    /// Rewrites an embedded stream failure into an operation error on `id`.
    #[must_use]
    pub(crate) fn operation_as(self, kind: ResourceKind, id: &str, op: &str) -> Self {
        match self {
            Self::Stream(dockside_stream::Error::Operation(message)) => {
                Self::Common(CommonError::operation(kind, id, op, message))
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_status_predicates() {
        let err = Error::api(404, "No such container: web");
        assert!(err.is_not_found());
        assert!(!err.is_conflict());
        assert_eq!(err.to_string(), "engine returned 404: No such container: web");

        let err = Error::api(409, "name already in use");
        assert!(err.is_conflict());
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn test_not_found_as_rewrites_only_404() {
        let err = Error::api(404, "gone").not_found_as(ResourceKind::Network, "backend");
        assert!(matches!(
            err,
            Error::Common(CommonError::NotFound {
                kind: ResourceKind::Network,
                ref id,
            }) if id == "backend"
        ));

        let err = Error::api(500, "boom").not_found_as(ResourceKind::Network, "backend");
        assert_eq!(err.status(), Some(500));
    }

    #[test]
    fn test_already_exists_as_rewrites_only_409() {
        let err = Error::api(409, "name in use").already_exists_as(ResourceKind::Container, "db");
        assert!(err.is_conflict());
        assert_eq!(err.status(), None);
        assert_eq!(err.to_string(), "container already exists: db");

        let err = Error::api(404, "gone").already_exists_as(ResourceKind::Container, "db");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_operation_as_wraps_embedded_failure() {
        let err = Error::from(dockside_stream::Error::Operation("manifest unknown".into()))
            .operation_as(ResourceKind::Image, "alpine:nope", "pull");

        assert!(err.is_operation());
        assert_eq!(
            err.to_string(),
            "image alpine:nope: pull failed: manifest unknown"
        );
    }

    #[test]
    fn test_io_errors_become_common() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed").into();
        assert!(matches!(err, Error::Common(CommonError::Io(_))));
    }
}
