//! Common error types for `dockside`.
//!
//! This crate provides the error taxonomy shared by the stream, terminal and
//! client layers, so callers can match on "what went wrong" without caring
//! which crate produced the error.
//!
//! # Usage
//!
//! ```rust
//! use dockside_error::{CommonError, ResourceKind};
//!
//! fn lookup(id: &str) -> Result<(), CommonError> {
//!     Err(CommonError::not_found(ResourceKind::Container, id))
//! }
//!
//! assert!(lookup("abc123").unwrap_err().is_not_found());
//! ```
//!
//! # Crate-Specific Errors
//!
//! Each crate wraps `CommonError` in its own error type:
//!
//! ```rust,ignore
//! use dockside_error::CommonError;
//! use thiserror::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum MyError {
//!     #[error(transparent)]
//!     Common(#[from] CommonError),
//!
//!     #[error("my specific error: {0}")]
//!     Specific(String),
//! }
//! ```

mod common;

pub use common::{CommonError, ResourceKind};

/// Result type alias using `CommonError`.
pub type Result<T> = std::result::Result<T, CommonError>;
