//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! mostly validation failures when building tree roots and relative paths.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid hash format (expected lowercase hex SHA-256)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
