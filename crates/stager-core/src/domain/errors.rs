//! Domain error types
//!
//! This module defines error types raised while constructing domain values:
//! locator parsing, checksum and identifier validation.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Locator string could not be parsed into a namespace path
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// Checksum string is empty or lacks an algorithm prefix
    #[error("Invalid checksum: {0}")]
    InvalidChecksum(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Malformed progress protocol line
    #[error("Invalid progress line: {0}")]
    InvalidProgressLine(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidLocator("i:".to_string());
        assert_eq!(err.to_string(), "Invalid locator: i:");

        let err = DomainError::InvalidProgressLine("1,2".to_string());
        assert_eq!(err.to_string(), "Invalid progress line: 1,2");
    }

    #[test]
    fn test_error_equality() {
        let a = DomainError::InvalidChecksum("x".to_string());
        let b = DomainError::InvalidChecksum("x".to_string());
        let c = DomainError::InvalidId("x".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
