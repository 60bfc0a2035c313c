// ============================================
// File: crates/riffle-common/src/error.rs
// ============================================
//! # Common Error Types
//!
//! ## Creation Reason
//! Provides foundational error types and result aliases used across
//! all Riffle crates, enabling consistent error handling.
//!
//! ## Main Functionality
//! - `CommonError`: Base error enum for common operations
//! - `Result<T>`: Type alias using `CommonError`
//!
//! ## Design Philosophy
//! - Use `thiserror` for ergonomic error definitions
//! - Each crate defines its own error type for its own failures
//!
//! ## ⚠️ Important Note for Next Developer
//! - Never include key material in error messages
//! - Identities are fine to log, private keys are not
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Common result type for operations that may fail.
pub type Result<T> = std::result::Result<T, CommonError>;

// ============================================
// CommonError
// ============================================

/// Common error types shared across Riffle crates.
///
/// # Example
/// ```
/// use riffle_common::error::{CommonError, Result};
///
/// fn validate_input(name: &str) -> Result<()> {
///     if name.is_empty() {
///         return Err(CommonError::invalid_input("name", "cannot be empty"));
///     }
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum CommonError {
    /// Invalid input data provided.
    #[error("Invalid input for '{field}': {reason}")]
    InvalidInput {
        /// Name of the field or parameter
        field: String,
        /// Description of what's wrong
        reason: String,
    },
}

impl CommonError {
    /// Creates an `InvalidInput` error.
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CommonError::invalid_input("identity", "cannot be empty");
        assert!(err.to_string().contains("identity"));
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn test_invalid_input_fields() {
        let err = CommonError::invalid_input("identity", "cannot be empty");
        assert!(matches!(
            err,
            CommonError::InvalidInput { ref field, .. } if field == "identity"
        ));
    }
}
