// ============================================
// File: crates/riffle-core/src/error.rs
// ============================================
//! # Core Error Types
//!
//! ## Creation Reason
//! Defines error types specific to wire framing and certificate handling
//! in the Riffle core crate.
//!
//! ## Error Categories
//! 1. **Protocol Errors**: Framing, size limits, version mismatch
//! 2. **Certificate Errors**: Unparseable certificates, missing identity
//! 3. **Material Errors**: PEM loading failures
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER include key material in error messages
//! - A `Protocol` error always closes the connection it happened on
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

// ============================================
// CoreError
// ============================================

/// Core error types for framing and certificate operations.
#[derive(Error, Debug)]
pub enum CoreError {
    // ========================================
    // Protocol Errors
    // ========================================

    /// Protocol version mismatch.
    #[error("Unsupported protocol version: {got}, expected {expected}")]
    UnsupportedVersion {
        /// Version received
        got: u8,
        /// Version expected
        expected: u8,
    },

    /// Frame body could not be encoded or parsed.
    #[error("Malformed message: {reason}")]
    MalformedMessage {
        /// What's wrong with the message
        reason: String,
    },

    /// Frame is too short to be valid.
    #[error("Message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort {
        /// Minimum expected length
        expected: usize,
        /// Actual length received
        actual: usize,
    },

    /// Frame exceeds maximum allowed size.
    #[error("Message too large: max {max} bytes, got {actual}")]
    MessageTooLarge {
        /// Maximum allowed size
        max: usize,
        /// Actual size received
        actual: usize,
    },

    // ========================================
    // Certificate Errors
    // ========================================

    /// Certificate could not be parsed.
    #[error("Invalid certificate: {reason}")]
    Certificate {
        /// Why parsing failed
        reason: String,
    },

    /// Certificate subject carries no usable commonName.
    #[error("Certificate subject has no commonName")]
    MissingIdentity,

    /// PEM material could not be loaded.
    #[error("Failed to load {what}: {reason}")]
    PemLoad {
        /// Which file or blob was being read
        what: String,
        /// Why loading failed
        reason: String,
    },
}

impl CoreError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `MalformedMessage` error.
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage {
            reason: reason.into(),
        }
    }

    /// Creates a `MessageTooShort` error.
    #[must_use]
    pub const fn too_short(expected: usize, actual: usize) -> Self {
        Self::MessageTooShort { expected, actual }
    }

    /// Creates a `MessageTooLarge` error.
    #[must_use]
    pub const fn too_large(max: usize, actual: usize) -> Self {
        Self::MessageTooLarge { max, actual }
    }

    /// Creates a `Certificate` error.
    pub fn certificate(reason: impl Into<String>) -> Self {
        Self::Certificate {
            reason: reason.into(),
        }
    }

    /// Creates a `PemLoad` error.
    pub fn pem(what: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PemLoad {
            what: what.into(),
            reason: reason.into(),
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error concerns peer or local certificates.
    #[must_use]
    pub const fn is_certificate_error(&self) -> bool {
        matches!(
            self,
            Self::Certificate { .. } | Self::MissingIdentity | Self::PemLoad { .. }
        )
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
        let err = CoreError::too_short(5, 2);
        assert!(err.to_string().contains('5'));
        assert!(err.to_string().contains('2'));

        let err = CoreError::pem("ca.pem", "no certificates");
        assert!(err.to_string().contains("ca.pem"));
    }

    #[test]
    fn test_error_classification() {
        assert!(!CoreError::too_large(10, 20).is_certificate_error());
        assert!(CoreError::MissingIdentity.is_certificate_error());
        assert!(CoreError::pem("node.pem", "no such file").is_certificate_error());
    }
}
