// ============================================
// File: crates/riffle-portal/src/error.rs
// ============================================
//! # Portal Error Types
//!
//! ## Creation Reason
//! One error type for everything a host sees when it opens a portal,
//! connects to a peer, or calls through a proxy.
//!
//! ## Error Categories
//! 1. **Handshake Errors**: TLS, routing, initialization, timeouts
//! 2. **Call Errors**: Faults reported by the peer, closed connections
//! 3. **Configuration Errors**: Config file load/validation
//! 4. **Wrapped Errors**: Protocol and transport failures
//!
//! ## ⚠️ Important Note for Next Developer
//! - `NoMatchingRealm` and `Initialization` cross the wire as
//!   `RemoteFault`s; keep `to_fault` and `from_fault` symmetric
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use thiserror::Error;

use riffle_common::Identity;
use riffle_core::{CoreError, FaultKind, RemoteFault};
use riffle_transport::TransportError;

/// Result type for portal operations.
pub type Result<T> = std::result::Result<T, PortalError>;

/// Portal error types.
#[derive(Error, Debug)]
pub enum PortalError {
    // ========================================
    // Handshake Errors
    // ========================================

    /// Mutual TLS failed or the peer certificate named no identity.
    #[error("TLS handshake failed: {reason}")]
    TlsHandshake {
        /// What went wrong
        reason: String,
    },

    /// No registered realm accepts the identity.
    #[error("No realm matches identity '{0}'")]
    NoMatchingRealm(Identity),

    /// An avatar's `initialize` hook failed or timed out, locally or on
    /// the peer.
    #[error("Avatar initialization failed ({identity}): {reason}")]
    Initialization {
        /// Identity being registered, or the peer that reported the failure
        identity: String,
        /// Failure detail
        reason: String,
    },

    /// The login exchange did not finish in time.
    #[error("Login handshake timed out after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Configured bound
        timeout_ms: u64,
    },

    /// A realm matcher expression did not compile.
    #[error("Invalid matcher '{pattern}': {reason}")]
    InvalidMatcher {
        /// Expression as given
        pattern: String,
        /// Compiler message
        reason: String,
    },

    // ========================================
    // Call Errors
    // ========================================

    /// The peer answered a call with a fault.
    #[error("Remote call failed: {0}")]
    RemoteCall(RemoteFault),

    /// The connection closed before the call completed.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================
    // Configuration Errors
    // ========================================

    /// Config file could not be read or parsed.
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        /// Config file path
        path: String,
        /// Failure detail
        reason: String,
    },

    /// Config value out of range.
    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        /// Dotted field name
        field: String,
        /// Failure detail
        reason: String,
    },

    // ========================================
    // Wrapped Errors
    // ========================================

    /// Wire protocol or certificate error.
    #[error(transparent)]
    Protocol(#[from] CoreError),

    /// Transport error outside the handshake.
    #[error(transparent)]
    Transport(TransportError),
}

impl PortalError {
    /// Creates a `TlsHandshake` error.
    pub fn tls_handshake(reason: impl Into<String>) -> Self {
        Self::TlsHandshake {
            reason: reason.into(),
        }
    }

    /// Creates an `Initialization` error.
    pub fn initialization(identity: &Identity, reason: impl Into<String>) -> Self {
        Self::Initialization {
            identity: identity.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigLoad` error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `ConfigInvalid` error.
    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `InvalidMatcher` error.
    pub fn invalid_matcher(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMatcher {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Maps a fault reported by `peer` back to the matching variant.
    #[must_use]
    pub fn from_fault(peer: &Identity, fault: RemoteFault) -> Self {
        match fault.kind {
            FaultKind::NoMatchingRealm => match Identity::new(fault.message.clone()) {
                Ok(identity) => Self::NoMatchingRealm(identity),
                Err(_) => Self::RemoteCall(fault),
            },
            FaultKind::Initialization => Self::initialization(peer, fault.message),
            _ => Self::RemoteCall(fault),
        }
    }

    /// Converts a login failure into the fault sent back to the peer.
    #[must_use]
    pub fn to_fault(&self) -> RemoteFault {
        match self {
            Self::NoMatchingRealm(identity) => {
                RemoteFault::new(FaultKind::NoMatchingRealm, identity.as_str())
            }
            Self::Initialization { reason, .. } => {
                RemoteFault::new(FaultKind::Initialization, reason.clone())
            }
            Self::RemoteCall(fault) => fault.clone(),
            other => RemoteFault::new(FaultKind::Internal, other.to_string()),
        }
    }

    // ========================================
    // Classification
    // ========================================

    /// Returns `true` for errors that abort a login handshake.
    #[must_use]
    pub const fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            Self::TlsHandshake { .. }
                | Self::NoMatchingRealm(_)
                | Self::Initialization { .. }
                | Self::HandshakeTimeout { .. }
        )
    }

    /// Returns `true` for configuration errors.
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(self, Self::ConfigLoad { .. } | Self::ConfigInvalid { .. })
    }

    /// Returns `true` if the host should give up rather than retry.
    ///
    /// Unusable local TLS material is fatal like a bad config file.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        match self {
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } | Self::InvalidMatcher { .. } => {
                true
            }
            Self::Protocol(e) => e.is_certificate_error(),
            _ => false,
        }
    }

    /// Returns `true` if a fresh `connect` might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::ConnectionClosed | Self::HandshakeTimeout { .. } => true,
            _ => false,
        }
    }
}

impl From<TransportError> for PortalError {
    fn from(err: TransportError) -> Self {
        if err.is_handshake_error() {
            Self::tls_handshake(err.to_string())
        } else {
            Self::Transport(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PortalError::config_load("/etc/riffle/portal.toml", "file not found");
        assert!(err.to_string().contains("/etc/riffle/portal.toml"));

        let err = PortalError::NoMatchingRealm(Identity::new("rogue-x").unwrap());
        assert_eq!(err.to_string(), "No realm matches identity 'rogue-x'");
    }

    #[test]
    fn test_fault_mapping_is_symmetric() {
        let identity = Identity::new("rogue-x").unwrap();
        let peer = Identity::new("pdserver").unwrap();
        let fault = PortalError::NoMatchingRealm(identity.clone()).to_fault();
        assert_eq!(fault.kind, FaultKind::NoMatchingRealm);
        assert!(matches!(
            PortalError::from_fault(&peer, fault),
            PortalError::NoMatchingRealm(id) if id == identity
        ));

        let fault = PortalError::initialization(&identity, "database offline").to_fault();
        assert!(matches!(
            PortalError::from_fault(&peer, fault),
            PortalError::Initialization { identity, reason }
                if identity == "pdserver" && reason == "database offline"
        ));

        let fault = RemoteFault::no_such_method("reboot");
        assert!(matches!(
            PortalError::from_fault(&peer, fault),
            PortalError::RemoteCall(RemoteFault { kind: FaultKind::NoSuchMethod, .. })
        ));
    }

    #[test]
    fn test_handshake_transport_errors_become_tls_handshake() {
        let err: PortalError = TransportError::tls_handshake("10.0.0.1:8016", "bad cert").into();
        assert!(matches!(err, PortalError::TlsHandshake { .. }));

        let err: PortalError = TransportError::ShuttingDown.into();
        assert!(matches!(err, PortalError::Transport(_)));
    }

    #[test]
    fn test_error_classification() {
        let config_err = PortalError::config_invalid("limits.max_frame_size", "must be > 0");
        assert!(config_err.is_config_error());
        assert!(config_err.is_fatal());
        assert!(!config_err.is_handshake_error());

        assert!(PortalError::HandshakeTimeout { timeout_ms: 10 }.is_handshake_error());
        assert!(PortalError::ConnectionClosed.is_retryable());

        let missing_cert: PortalError = CoreError::pem("/etc/riffle/node.pem", "not found").into();
        assert!(missing_cert.is_fatal());
        let bad_frame: PortalError = CoreError::malformed("truncated").into();
        assert!(!bad_frame.is_fatal());
    }
}
