// ============================================
// File: crates/riffle-transport/src/error.rs
// ============================================
//! # Transport Error Types
//!
//! ## Creation Reason
//! Defines error types for socket setup, TLS negotiation and peer
//! identity derivation.
//!
//! ## Error Categories
//! 1. **Network Errors**: Bind and connect failures
//! 2. **TLS Errors**: Configuration and handshake failures
//! 3. **System Errors**: I/O with context, shutdown
//!
//! ## ⚠️ Important Note for Next Developer
//! - Handshake errors are expected noise on a public port; log them at
//!   `warn` and keep accepting
//! - Never put key material in `TlsConfig` reasons
//!
//! ## Last Modified
//! v0.1.0 - Initial error definitions

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

// ============================================
// Result Type Alias
// ============================================

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

// ============================================
// TransportError
// ============================================

/// Transport layer error types.
#[derive(Error, Debug)]
pub enum TransportError {
    // ========================================
    // Network Errors
    // ========================================

    /// Failed to bind to address.
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed {
        /// Address we tried to bind to
        addr: SocketAddr,
        /// Why binding failed
        reason: String,
    },

    /// Address already in use.
    #[error("Address {addr} already in use")]
    AddressInUse {
        /// The address that's in use
        addr: SocketAddr,
    },

    /// Outbound TCP connection failed.
    #[error("Failed to connect to {addr}: {reason}")]
    ConnectFailed {
        /// Peer address
        addr: SocketAddr,
        /// Why connecting failed
        reason: String,
    },

    // ========================================
    // TLS Errors
    // ========================================

    /// TLS configuration could not be built from the supplied material.
    #[error("Invalid TLS configuration: {reason}")]
    TlsConfig {
        /// What rustls rejected
        reason: String,
    },

    /// TLS negotiation or certificate verification failed.
    #[error("TLS handshake with {peer} failed: {reason}")]
    TlsHandshake {
        /// Peer address, or "unknown"
        peer: String,
        /// Why the handshake failed
        reason: String,
    },

    /// TLS negotiation did not finish in time.
    #[error("TLS handshake with {peer} timed out after {timeout_ms}ms")]
    HandshakeTimeout {
        /// Peer address, or "unknown"
        peer: String,
        /// Configured bound
        timeout_ms: u64,
    },

    /// Verified peer certificate does not yield an identity.
    #[error("Cannot derive identity of {peer}: {reason}")]
    PeerIdentity {
        /// Peer address, or "unknown"
        peer: String,
        /// Why extraction failed
        reason: String,
    },

    // ========================================
    // System Errors
    // ========================================

    /// Listener is shutting down.
    #[error("Transport is shutting down")]
    ShuttingDown,

    /// I/O error from the system.
    #[error("I/O error: {context}")]
    Io {
        /// What was happening when the error occurred
        context: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl TransportError {
    // ========================================
    // Convenience Constructors
    // ========================================

    /// Creates a `BindFailed` error.
    pub fn bind_failed(addr: SocketAddr, reason: impl Into<String>) -> Self {
        Self::BindFailed {
            addr,
            reason: reason.into(),
        }
    }

    /// Creates a `TlsConfig` error.
    pub fn tls_config(reason: impl Into<String>) -> Self {
        Self::TlsConfig {
            reason: reason.into(),
        }
    }

    /// Creates a `TlsHandshake` error.
    pub fn tls_handshake(peer: impl ToString, reason: impl Into<String>) -> Self {
        Self::TlsHandshake {
            peer: peer.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a `PeerIdentity` error.
    pub fn peer_identity(peer: impl ToString, reason: impl Into<String>) -> Self {
        Self::PeerIdentity {
            peer: peer.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates an `Io` error with context.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    // ========================================
    // Error Classification
    // ========================================

    /// Returns `true` if this error is transient and retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectFailed { .. } | Self::HandshakeTimeout { .. } => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::WouldBlock
                    | io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
            ),
            _ => false,
        }
    }

    /// Returns `true` if the peer failed mutual authentication.
    #[must_use]
    pub const fn is_handshake_error(&self) -> bool {
        matches!(
            self,
            Self::TlsHandshake { .. } | Self::HandshakeTimeout { .. } | Self::PeerIdentity { .. }
        )
    }
}

// ============================================
// Tests
// ============================================
