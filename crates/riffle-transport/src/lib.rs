// ============================================
// File: crates/riffle-transport/src/lib.rs
// ============================================
//! # Riffle Transport - Secure Stream Layer
//!
//! ## Creation Reason
//! Provides the mutually authenticated byte streams that Riffle connections
//! run over, and hands each stream to the layer above together with the
//! identity of the peer as derived from its verified certificate.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`traits`]: `SecureStream` and the `SecureListener` abstraction
//! - [`tls`]: TCP + rustls listener and dialer
//! - [`mock`]: In-memory streams for tests
//! - [`error`]: Transport-specific error types
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               riffle-portal                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │    riffle-core  ◄──── riffle-transport              │
//! │                       You are here ◄──              │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │              riffle-common                          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Data Flow
//! ```text
//!   TCP accept / connect
//!          │
//!          ▼
//!   rustls handshake (both sides present CA-signed certs)
//!          │
//!          ▼
//!   IdentityExtractor(peer leaf)  ──►  SecureStream { io, peer_identity }
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - A `SecureStream` only exists after verification succeeded; there is
//!   no way to build one from an unauthenticated socket outside `mock`
//! - Always use traits for testability
//!
//! ## Last Modified
//! v0.1.0 - Initial transport layer implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod mock;
pub mod tls;
pub mod traits;

// Re-export primary types
pub use error::{Result, TransportError};
pub use mock::{secure_pair, MockListener};
pub use tls::{TlsDialer, TlsListener, DEFAULT_HANDSHAKE_TIMEOUT};
pub use traits::{PendingStream, SecureIo, SecureListener, SecureStream};
