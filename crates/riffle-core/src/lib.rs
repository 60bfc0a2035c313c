// ============================================
// File: crates/riffle-core/src/lib.rs
// ============================================
//! # Riffle Core - Wire Protocol & Certificate Identity Library
//!
//! ## Creation Reason
//! Provides the two pieces every Riffle endpoint must agree on: how RPC
//! frames look on the wire, and how a verified certificate becomes an
//! `Identity`.
//!
//! ## Main Functionality
//!
//! ### Protocol Module ([`protocol`])
//! - Frame and value definitions (`Frame`, `Value`, `RemoteFault`)
//! - Length-prefixed JSON codec (`FrameCodec`)
//! - Protocol version management
//!
//! ### PKI Module ([`pki`])
//! - `IdentityExtractor` trait and the commonName default
//! - `TlsMaterial`: CA roots, certificate chain and private key loading
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               riffle-portal                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │    riffle-core  ◄──── riffle-transport              │
//! │    You are here               │                     │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │              riffle-common                          │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Guarantees
//! - **Authenticity**: identities come only from certificates that the
//!   TLS layer has already verified against the shared CA
//! - **Bounded input**: every frame is size-checked before it is parsed
//!
//! ## ⚠️ Important Note for Next Developer
//! - NEVER implement custom crypto primitives; TLS is rustls' job
//! - Private keys must not appear in `Debug` output or error messages
//! - Protocol changes MUST bump the protocol version
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod pki;
pub mod protocol;

// Re-export commonly used items
pub use error::{CoreError, Result};
pub use pki::{CommonNameExtractor, IdentityExtractor, TlsMaterial};
pub use protocol::{
    FaultKind, Frame, FrameCodec, ProtocolVersion, RemoteFault, Value,
    CURRENT_PROTOCOL_VERSION,
};
