// ============================================
// File: crates/riffle-core/src/pki/mod.rs
// ============================================
//! # PKI Module
//!
//! ## Creation Reason
//! Every Riffle endpoint holds a certificate issued by a shared CA and
//! names its peer by the commonName of the certificate the peer
//! presented. This module owns both halves of that arrangement.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`extract`]: `IdentityExtractor` trait and the commonName default
//! - [`material`]: `TlsMaterial` (CA roots, certificate chain, private key)
//!
//! ## Trust Model
//! ```text
//! ┌───────────────┐         signs          ┌────────────────────┐
//! │   Shared CA   │ ─────────────────────► │ node cert (CN=...) │
//! └───────────────┘                        └────────────────────┘
//!         │                                          │
//!         │ verifies (rustls, both directions)       │ presented in TLS
//!         ▼                                          ▼
//!   peer accepted  ──────►  IdentityExtractor ──────► Identity
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Extraction assumes the certificate is ALREADY verified; never call it
//!   on certificates that did not come out of a completed handshake
//! - The private key never leaves `TlsMaterial` except as a fresh
//!   `clone_key()` handed to rustls
//!
//! ## Last Modified
//! v0.1.0 - Initial PKI module

pub mod extract;
pub mod material;

pub use extract::{identity_from_der, CommonNameExtractor, IdentityExtractor};
pub use material::TlsMaterial;
