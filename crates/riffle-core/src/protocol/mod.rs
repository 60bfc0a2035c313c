// ============================================
// File: crates/riffle-core/src/protocol/mod.rs
// ============================================
//! # Protocol Module
//!
//! ## Creation Reason
//! Defines the wire protocol spoken over an authenticated TLS stream:
//! frame layout, the value model, and serialization.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`messages`]: Frame, value and fault structures
//! - [`codec`]: Length-prefixed framing
//! - [`version`]: Protocol versioning
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Login Phase                              │
//! │                                                             │
//! │  Initiator ── Call{target: ROOT, "login", [Remote(a)]} ──►  │
//! │  Initiator ◄──────────── Reply{Remote(b)} ─────────────     │
//! │                                                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    Session Phase                            │
//! │                                                             │
//! │  Either side ═══ Call / Reply / Fault / Release ═══════     │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format Principles
//! - `[version: u8][length: u32 LE][JSON body]`
//! - Both directions use the same frame set; there is no client/server
//!   asymmetry below the login root
//!
//! ## ⚠️ Important Note for Next Developer
//! - ANY frame layout change requires a version bump
//! - `Value::Remote` ids are relative to the sender's export table
//!
//! ## Last Modified
//! v0.1.0 - Initial protocol definitions

pub mod codec;
pub mod messages;
pub mod version;

// Re-export primary types
pub use codec::{Codec, FrameCodec, DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE};
pub use messages::{FaultKind, Frame, RemoteFault, Value};
pub use version::{ProtocolVersion, CURRENT_PROTOCOL_VERSION};
