// ============================================
// File: crates/riffle-portal/src/rpc/mod.rs
// ============================================
//! # RPC Module
//!
//! ## Creation Reason
//! The login handshake and every later call travel over one persistent
//! stream per peer. This module multiplexes that stream into calls on
//! exported objects.
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`object`]: `Referenceable` trait and the per-call `CallContext`
//! - [`connection`]: Broker owning export table, pending calls, close signal
//! - [`proxy`]: `RemoteRef` and the host-facing `CapabilityProxy`
//!
//! ## Object Tables
//! ```text
//!        side A                                    side B
//! ┌──────────────────┐   Call{target=7}   ┌──────────────────┐
//! │ RemoteRef(7) ────┼──────────────────► │ exports[7]       │
//! │                  │ ◄────────────────  │  .invoke(...)    │
//! │                  │   Reply / Fault    │                  │
//! │ exports[3]       │ ◄────────────────  │ RemoteRef(3)     │
//! └──────────────────┘   Call{target=3}   └──────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Object ids are only meaningful on the connection that minted them
//! - `ObjectId::ROOT` is reserved for the responder's handshake root
//!
//! ## Last Modified
//! v0.1.0 - Initial RPC layer

pub mod connection;
pub mod object;
pub mod proxy;

pub use connection::{Connection, StreamFailure};
pub use object::{CallContext, Referenceable};
pub use proxy::{CapabilityProxy, RemoteRef};
