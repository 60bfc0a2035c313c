// ============================================
// File: crates/riffle-portal/src/services/mod.rs
// ============================================
//! # Portal Services
//!
//! ## Creation Reason
//! Session logic of the portal, separated from the RPC plumbing in
//! [`crate::rpc`] and the accept loop in [`crate::server`].
//!
//! ## Main Functionality
//!
//! ### Submodules
//! - [`portal`]: Routing table, host entry points
//! - [`realm`]: Avatar factory + live session set
//! - [`matcher`]: Identity → realm predicates
//! - [`avatar`]: Per-peer session object and its lifecycle
//! - [`logout`]: Single-fire session cleanup
//! - [`login`]: Two-phase login handshake
//!
//! ## Service Architecture
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Portal                           │
//! │   [(Matcher, Realm), (Matcher, Realm), ...]              │
//! └───────────────┬──────────────────────────────────────────┘
//!                 │ find_realm(identity)
//!                 ▼
//! ┌──────────────────────────────┐    ┌─────────────────────┐
//! │            Realm             │───►│       Avatar        │
//! │  factory, live set by name   │    │  handler, remote    │
//! └──────────────────────────────┘    └─────────┬───────────┘
//!                 ▲                             │
//!                 │ connection_closed           │
//!                 └──────── LogoutHandle ◄──────┘
//! ```
//!
//! ## Service Interactions
//! 1. `login` asks the portal for the peer's realm
//! 2. The realm builds, attaches and initializes an avatar
//! 3. Only an initialized avatar enters the live set
//! 4. Logout or disconnect fires the `LogoutHandle` exactly once
//!
//! ## ⚠️ Important Note for Next Developer
//! - Avatars hold only a weak reference to their realm
//! - All services are Send + Sync and shared through `Arc`
//!
//! ## Last Modified
//! v0.1.0 - Initial services structure

pub mod avatar;
pub mod login;
pub mod logout;
pub mod matcher;
pub mod portal;
pub mod realm;

// Re-export primary types
pub use avatar::{Avatar, AvatarHandler, AvatarState};
pub use login::{HandshakeState, LOGIN_METHOD};
pub use logout::LogoutHandle;
pub use matcher::Matcher;
pub use portal::{Portal, PortalSettings, DEFAULT_SERVER_NAME};
pub use realm::{AvatarFactory, Realm};
