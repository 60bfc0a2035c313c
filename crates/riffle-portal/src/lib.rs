// ============================================
// File: crates/riffle-portal/src/lib.rs
// ============================================
//! # Riffle Portal Library
//!
//! ## Creation Reason
//! Provides the identity-routed login layer of Riffle: two mutually
//! authenticated peers exchange avatars over one persistent TLS
//! connection and call each other through capability proxies.
//!
//! ## Main Functionality
//!
//! ### Modules
//! - [`config`]: Portal configuration management
//! - [`server`]: Accept loop behind `Portal::open`
//! - [`services`]: Portal, realms, avatars, login and logout
//!   - [`services::portal`]: Realm routing and connection entry points
//!   - [`services::realm`]: Avatar factories and live sessions
//!   - [`services::login`]: Login handshake over an authenticated stream
//! - [`rpc`]: Object-capability calls over a framed connection
//! - [`error`]: Portal-specific error types
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Riffle Portal                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  ┌─────────────┐     ┌─────────────┐     ┌─────────────────┐   │
//! │  │   Config    │────►│   Portal    │────►│     Realms      │   │
//! │  │             │     │  (matchers) │     │ (avatar factory)│   │
//! │  └─────────────┘     └──────┬──────┘     └────────┬────────┘   │
//! │                             │                     │            │
//! │                             ▼                     ▼            │
//! │                      ┌─────────────┐     ┌─────────────────┐   │
//! │                      │    Login    │────►│ Avatar + Logout │   │
//! │                      │  Handshake  │     │     Handle      │   │
//! │                      └──────┬──────┘     └─────────────────┘   │
//! │                             ▼                                  │
//! │                      ┌─────────────┐                           │
//! │                      │ Connection  │  call / reply / release   │
//! │                      └──────┬──────┘                           │
//! ├─────────────────────────────┼──────────────────────────────────┤
//! │                     Transport Layer (mutual TLS)               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - Peer identity always comes from the verified certificate, never
//!   from anything the peer sends
//! - Routing is first-match-wins in registration order
//! - Configuration changes require restart
//!
//! ## Last Modified
//! v0.1.0 - Initial portal library

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod rpc;
pub mod server;
pub mod services;

// Re-export primary types
pub use config::PortalConfig;
pub use error::{PortalError, Result};
pub use rpc::{
    CallContext, CapabilityProxy, Connection, Referenceable, RemoteRef, StreamFailure,
};
pub use server::PortalListener;
pub use services::{
    Avatar, AvatarFactory, AvatarHandler, AvatarState, HandshakeState, LogoutHandle, Matcher,
    Portal, PortalSettings, Realm,
};
