// ============================================
// File: crates/riffle-common/src/lib.rs
// ============================================
//! # Riffle Common - Shared Types Library
//!
//! ## Creation Reason
//! Provides the identifiers and error types shared by every Riffle crate,
//! so that routing keys and object handles mean the same thing on both
//! sides of a connection.
//!
//! ## Main Functionality
//! - [`types`]: `Identity`, `ObjectId`, `ConnectionId`
//! - [`error`]: Common error types and result aliases
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │               riffle-portal                         │
//! │                    │                                │
//! │         ┌──────────┴──────────┐                     │
//! │         ▼                     ▼                     │
//! │    riffle-core  ◄──── riffle-transport              │
//! │         │                     │                     │
//! │         └──────────┬──────────┘                     │
//! │                    ▼                                │
//! │              riffle-common  ◄── You are here        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - This crate is the foundation - changes affect everything
//! - Keep dependencies minimal (serde + thiserror only)
//! - `Identity` is a routing key: never construct one from data
//!   received over the application channel
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod types;

// Re-export commonly used items at crate root
pub use error::{CommonError, Result};
pub use types::{ConnectionId, Identity, ObjectId};
