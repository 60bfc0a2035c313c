// ============================================
// File: crates/riffle-common/src/types.rs
// ============================================
//! # Core Type Definitions
//!
//! ## Creation Reason
//! Centralizes the identifiers used throughout Riffle so that routing
//! keys, object handles and connection labels cannot be mixed up.
//!
//! ## Main Functionality
//! - `Identity`: Certificate commonName, the key for realm routing
//! - `ObjectId`: Per-connection handle of a remotely invocable object
//! - `ConnectionId`: Process-unique connection label for logs
//!
//! ## Main Logical Flow
//! 1. `Identity` is derived from a verified peer certificate
//! 2. Used as the key of realm matchers and live-avatar sets
//! 3. `ObjectId` travels on the wire inside `Value::Remote`
//!
//! ## ⚠️ Important Note for Next Developer
//! - An `Identity` is never empty; `Identity::new` enforces this
//! - `ObjectId::ROOT` is reserved for the responder's login root
//! - `ConnectionId` carries no meaning beyond log correlation
//!
//! ## Last Modified
//! v0.1.0 - Initial type definitions

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::CommonError;

// ============================================
// Identity
// ============================================

/// Authenticated name of a peer, taken verbatim from the subject
/// commonName of its verified certificate.
///
/// # Invariants
/// - Never empty
/// - Compared byte for byte (no case folding)
///
/// # Example
/// ```
/// use riffle_common::types::Identity;
///
/// let id = Identity::new("device-1").unwrap();
/// assert_eq!(id.as_str(), "device-1");
/// assert!(Identity::new("").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Creates an identity, rejecting the empty string.
    ///
    /// # Errors
    /// Returns `CommonError::InvalidInput` if `name` is empty.
    pub fn new(name: impl Into<String>) -> Result<Self, CommonError> {
        let name = name.into();
        if name.is_empty() {
            return Err(CommonError::invalid_input("identity", "cannot be empty"));
        }
        Ok(Self(name))
    }

    /// Returns the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identity, returning the inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identity {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

// ============================================
// ObjectId
// ============================================

/// Key into a connection's export table.
///
/// A value of this type is only meaningful relative to the side that
/// exported it: `Value::Remote(id)` always names an object in the
/// *sender's* table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    /// The responder's login root, present on every accepted connection.
    pub const ROOT: Self = Self(0);

    /// Creates an object id from a raw value.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns `true` for the reserved root id.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj-{}", self.0)
    }
}

impl From<u64> for ObjectId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

// ============================================
// ConnectionId
// ============================================

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique label attached to every connection for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next connection id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

// ============================================
// Tests
// ============================================
