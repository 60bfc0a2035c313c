// ============================================
// File: crates/riffle-core/src/protocol/version.rs
// ============================================
//! # Protocol Versioning
//!
//! ## Creation Reason
//! Every frame starts with a version byte so that endpoints built from
//! different releases fail loudly instead of misparsing each other.
//!
//! ## Version History
//! | Version | Description |
//! |---------|-------------|
//! | 0x01    | Initial protocol: JSON frames, Call/Reply/Fault/Release |
//!
//! ## ⚠️ Important Note for Next Developer
//! - ALWAYS increment version for wire format changes
//! - Document all versions in version history
//!
//! ## Last Modified
//! v0.1.0 - Initial version definitions

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================
// Constants
// ============================================

/// Current protocol version.
pub const CURRENT_PROTOCOL_VERSION: u8 = 0x01;

/// Minimum supported protocol version.
pub const MIN_SUPPORTED_VERSION: u8 = 0x01;

/// Maximum supported protocol version.
pub const MAX_SUPPORTED_VERSION: u8 = 0x01;

// ============================================
// ProtocolVersion
// ============================================

/// Protocol version identifier.
///
/// # Example
/// ```
/// use riffle_core::protocol::ProtocolVersion;
///
/// let version = ProtocolVersion::current();
/// assert!(version.is_supported());
///
/// let old_version = ProtocolVersion::new(0);
/// assert!(!old_version.is_supported());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtocolVersion(u8);

impl ProtocolVersion {
    /// Creates a new protocol version.
    #[must_use]
    pub const fn new(version: u8) -> Self {
        Self(version)
    }

    /// Returns the current protocol version.
    #[must_use]
    pub const fn current() -> Self {
        Self(CURRENT_PROTOCOL_VERSION)
    }

    /// Returns the raw version number.
    #[must_use]
    pub const fn as_u8(&self) -> u8 {
        self.0
    }

    /// Checks if this version can be decoded by this build.
    #[must_use]
    pub const fn is_supported(&self) -> bool {
        self.0 >= MIN_SUPPORTED_VERSION && self.0 <= MAX_SUPPORTED_VERSION
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u8> for ProtocolVersion {
    fn from(version: u8) -> Self {
        Self(version)
    }
}

impl From<ProtocolVersion> for u8 {
    fn from(version: ProtocolVersion) -> Self {
        version.0
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_version() {
        let version = ProtocolVersion::current();
        assert_eq!(version.as_u8(), CURRENT_PROTOCOL_VERSION);
        assert!(version.is_supported());
        assert_eq!(ProtocolVersion::default(), version);
    }

    #[test]
    fn test_version_support_check() {
        assert!(!ProtocolVersion::new(0).is_supported());
        assert!(!ProtocolVersion::new(0xFF).is_supported());
    }

    #[test]
    fn test_version_display() {
        assert_eq!(ProtocolVersion::new(1).to_string(), "v1");
    }
}
