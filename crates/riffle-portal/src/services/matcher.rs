// ============================================
// File: crates/riffle-portal/src/services/matcher.rs
// ============================================
//! # Realm Matchers
//!
//! ## Creation Reason
//! Decides which realm an authenticated identity belongs to.
//!
//! ## Main Functionality
//! - `Matcher::pattern`: Regular expression anchored at the start of the
//!   identity (a prefix match, not a full match)
//! - `Matcher::exact`, `Matcher::any`, `Matcher::predicate`
//!
//! ## Examples
//! | Matcher            | `device-1` | `pdserver` | `xdevice-1` |
//! |--------------------|------------|------------|-------------|
//! | `pattern("device")`| ✅         | ❌         | ❌          |
//! | `pattern("pd.*")`  | ❌         | ✅         | ❌          |
//! | `exact("pdserver")`| ❌         | ✅         | ❌          |
//! | `any()`            | ✅         | ✅         | ✅          |
//!
//! ## Last Modified
//! v0.1.0 - Initial implementation

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use riffle_common::Identity;

use crate::error::{PortalError, Result};

type Predicate = Arc<dyn Fn(&Identity) -> bool + Send + Sync>;

/// Predicate selecting the realm for an identity.
#[derive(Clone)]
pub enum Matcher {
    /// Regular expression that must match at the start of the identity.
    Pattern {
        /// Expression as written by the host
        source: String,
        /// `source` compiled with a leading anchor
        regex: Regex,
    },
    /// Exactly this identity.
    Exact(Identity),
    /// Every identity.
    Any,
    /// Application-defined test.
    Predicate(Predicate),
}

impl Matcher {
    /// Compiles a start-anchored pattern.
    ///
    /// # Errors
    /// Returns `InvalidMatcher` if `expr` is not a valid regex.
    pub fn pattern(expr: &str) -> Result<Self> {
        let regex = Regex::new(&format!("^(?:{expr})"))
            .map_err(|e| PortalError::invalid_matcher(expr, e.to_string()))?;
        Ok(Self::Pattern {
            source: expr.to_owned(),
            regex,
        })
    }

    /// Matches one identity exactly.
    #[must_use]
    pub fn exact(identity: Identity) -> Self {
        Self::Exact(identity)
    }

    /// Matches everything.
    #[must_use]
    pub fn any() -> Self {
        Self::Any
    }

    /// Matches when `f` returns `true`.
    pub fn predicate(f: impl Fn(&Identity) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    /// Tests `identity`.
    #[must_use]
    pub fn matches(&self, identity: &Identity) -> bool {
        match self {
            Self::Pattern { regex, .. } => regex.is_match(identity.as_str()),
            Self::Exact(expected) => expected == identity,
            Self::Any => true,
            Self::Predicate(f) => f(identity),
        }
    }

    /// Short human readable form, used as the realm name.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Pattern { source, .. } => format!("/{source}/"),
            Self::Exact(identity) => format!("={identity}"),
            Self::Any => "*".to_owned(),
            Self::Predicate(_) => "<predicate>".to_owned(),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Matcher").field(&self.describe()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identity {
        Identity::new(name).unwrap()
    }

    #[test]
    fn test_pattern_is_anchored_at_start() {
        let m = Matcher::pattern("device").unwrap();
        assert!(m.matches(&id("device-1")));
        assert!(m.matches(&id("device")));
        assert!(!m.matches(&id("xdevice-1")));
        assert!(!m.matches(&id("pdserver")));
    }

    #[test]
    fn test_pattern_alternation_stays_anchored() {
        let m = Matcher::pattern("pd|router").unwrap();
        assert!(m.matches(&id("pdserver")));
        assert!(m.matches(&id("router-7")));
        assert!(!m.matches(&id("edge-router")));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = Matcher::pattern("device(").unwrap_err();
        assert!(matches!(err, PortalError::InvalidMatcher { .. }));
    }

    #[test]
    fn test_other_variants() {
        assert!(Matcher::exact(id("pdserver")).matches(&id("pdserver")));
        assert!(!Matcher::exact(id("pdserver")).matches(&id("pdserver2")));
        assert!(Matcher::any().matches(&id("rogue-x")));

        let m = Matcher::predicate(|identity| identity.as_str().ends_with(".lab"));
        assert!(m.matches(&id("node.lab")));
        assert!(!m.matches(&id("node.prod")));
        assert_eq!(m.describe(), "<predicate>");
    }
}
