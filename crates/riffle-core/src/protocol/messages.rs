// ============================================
// File: crates/riffle-core/src/protocol/messages.rs
// ============================================
//! # Protocol Message Definitions
//!
//! ## Creation Reason
//! Defines the frames exchanged between two Riffle endpoints and the
//! value model carried inside them.
//!
//! ## Main Functionality
//! - `Frame`: Call / Reply / Fault / Release
//! - `Value`: Dynamically typed argument and result values
//! - `RemoteFault` + `FaultKind`: Errors reported by the peer
//!
//! ## Frame Summary
//! | Frame   | Direction            | Purpose                          |
//! |---------|----------------------|----------------------------------|
//! | Call    | caller → exporter    | Invoke `method` on `target`      |
//! | Reply   | exporter → caller    | Successful result of call `id`   |
//! | Fault   | exporter → caller    | Failed result of call `id`       |
//! | Release | holder → exporter    | Holder drops its handle `target` |
//!
//! ## ⚠️ Important Note for Next Developer
//! - Call ids are chosen by the caller and only unique per direction
//! - Add new `FaultKind` variants at the end; peers match on them
//!
//! ## Last Modified
//! v0.1.0 - Initial message definitions

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use riffle_common::ObjectId;

// ============================================
// Value
// ============================================

/// Argument or result value carried by a frame.
///
/// `Remote(id)` is a handle into the export table of whichever side sent
/// the frame containing it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    Str(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Ordered list.
    List(Vec<Value>),
    /// String-keyed map.
    Map(BTreeMap<String, Value>),
    /// Handle to an object exported by the sender.
    Remote(ObjectId),
}

impl Value {
    /// Returns the string if this is a `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer if this is an `Int`.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean if this is a `Bool`.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the object id if this is a `Remote`.
    #[must_use]
    pub const fn as_remote(&self) -> Option<ObjectId> {
        match self {
            Self::Remote(id) => Some(*id),
            _ => None,
        }
    }

    /// Returns `true` for `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short type name, used in fault messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Bytes(_) => "bytes",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Remote(_) => "remote",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Self::Remote(id)
    }
}

// ============================================
// Faults
// ============================================

/// Category of a fault reported by the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// No realm accepted the caller's identity.
    NoMatchingRealm,
    /// The avatar's `initialize` hook failed or timed out.
    Initialization,
    /// The call targeted an object id that is not exported.
    NoSuchObject,
    /// The target object does not implement the method.
    NoSuchMethod,
    /// Arguments were missing or had the wrong type.
    InvalidArguments,
    /// The target exists but cannot serve calls right now.
    InvalidState,
    /// Application-defined failure raised by a handler.
    Application,
    /// Unexpected failure on the remote side.
    Internal,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoMatchingRealm => "no matching realm",
            Self::Initialization => "initialization failed",
            Self::NoSuchObject => "no such object",
            Self::NoSuchMethod => "no such method",
            Self::InvalidArguments => "invalid arguments",
            Self::InvalidState => "invalid state",
            Self::Application => "application error",
            Self::Internal => "internal error",
        };
        f.write_str(name)
    }
}

/// Error reported by the peer in a `Fault` frame.
///
/// # Example
/// ```
/// use riffle_core::protocol::{FaultKind, RemoteFault};
///
/// let fault = RemoteFault::no_such_method("reboot");
/// assert_eq!(fault.kind, FaultKind::NoSuchMethod);
/// assert!(fault.to_string().contains("reboot"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct RemoteFault {
    /// Fault category.
    pub kind: FaultKind,
    /// Human readable detail.
    pub message: String,
}

impl RemoteFault {
    /// Creates a fault of the given kind.
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an `Application` fault.
    pub fn application(message: impl Into<String>) -> Self {
        Self::new(FaultKind::Application, message)
    }

    /// Creates a `NoSuchMethod` fault for `method`.
    pub fn no_such_method(method: impl fmt::Display) -> Self {
        Self::new(FaultKind::NoSuchMethod, format!("method '{method}' not found"))
    }

    /// Creates an `InvalidArguments` fault.
    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(FaultKind::InvalidArguments, message)
    }

    /// Creates an `InvalidState` fault.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(FaultKind::InvalidState, message)
    }
}

// ============================================
// Frame
// ============================================

/// One unit of the wire protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum Frame {
    /// Invoke `method` on the receiver's exported object `target`.
    Call {
        /// Caller-chosen id echoed in the matching Reply/Fault.
        id: u64,
        /// Object in the receiver's export table.
        target: ObjectId,
        /// Method name.
        method: String,
        /// Positional arguments.
        args: Vec<Value>,
    },
    /// Successful completion of call `id`.
    Reply {
        /// Id of the call being answered.
        id: u64,
        /// Result value.
        value: Value,
    },
    /// Failed completion of call `id`.
    Fault {
        /// Id of the call being answered.
        id: u64,
        /// Reported fault.
        fault: RemoteFault,
    },
    /// The sender drops its handle to the receiver's object `target`.
    Release {
        /// Object in the receiver's export table.
        target: ObjectId,
    },
}

impl Frame {
    /// Short frame name for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Call { .. } => "call",
            Self::Reply { .. } => "reply",
            Self::Fault { .. } => "fault",
            Self::Release { .. } => "release",
        }
    }
}

// ============================================
// Tests
// ============================================
