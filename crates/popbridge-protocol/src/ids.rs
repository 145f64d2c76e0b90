//! Identity types shared by every layer.
//!
//! Newtype wrappers keep a window id from being passed where a session id
//! is expected, even though both are plain integers underneath.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one linking attempt.
///
/// Opaque and unique per attempt: the message bus keys each session's
/// listener by it, and the registry keys each session's slot by it.
/// Rendered as `L-` followed by 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u128);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L-{:032x}", self.0)
    }
}

/// Identifies a window opened by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "W-{}", self.0)
    }
}
