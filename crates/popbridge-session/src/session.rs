//! Session types: the record of one linking attempt.
//!
//! A link session tracks:
//! - WHICH attempt this is (`SessionId`)
//! - WHERE it is in its lifecycle (`SessionState`)
//! - WHICH popup it owns (`WindowId`), until it finishes
//! - WHEN it started (so callers can spot stale attempts)

use std::time::{Duration, Instant};

use popbridge_protocol::{OriginPolicy, SessionId, WindowId};
use rand::Rng;

use crate::SessionError;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Per-session behaviour.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the popup is polled for manual closure.
    ///
    /// Default: 500 ms.
    pub poll_interval: Duration,

    /// How long to wait for a result before giving up with `TimedOut`.
    ///
    /// Default: `None`, wait until a message arrives or the popup closes.
    pub timeout: Option<Duration>,

    /// Which sender origins are trusted.
    ///
    /// Default: the origin of the URL the popup was opened at.
    pub origin_policy: OriginPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            timeout: None,
            origin_policy: OriginPolicy::PopupUrl,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// The lifecycle state of a link session.
///
/// ```text
/// Idle → Opening ─┬─→ AwaitingResult ─┬─→ Succeeded
///                 │                   ├─→ Failed
///                 ├─→ Failed          ├─→ Cancelled
///                 └─→ Aborted         ├─→ TimedOut
///                                     └─→ Aborted
/// ```
///
/// - **Opening**: the launcher is being asked for a popup.
/// - **AwaitingResult**: the popup is open; listener, watcher and
///   deadline are armed.
/// - **Succeeded / Failed / Cancelled / TimedOut / Aborted**: terminal.
///   `Failed` covers both a blocked popup and a provider error;
///   `Cancelled` means the user closed the popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Opening,
    AwaitingResult,
    Succeeded,
    Failed,
    Cancelled,
    TimedOut,
    Aborted,
}

impl SessionState {
    /// Returns `true` for states with no successors.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Cancelled | Self::TimedOut | Self::Aborted
        )
    }

    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        use SessionState::*;
        matches!(
            (self, target),
            (Idle, Opening)
                | (Opening, AwaitingResult | Failed | Aborted)
                | (AwaitingResult, Succeeded | Failed | Cancelled | TimedOut | Aborted)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "Idle",
            Self::Opening => "Opening",
            Self::AwaitingResult => "AwaitingResult",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Cancelled => "Cancelled",
            Self::TimedOut => "TimedOut",
            Self::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// LinkSession
// ---------------------------------------------------------------------------

/// One attempt to link or log in through a provider popup.
///
/// Mutated only by the session's coordinator; there is no persisted form.
#[derive(Debug, Clone)]
pub struct LinkSession {
    id: SessionId,
    state: SessionState,
    popup: Option<WindowId>,
    created_at: Instant,
    pending_payload: Option<Vec<u8>>,
}

impl LinkSession {
    /// Creates an `Idle` session with a fresh random id.
    pub fn new() -> Self {
        Self::with_id(generate_session_id())
    }

    /// Creates an `Idle` session with a caller-chosen id.
    pub fn with_id(id: SessionId) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            popup: None,
            created_at: Instant::now(),
            pending_payload: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The popup this session owns, if it is still awaiting a result.
    pub fn popup(&self) -> Option<WindowId> {
        self.popup
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// `true` if the session is still live and older than `max_age`.
    pub fn is_stale(&self, max_age: Duration) -> bool {
        !self.state.is_terminal() && self.age() > max_age
    }

    /// Moves the session to `to` and returns the state it left.
    ///
    /// A terminal transition releases the popup and any held payload.
    ///
    /// # Errors
    /// - [`SessionError::AlreadyTerminal`] if the session already finished
    /// - [`SessionError::InvalidTransition`] for any other illegal move
    pub fn transition(&mut self, to: SessionState) -> Result<SessionState, SessionError> {
        let from = self.state;
        if from.is_terminal() {
            return Err(SessionError::AlreadyTerminal(self.id, from));
        }
        if !from.can_transition_to(to) {
            return Err(SessionError::InvalidTransition { from, to });
        }
        self.state = to;
        if to.is_terminal() {
            self.popup = None;
            self.pending_payload = None;
        }
        tracing::debug!(session_id = %self.id, %from, %to, "session transition");
        Ok(from)
    }

    /// Records the opened popup and moves `Opening → AwaitingResult`.
    ///
    /// # Errors
    /// Same as [`transition`](Self::transition).
    pub fn popup_opened(&mut self, window: WindowId) -> Result<(), SessionError> {
        self.transition(SessionState::AwaitingResult)?;
        self.popup = Some(window);
        Ok(())
    }

    /// Holds an unvalidated payload while it is being classified.
    pub fn hold_payload(&mut self, data: Vec<u8>) {
        self.pending_payload = Some(data);
    }

    /// Takes the held payload, leaving nothing behind.
    pub fn take_payload(&mut self) -> Option<Vec<u8>> {
        self.pending_payload.take()
    }

    pub fn pending_payload(&self) -> Option<&[u8]> {
        self.pending_payload.as_deref()
    }
}

impl Default for LinkSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Generates a random 128-bit session id.
///
/// Ids are never reused within a process in practice; 2^128 values make a
/// collision between concurrent attempts negligible, and the registry
/// rejects one anyway.
fn generate_session_id() -> SessionId {
    SessionId(rand::rng().random())
}
