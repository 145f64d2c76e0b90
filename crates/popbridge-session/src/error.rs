//! Error types for the session layer.

use popbridge_protocol::{SessionId, WindowId};

use crate::SessionState;

/// Errors that can occur while driving a link session.
///
/// Every variant here is a programming or host error, not an outcome:
/// outcomes (success, provider error, cancellation) travel through the
/// result sink, never through `SessionError`.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session with this id is registered.
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// The state machine does not allow this transition.
    #[error("invalid session transition {from} → {to}")]
    InvalidTransition { from: SessionState, to: SessionState },

    /// The session already reached a terminal state.
    #[error("session {0} already finished as {1}")]
    AlreadyTerminal(SessionId, SessionState),

    /// Another live session owns this popup window.
    #[error("window {window} is owned by session {owner}")]
    PopupInUse { window: WindowId, owner: SessionId },

    /// A session with this id is already registered.
    #[error("session {0} already registered")]
    DuplicateSession(SessionId),
}
