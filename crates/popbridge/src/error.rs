//! Outcome reasons and the unified error type.

use std::time::Duration;

use popbridge_protocol::ProtocolError;
use popbridge_session::{SessionError, SessionState};
use popbridge_window::WindowError;

/// Why a session did not succeed. Delivered through
/// [`ResultSink::on_error`](crate::ResultSink::on_error), never returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// The launcher could not open a window. No retry.
    #[error("popup blocked by the host environment")]
    PopupBlocked,

    /// The provider reported failure; carries its message text.
    #[error("provider error: {0}")]
    Provider(String),

    /// The user closed the popup before any result arrived.
    #[error("popup closed by the user")]
    UserCancelled,

    /// No result within the configured deadline.
    #[error("no result within {0:?}")]
    TimedOut(Duration),

    /// The caller aborted the session.
    #[error("aborted by the caller")]
    Aborted,

    /// The popup opened, but the session could not be armed around it
    /// (listener slot or window already taken by another session).
    #[error("session could not be armed: {0}")]
    Unavailable(String),
}

impl LinkError {
    /// `true` for outcomes the user or caller chose. UIs typically show
    /// no error banner for these.
    pub fn is_user_initiated(&self) -> bool {
        matches!(self, Self::UserCancelled | Self::Aborted)
    }

    /// The terminal state a session ends in when failing this way.
    pub fn terminal_state(&self) -> SessionState {
        match self {
            Self::PopupBlocked | Self::Provider(_) | Self::Unavailable(_) => SessionState::Failed,
            Self::UserCancelled => SessionState::Cancelled,
            Self::TimedOut(_) => SessionState::TimedOut,
            Self::Aborted => SessionState::Aborted,
        }
    }
}

/// Top-level error that wraps all crate-specific errors.
///
/// Returned only when a session cannot be started at all (a bad URL, a
/// bad provider base). Once a session exists, every outcome goes through
/// its result sink instead.
#[derive(Debug, thiserror::Error)]
pub enum PopbridgeError {
    /// A protocol-level error (origin, payload).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A window-host error.
    #[error(transparent)]
    Window(#[from] WindowError),

    /// A session bookkeeping error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The linker configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}
