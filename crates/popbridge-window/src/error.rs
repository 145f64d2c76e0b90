use popbridge_protocol::SessionId;

/// Errors that can occur in the window layer.
#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    /// The host refused to open the popup (popup blocker, no user
    /// gesture, headless environment).
    #[error("popup blocked by the host environment")]
    PopupBlocked,

    /// A listener for this session is already registered on the bus.
    #[error("message listener already registered for session {0}")]
    DuplicateListener(SessionId),

    /// The window was closed before the operation could run.
    #[error("window closed")]
    Closed,

    /// A payload could not be encoded for posting.
    #[error(transparent)]
    Protocol(#[from] popbridge_protocol::ProtocolError),
}
