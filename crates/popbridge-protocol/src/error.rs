//! Error types for the protocol layer.
//!
//! Each crate in Popbridge defines its own error enum. A `ProtocolError`
//! always means the problem is in the payload or its origin, never in the
//! window host or the session state machine.

/// Errors that can occur while decoding or validating provider messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, a non-object payload, or a
    /// `token`/`error` field with the wrong type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The payload decoded, but it is not one of the recognized shapes.
    ///
    /// This is what a message without `success` or `error` keys turns
    /// into. Callers treat it as "not for us" and keep waiting.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The origin string could not be parsed, or it is opaque
    /// (`data:`, `file:` and friends have no usable origin).
    #[error("invalid origin: {0}")]
    InvalidOrigin(String),
}
