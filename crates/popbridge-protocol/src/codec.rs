//! Codec trait and implementations for provider payloads.
//!
//! A popup hands its opener a structured-clone value; by the time it
//! reaches Rust it is a byte buffer. The [`Codec`] trait is the single
//! place where those bytes become a [`ProviderMessage`](crate::ProviderMessage)
//! body, and where test hosts turn a body back into bytes.
//!
//! Only [`JsonCodec`] is provided. Providers post plain JSON objects, so
//! nothing else has been needed so far.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// ## Trait bounds
///
/// - `Send + Sync` → one codec is shared by every session's message
///   channel, and those channels live in separate Tokio tasks.
/// - `'static` → the codec owns everything it needs.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed, or
    /// whatever error the target type's own validation produces.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use popbridge_protocol::{Codec, JsonCodec, MessageBody};
///
/// let codec = JsonCodec;
/// let body: MessageBody = codec.decode(br#"{"error":"denied"}"#).unwrap();
/// assert_eq!(body, MessageBody::ProviderError { error: "denied".into() });
///
/// let bytes = codec.encode(&body).unwrap();
/// assert_eq!(bytes, br#"{"error":"denied"}"#);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
