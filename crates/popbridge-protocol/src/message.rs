//! Provider message payloads.
//!
//! When the provider finishes, its page calls
//! `window.opener.postMessage(payload, openerOrigin)` with one of exactly
//! three shapes:
//!
//! ```text
//! { "success": true, "token": "…", "user": { … } }   → Success
//! { "success": true }                                  → Established
//! { "error": "…" }                                     → ProviderError
//! ```
//!
//! Anything else is not a provider message and is ignored by the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Codec, Origin, ProtocolError};

/// Error text used when a provider posts `{"success": false}` without
/// saying why.
pub const UNSPECIFIED_FAILURE: &str = "provider reported failure";

// ---------------------------------------------------------------------------
// Wire representation
// ---------------------------------------------------------------------------

/// The raw, loosely-typed payload as it appears on the wire.
///
/// Every field is optional here; [`MessageBody`]'s `TryFrom` impl decides
/// which combination means what.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WirePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// MessageBody
// ---------------------------------------------------------------------------

/// A validated provider payload.
///
/// `#[serde(try_from, into)]` routes (de)serialization through
/// [`WirePayload`], so decoding a `MessageBody` directly also rejects
/// unrecognized shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WirePayload", into = "WirePayload")]
pub enum MessageBody {
    /// The provider issued a credential.
    ///
    /// `user` is `Value::Null` when the provider sent a token but no
    /// profile.
    Success { token: String, user: Value },

    /// `{"success": true}` with no token: the session already exists
    /// server-side (typically a cookie), nothing to hand over.
    Established,

    /// The provider reported a failure.
    ProviderError { error: String },
}

impl TryFrom<WirePayload> for MessageBody {
    type Error = ProtocolError;

    fn try_from(wire: WirePayload) -> Result<Self, Self::Error> {
        // An explicit error wins over any success flag sent alongside it.
        if let Some(error) = wire.error {
            return Ok(Self::ProviderError { error });
        }
        match (wire.success, wire.token) {
            (Some(true), Some(token)) => Ok(Self::Success {
                token,
                user: wire.user.unwrap_or(Value::Null),
            }),
            (Some(true), None) => Ok(Self::Established),
            (Some(false), _) => Ok(Self::ProviderError {
                error: UNSPECIFIED_FAILURE.to_string(),
            }),
            (None, _) => Err(ProtocolError::InvalidMessage(
                "payload has neither `success` nor `error`".into(),
            )),
        }
    }
}

impl From<MessageBody> for WirePayload {
    fn from(body: MessageBody) -> Self {
        match body {
            MessageBody::Success { token, user } => Self {
                success: Some(true),
                token: Some(token),
                user: (!user.is_null()).then_some(user),
                error: None,
            },
            MessageBody::Established => Self {
                success: Some(true),
                ..Self::default()
            },
            MessageBody::ProviderError { error } => Self {
                error: Some(error),
                ..Self::default()
            },
        }
    }
}

impl MessageBody {
    /// Decodes raw bytes into a body.
    ///
    /// Unlike decoding `MessageBody` through the codec directly, this
    /// keeps the two failure kinds apart: bytes that are not a JSON object
    /// come back as [`ProtocolError::Decode`], a well-formed object of the
    /// wrong shape as [`ProtocolError::InvalidMessage`].
    ///
    /// # Errors
    /// See above.
    pub fn decode<C: Codec>(codec: &C, data: &[u8]) -> Result<Self, ProtocolError> {
        let wire: WirePayload = codec.decode(data)?;
        Self::try_from(wire)
    }

    /// Turns the body into the outcome a session cares about.
    pub fn classify(self) -> Classification {
        match self {
            Self::Success { token, user } => Classification::Success(Credential {
                token: Some(token),
                user: Some(user),
            }),
            Self::Established => Classification::Success(Credential::default()),
            Self::ProviderError { error } => Classification::ProviderError(error),
        }
    }
}

// ---------------------------------------------------------------------------
// ProviderMessage
// ---------------------------------------------------------------------------

/// A provider payload together with the origin it was posted from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMessage {
    /// Origin the host reports for the sending window.
    pub origin: Origin,
    /// The validated payload.
    pub body: MessageBody,
}

impl ProviderMessage {
    /// Decodes `data` received from `origin`.
    ///
    /// # Errors
    /// Same as [`MessageBody::decode`].
    pub fn decode<C: Codec>(
        codec: &C,
        origin: Origin,
        data: &[u8],
    ) -> Result<Self, ProtocolError> {
        let body = MessageBody::decode(codec, data)?;
        Ok(Self { origin, body })
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// What the caller receives on success.
///
/// Both fields are `None` when the provider only confirmed an existing
/// server-side session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub token: Option<String>,
    pub user: Option<Value>,
}

impl Credential {
    /// `true` when the provider handed over a token.
    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

/// The classified result of a provider message.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// `Success(token, user)` or `Success(no payload)`.
    Success(Credential),
    /// The provider's own error text.
    ProviderError(String),
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::JsonCodec;

    fn decode(value: Value) -> Result<MessageBody, ProtocolError> {
        let bytes = serde_json::to_vec(&value).unwrap();
        MessageBody::decode(&JsonCodec, &bytes)
    }

    #[test]
    fn test_decode_success_with_token_and_user() {
        let body = decode(json!({"success": true, "token": "abc", "user": {"id": 1}})).unwrap();
        assert_eq!(
            body,
            MessageBody::Success {
                token: "abc".into(),
                user: json!({"id": 1}),
            }
        );
    }

    #[test]
    fn test_decode_bare_success_is_established() {
        assert_eq!(decode(json!({"success": true})).unwrap(), MessageBody::Established);
    }

    #[test]
    fn test_decode_error_is_provider_error() {
        assert_eq!(
            decode(json!({"error": "denied"})).unwrap(),
            MessageBody::ProviderError { error: "denied".into() }
        );
    }

    #[test]
    fn test_decode_error_wins_over_success_flag() {
        let body = decode(json!({"success": true, "token": "t", "error": "revoked"})).unwrap();
        assert_eq!(body, MessageBody::ProviderError { error: "revoked".into() });
    }

    #[test]
    fn test_decode_success_false_uses_generic_text() {
        assert_eq!(
            decode(json!({"success": false})).unwrap(),
            MessageBody::ProviderError { error: UNSPECIFIED_FAILURE.into() }
        );
    }

    #[test]
    fn test_decode_token_without_user_defaults_to_null() {
        let body = decode(json!({"success": true, "token": "abc"})).unwrap();
        assert_eq!(body, MessageBody::Success { token: "abc".into(), user: Value::Null });
    }

    #[test]
    fn test_decode_unrelated_object_is_invalid_message() {
        // e.g. a devtools extension or a framework posting its own chatter
        let result = decode(json!({"type": "webpackOk"}));
        assert!(matches!(result, Err(ProtocolError::InvalidMessage(_))));
    }

    #[test]
    fn test_decode_non_object_is_decode_error() {
        assert!(matches!(decode(json!("hello")), Err(ProtocolError::Decode(_))));
        assert!(matches!(
            MessageBody::decode(&JsonCodec, b"{not json"),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_wrongly_typed_error_field_is_decode_error() {
        assert!(matches!(
            decode(json!({"error": {"code": 3}})),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_classify_success_carries_credential() {
        let c = MessageBody::Success { token: "abc".into(), user: json!({"id": 1}) }.classify();
        assert_eq!(
            c,
            Classification::Success(Credential {
                token: Some("abc".into()),
                user: Some(json!({"id": 1})),
            })
        );
    }

    #[test]
    fn test_classify_established_has_empty_credential() {
        let Classification::Success(cred) = MessageBody::Established.classify() else {
            panic!("expected success");
        };
        assert!(!cred.has_token());
        assert_eq!(cred.user, None);
    }

    #[test]
    fn test_encode_established_is_bare_success() {
        let bytes = JsonCodec.encode(&MessageBody::Established).unwrap();
        assert_eq!(bytes, br#"{"success":true}"#);
    }

    #[test]
    fn test_provider_message_decode_keeps_origin() {
        let origin = Origin::parse("https://auth.example.com").unwrap();
        let msg = ProviderMessage::decode(&JsonCodec, origin.clone(), br#"{"success":true}"#)
            .unwrap();
        assert_eq!(msg.origin, origin);
        assert_eq!(msg.body, MessageBody::Established);
    }
}
