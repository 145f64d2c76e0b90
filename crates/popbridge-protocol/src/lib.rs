//! Wire protocol for Popbridge.
//!
//! This crate defines what a provider popup says to the window that
//! opened it:
//!
//! - **Messages** ([`ProviderMessage`], [`MessageBody`], [`Classification`],
//!   [`Credential`]): the three recognized payload shapes and what they
//!   mean to a linking session.
//! - **Identity** ([`SessionId`], [`WindowId`]).
//! - **Origins** ([`Origin`], [`OriginPolicy`]): who is allowed to say it.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how payload bytes become
//!   messages.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about windows or sessions.
//!
//! ```text
//! Window host (bytes + origin) → Protocol (Classification) → Session
//! ```

mod codec;
mod error;
mod ids;
mod message;
mod origin;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use ids::{SessionId, WindowId};
pub use message::{
    Classification, Credential, MessageBody, ProviderMessage, UNSPECIFIED_FAILURE, WirePayload,
};
pub use origin::{Origin, OriginPolicy};
