//! The per-session message channel.
//!
//! Wraps one bus [`Subscription`] and turns the raw stream of cross-window
//! messages into at most one classified outcome:
//!
//! ```text
//! InboundMessage ─→ source check ─→ origin check ─→ decode ─→ ProviderMessage ─→ Classification
//!                        │               │             │
//!                        ▼               ▼             ▼
//!                     ignored         ignored       ignored
//! ```
//!
//! Dropping the channel unsubscribes it.

use popbridge_protocol::{
    Classification, Codec, JsonCodec, Origin, OriginPolicy, ProviderMessage, SessionId, WindowId,
};
use popbridge_window::{InboundMessage, MessageBus, Subscription, WindowError};
use tracing::{debug, warn};

/// A message that passed the source and origin checks, not yet decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustedMessage {
    pub origin: Origin,
    pub data: Vec<u8>,
}

/// Receives provider messages for exactly one session.
pub struct MessageChannel<C: Codec = JsonCodec> {
    subscription: Subscription,
    codec: C,
    /// Already resolved against the popup URL.
    policy: OriginPolicy,
    popup: WindowId,
    latched: bool,
    ignored: u64,
}

impl<C: Codec> MessageChannel<C> {
    /// Subscribes `session_id` on `bus`, trusting only messages from
    /// `popup` whose origin `policy` allows.
    ///
    /// `policy` must already be resolved; an unresolved
    /// [`OriginPolicy::PopupUrl`] trusts nothing.
    ///
    /// # Errors
    /// [`WindowError::DuplicateListener`] if the session already listens.
    pub fn open(
        bus: &MessageBus,
        session_id: SessionId,
        popup: WindowId,
        policy: OriginPolicy,
        codec: C,
    ) -> Result<Self, WindowError> {
        let subscription = bus.subscribe(session_id)?;
        if policy.is_permissive() {
            warn!(%session_id, "origin policy accepts any sender; messages are not origin-checked");
        }
        debug!(%session_id, window_id = %popup, ?policy, "message channel open");
        Ok(Self {
            subscription,
            codec,
            policy,
            popup,
            latched: false,
            ignored: 0,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.subscription.session_id()
    }

    /// `true` once a message has been classified. A latched channel
    /// ignores everything that follows.
    pub fn is_latched(&self) -> bool {
        self.latched
    }

    /// Messages dropped so far for failing a check.
    pub fn ignored(&self) -> u64 {
        self.ignored
    }

    /// Waits for the next message that passes the source and origin
    /// checks. Pends forever once latched or if the bus goes away.
    ///
    /// Cancel-safe.
    pub async fn recv(&mut self) -> TrustedMessage {
        loop {
            if self.latched {
                return std::future::pending().await;
            }
            let Some(message) = self.subscription.recv().await else {
                return std::future::pending().await;
            };
            match self.trust(message) {
                Some(trusted) => return trusted,
                None => self.ignored += 1,
            }
        }
    }

    /// Non-blocking [`recv`](Self::recv): returns a trusted message that
    /// was already delivered, skipping untrusted ones.
    pub fn try_recv(&mut self) -> Option<TrustedMessage> {
        if self.latched {
            return None;
        }
        while let Some(message) = self.subscription.try_recv() {
            if let Some(trusted) = self.trust(message) {
                return Some(trusted);
            }
            self.ignored += 1;
        }
        None
    }

    /// Decodes a trusted payload sent from `origin` and classifies it.
    ///
    /// Returns `None` (and stays open) if the payload has no recognizable
    /// shape, or if the channel is already latched.
    pub fn classify(&mut self, origin: &Origin, data: &[u8]) -> Option<Classification> {
        if self.latched {
            return None;
        }
        match ProviderMessage::decode(&self.codec, origin.clone(), data) {
            Ok(message) => {
                self.latched = true;
                let classification = message.body.classify();
                debug!(
                    session_id = %self.session_id(),
                    origin = %message.origin,
                    ?classification,
                    "provider message classified"
                );
                Some(classification)
            }
            Err(e) => {
                self.ignored += 1;
                debug!(session_id = %self.session_id(), error = %e, "ignoring malformed provider message");
                None
            }
        }
    }

    /// Waits for the first classifiable trusted message.
    pub async fn next(&mut self) -> Classification {
        loop {
            let message = self.recv().await;
            if let Some(classification) = self.classify(&message.origin, &message.data) {
                return classification;
            }
        }
    }

    /// Non-blocking [`next`](Self::next).
    pub fn try_next(&mut self) -> Option<Classification> {
        while let Some(message) = self.try_recv() {
            if let Some(classification) = self.classify(&message.origin, &message.data) {
                return Some(classification);
            }
        }
        None
    }

    /// Applies the source and origin checks.
    fn trust(&self, message: InboundMessage) -> Option<TrustedMessage> {
        let session_id = self.session_id();
        if message.source.is_some_and(|source| source != self.popup) {
            debug!(%session_id, source = ?message.source, "ignoring message from another window");
            return None;
        }
        match Origin::parse(&message.origin) {
            Ok(origin) if self.policy.allows(&origin) => Some(TrustedMessage {
                origin,
                data: message.data,
            }),
            Ok(origin) => {
                debug!(%session_id, %origin, "ignoring message from untrusted origin");
                None
            }
            Err(e) => {
                debug!(%session_id, error = %e, "ignoring message with unparseable origin");
                None
            }
        }
    }
}
