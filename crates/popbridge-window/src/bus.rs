//! The opener page's inter-window message bus.
//!
//! In a browser every `message` listener on a page sees every message
//! posted to it. [`MessageBus`] models that fan-out, but listeners are
//! registered per session id instead of as anonymous globals: each
//! [`Subscription`] owns its slot and removes it when dropped, so a
//! finished session can never leave a listener behind.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use popbridge_protocol::{SessionId, WindowId};
use tokio::sync::mpsc;

use crate::WindowError;

/// A message as the host hands it to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// The origin the host reports for the sender, unparsed.
    /// Browsers use the literal string `"null"` for opaque origins.
    pub origin: String,
    /// The sending window, when the host can tell.
    pub source: Option<WindowId>,
    /// The payload bytes.
    pub data: Vec<u8>,
}

type Listener = mpsc::UnboundedSender<InboundMessage>;

#[derive(Default)]
struct BusInner {
    listeners: HashMap<SessionId, Listener>,
}

/// Fan-out of posted messages to every registered session listener.
///
/// Cheap to clone; clones share the same listener table.
///
/// The table is behind a `std::sync::Mutex`, not a Tokio one: it is never
/// held across an `.await`, and [`Subscription`]'s `Drop` must be able to
/// remove its entry synchronously.
#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Arc<Mutex<BusInner>>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a listener for `session_id`.
    ///
    /// # Errors
    /// Returns [`WindowError::DuplicateListener`] if the session already
    /// has one.
    pub fn subscribe(&self, session_id: SessionId) -> Result<Subscription, WindowError> {
        let mut inner = self.lock();
        if inner.listeners.contains_key(&session_id) {
            return Err(WindowError::DuplicateListener(session_id));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        inner.listeners.insert(session_id, tx);
        tracing::debug!(%session_id, listeners = inner.listeners.len(), "message listener registered");
        Ok(Subscription {
            session_id,
            receiver: rx,
            bus: Arc::clone(&self.inner),
        })
    }

    /// Delivers `message` to every registered listener.
    ///
    /// Returns how many listeners received it. Posting with no listeners
    /// is not an error; the message is simply lost, as in a browser.
    pub fn post(&self, message: InboundMessage) -> usize {
        let inner = self.lock();
        let mut delivered = 0;
        for tx in inner.listeners.values() {
            if tx.send(message.clone()).is_ok() {
                delivered += 1;
            }
        }
        tracing::trace!(origin = %message.origin, delivered, "message posted");
        delivered
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Whether `session_id` currently has a listener.
    pub fn is_subscribed(&self, session_id: SessionId) -> bool {
        self.lock().listeners.contains_key(&session_id)
    }
}

/// One session's registration on the bus.
///
/// Dropping it unregisters the listener.
pub struct Subscription {
    session_id: SessionId,
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
    bus: Arc<Mutex<BusInner>>,
}

impl Subscription {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Waits for the next message. Cancel-safe.
    ///
    /// Never returns `None` while the subscription is alive, since the
    /// sending half stays in the bus table until `self` is dropped.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.receiver.recv().await
    }

    /// Returns a message that has already been delivered, if any.
    pub fn try_recv(&mut self) -> Option<InboundMessage> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut inner = self.bus.lock().unwrap_or_else(PoisonError::into_inner);
        inner.listeners.remove(&self.session_id);
        tracing::debug!(
            session_id = %self.session_id,
            listeners = inner.listeners.len(),
            "message listener removed"
        );
    }
}
