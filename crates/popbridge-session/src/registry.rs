//! The session registry: an arena of live sessions keyed by id.
//!
//! Every running attempt has one slot here, holding whatever the owner
//! needs to reach it later (for the facade crate: an abort handle). The
//! registry also indexes popup ownership, so no window can ever be
//! claimed by two sessions at once.
//!
//! # Concurrency note
//!
//! `SessionRegistry` is NOT thread-safe by itself. The owner wraps it in
//! a lock at a higher level and never holds that lock across an `.await`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use popbridge_protocol::{SessionId, WindowId};

use crate::SessionError;

/// One registered session.
#[derive(Debug)]
pub struct RegistryEntry<T> {
    pub created_at: Instant,
    pub popup: Option<WindowId>,
    pub value: T,
}

/// Arena of live sessions.
///
/// ```text
/// insert() ──→ claim_popup() ──→ remove()
///                   │               │
///                   ▼               ▼
///            [window indexed]  [window released]
/// ```
#[derive(Debug)]
pub struct SessionRegistry<T> {
    entries: HashMap<SessionId, RegistryEntry<T>>,
    /// Which session owns each claimed popup. Kept in sync with `entries`.
    popups: HashMap<WindowId, SessionId>,
}

impl<T> SessionRegistry<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            popups: HashMap::new(),
        }
    }

    /// Registers a session.
    ///
    /// # Errors
    /// [`SessionError::DuplicateSession`] if the id is taken.
    pub fn insert(&mut self, id: SessionId, value: T) -> Result<(), SessionError> {
        if self.entries.contains_key(&id) {
            return Err(SessionError::DuplicateSession(id));
        }
        self.entries.insert(
            id,
            RegistryEntry {
                created_at: Instant::now(),
                popup: None,
                value,
            },
        );
        tracing::debug!(session_id = %id, live = self.entries.len(), "session registered");
        Ok(())
    }

    /// Gives `window` to session `id`.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`] if `id` is not registered
    /// - [`SessionError::PopupInUse`] if another session owns the window
    pub fn claim_popup(&mut self, id: SessionId, window: WindowId) -> Result<(), SessionError> {
        if let Some(&owner) = self.popups.get(&window) {
            if owner != id {
                return Err(SessionError::PopupInUse { window, owner });
            }
        }
        let entry = self.entries.get_mut(&id).ok_or(SessionError::NotFound(id))?;
        if let Some(previous) = entry.popup.replace(window) {
            self.popups.remove(&previous);
        }
        self.popups.insert(window, id);
        Ok(())
    }

    /// Unregisters a session and releases its popup.
    pub fn remove(&mut self, id: SessionId) -> Option<T> {
        let entry = self.entries.remove(&id)?;
        if let Some(window) = entry.popup {
            self.popups.remove(&window);
        }
        tracing::debug!(session_id = %id, live = self.entries.len(), "session unregistered");
        Some(entry.value)
    }

    pub fn get(&self, id: &SessionId) -> Option<&RegistryEntry<T>> {
        self.entries.get(id)
    }

    /// The session that owns `window`, if any.
    pub fn popup_owner(&self, window: &WindowId) -> Option<SessionId> {
        self.popups.get(window).copied()
    }

    /// Ids of every registered session.
    pub fn ids(&self) -> Vec<SessionId> {
        self.entries.keys().copied().collect()
    }

    /// Ids of sessions registered longer than `max_age` ago.
    pub fn stale(&self, max_age: Duration) -> Vec<SessionId> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.created_at.elapsed() > max_age)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Iterates over every registered value.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.values().map(|e| &e.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
