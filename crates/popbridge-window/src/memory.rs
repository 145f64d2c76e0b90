//! In-memory window host.
//!
//! Stands in for a browser: opens "windows" that are just shared flags,
//! and lets the test (or demo) act as both the user and the provider page,
//! closing popups by hand or posting payloads back to the opener.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use popbridge_protocol::{Codec, JsonCodec, MessageBody, Origin, WindowId};
use url::Url;

use crate::{
    InboundMessage, MessageBus, Placement, PopupLauncher, PopupRequest, PopupWindow, Screen,
    WindowError,
};

/// One call to [`MemoryHost::open`], successful or not.
#[derive(Debug, Clone)]
pub struct OpenAttempt {
    pub url: Url,
    pub title: String,
    pub placement: Placement,
    /// `None` when the popup was blocked.
    pub window: Option<WindowId>,
}

/// Open attempts kept by a [`MemoryHost`]; older ones are dropped.
pub const MAX_RECORDED_ATTEMPTS: usize = 256;

#[derive(Default)]
struct HostState {
    attempts: Vec<OpenAttempt>,
    windows: Vec<MemoryWindow>,
}

/// A [`PopupLauncher`] that keeps everything in memory.
///
/// Cheap to clone; clones share the same windows and settings. Closed
/// windows are forgotten on the next `open`, and only the last
/// [`MAX_RECORDED_ATTEMPTS`] attempts are kept, so a long-lived host stays
/// bounded. Callers that need a closed window should hold on to its
/// [`MemoryWindow`] handle.
#[derive(Clone)]
pub struct MemoryHost {
    bus: MessageBus,
    screen: Screen,
    blocked: Arc<AtomicBool>,
    next_window: Arc<AtomicU64>,
    state: Arc<Mutex<HostState>>,
}

impl MemoryHost {
    /// Creates a host whose popups post to `bus`.
    pub fn new(bus: MessageBus) -> Self {
        Self {
            bus,
            screen: Screen::default(),
            blocked: Arc::new(AtomicBool::new(false)),
            next_window: Arc::new(AtomicU64::new(1)),
            state: Arc::new(Mutex::new(HostState::default())),
        }
    }

    pub fn with_screen(mut self, screen: Screen) -> Self {
        self.screen = screen;
        self
    }

    /// Turns the simulated popup blocker on or off.
    pub fn set_popup_blocker(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recorded open attempts, oldest first.
    pub fn attempts(&self) -> Vec<OpenAttempt> {
        self.lock().attempts.clone()
    }

    /// The most recently opened window.
    pub fn last_window(&self) -> Option<MemoryWindow> {
        self.lock().windows.last().cloned()
    }

    /// Looks up a window by id. Closed windows disappear once another
    /// popup is opened.
    pub fn window(&self, id: WindowId) -> Option<MemoryWindow> {
        self.lock().windows.iter().find(|w| w.id == id).cloned()
    }

    /// Number of windows that are still open.
    pub fn open_windows(&self) -> usize {
        self.lock().windows.iter().filter(|w| !w.is_closed()).count()
    }
}

impl HostState {
    fn record(&mut self, attempt: OpenAttempt) {
        if self.attempts.len() >= MAX_RECORDED_ATTEMPTS {
            let excess = self.attempts.len() + 1 - MAX_RECORDED_ATTEMPTS;
            self.attempts.drain(..excess);
        }
        self.attempts.push(attempt);
    }
}

impl PopupLauncher for MemoryHost {
    type Window = MemoryWindow;

    fn open(&self, request: &PopupRequest) -> Result<MemoryWindow, WindowError> {
        let placement = request.geometry.centered_in(&self.screen);
        let mut attempt = OpenAttempt {
            url: request.url.clone(),
            title: request.title.clone(),
            placement,
            window: None,
        };

        if self.blocked.load(Ordering::SeqCst) {
            tracing::debug!(url = %request.url, "memory host blocked popup");
            self.lock().record(attempt);
            return Err(WindowError::PopupBlocked);
        }

        let id = WindowId(self.next_window.fetch_add(1, Ordering::Relaxed));
        let window = MemoryWindow {
            id,
            location: Arc::new(Mutex::new(request.url.clone())),
            shared: Arc::new(WindowShared::default()),
            bus: self.bus.clone(),
        };
        attempt.window = Some(id);

        let mut state = self.lock();
        state.record(attempt);
        state.windows.retain(|w| !w.is_closed());
        state.windows.push(window.clone());
        tracing::debug!(window_id = %id, url = %request.url, %placement, "memory host opened popup");
        Ok(window)
    }
}

// ---------------------------------------------------------------------------
// MemoryWindow
// ---------------------------------------------------------------------------

#[derive(Default)]
struct WindowShared {
    closed: AtomicBool,
    closed_by_user: AtomicBool,
    close_calls: AtomicUsize,
}

/// A popup opened by [`MemoryHost`].
///
/// Clones are handles to the same window.
#[derive(Clone)]
pub struct MemoryWindow {
    id: WindowId,
    location: Arc<Mutex<Url>>,
    shared: Arc<WindowShared>,
    bus: MessageBus,
}

impl MemoryWindow {
    fn location(&self) -> Url {
        self.location
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Simulates the popup redirecting to another page, which changes the
    /// origin its messages carry.
    pub fn navigate(&self, url: Url) {
        *self.location.lock().unwrap_or_else(PoisonError::into_inner) = url;
    }

    /// The origin of the page currently loaded in the popup.
    ///
    /// # Errors
    /// Returns an error if the current URL has an opaque origin.
    pub fn origin(&self) -> Result<Origin, WindowError> {
        Ok(Origin::of_url(&self.location())?)
    }

    /// Simulates the user closing the popup.
    pub fn user_close(&self) {
        self.shared.closed_by_user.store(true, Ordering::SeqCst);
        self.shared.closed.store(true, Ordering::SeqCst);
    }

    /// `true` if the window was closed through [`user_close`](Self::user_close).
    pub fn closed_by_user(&self) -> bool {
        self.shared.closed_by_user.load(Ordering::SeqCst)
    }

    /// How many times the opener called [`PopupWindow::close`].
    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::SeqCst)
    }

    /// Posts raw bytes to the opener, as `window.opener.postMessage` would.
    ///
    /// Returns how many listeners received the message.
    ///
    /// # Errors
    /// [`WindowError::Closed`] if the popup is already closed.
    pub fn post_raw(&self, data: impl Into<Vec<u8>>) -> Result<usize, WindowError> {
        if self.is_closed() {
            return Err(WindowError::Closed);
        }
        let message = InboundMessage {
            origin: self.origin()?.to_string(),
            source: Some(self.id),
            data: data.into(),
        };
        Ok(self.bus.post(message))
    }

    /// Encodes `body` as JSON and posts it to the opener.
    ///
    /// # Errors
    /// See [`post_raw`](Self::post_raw).
    pub fn post_body(&self, body: &MessageBody) -> Result<usize, WindowError> {
        let data = JsonCodec.encode(body)?;
        self.post_raw(data)
    }

    /// Posts `body` and then closes the popup from inside, in the same
    /// turn. Provider pages commonly do exactly this.
    ///
    /// # Errors
    /// See [`post_raw`](Self::post_raw).
    pub fn post_and_close(&self, body: &MessageBody) -> Result<usize, WindowError> {
        let delivered = self.post_body(body)?;
        self.shared.closed.store(true, Ordering::SeqCst);
        Ok(delivered)
    }
}

impl PopupWindow for MemoryWindow {
    fn id(&self) -> WindowId {
        self.id
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}
