//! Window host abstraction for Popbridge.
//!
//! Provides the [`PopupLauncher`] and [`PopupWindow`] traits over whatever
//! environment actually opens windows (a browser through `wasm-bindgen`,
//! an embedded webview, a test double), and the page-level [`MessageBus`]
//! that popups post their results to.
//!
//! # Feature Flags
//!
//! - `memory` (default): [`MemoryHost`], an in-memory launcher for tests
//!   and demos

mod bus;
mod error;
mod geometry;
#[cfg(feature = "memory")]
mod memory;

pub use bus::{InboundMessage, MessageBus, Subscription};
pub use error::WindowError;
pub use geometry::{Placement, PopupGeometry, Screen};
#[cfg(feature = "memory")]
pub use memory::{MAX_RECORDED_ATTEMPTS, MemoryHost, MemoryWindow, OpenAttempt};

use popbridge_protocol::WindowId;
use url::Url;

/// What to open: target URL, window title, and requested size.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupRequest {
    pub url: Url,
    pub title: String,
    pub geometry: PopupGeometry,
}

impl PopupRequest {
    /// Creates a request with the default geometry.
    pub fn new(url: Url, title: impl Into<String>) -> Self {
        Self {
            url,
            title: title.into(),
            geometry: PopupGeometry::default(),
        }
    }

    pub fn with_geometry(mut self, geometry: PopupGeometry) -> Self {
        self.geometry = geometry;
        self
    }
}

/// Opens popup windows.
///
/// Opening has no side effects beyond the attempt itself; a launcher
/// never talks to the popup it opened. Centering relative to the host
/// screen is the launcher's job, since only it knows the screen.
pub trait PopupLauncher: Send + Sync + 'static {
    /// The window handle type produced by this launcher.
    type Window: PopupWindow;

    /// Attempts to open a popup for `request`.
    ///
    /// # Errors
    /// [`WindowError::PopupBlocked`] if the host refused.
    fn open(&self, request: &PopupRequest) -> Result<Self::Window, WindowError>;
}

/// A handle to an opened popup.
///
/// Window close cannot be observed as an event, only polled through
/// [`is_closed`](Self::is_closed).
pub trait PopupWindow: Send + Sync + 'static {
    /// Returns the unique identifier for this window.
    fn id(&self) -> WindowId;

    /// Whether the window has been closed, by anyone.
    fn is_closed(&self) -> bool;

    /// Closes the window. Calling it on a closed window does nothing.
    fn close(&self);
}
