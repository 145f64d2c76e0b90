//! Popup sizing and placement.
//!
//! Presentation only: nothing here is part of the protocol contract, but
//! every launcher needs to turn "500×600, centered" into concrete window
//! coordinates.

use std::fmt;

/// The area of the host screen a popup may be placed in.
///
/// `left`/`top` are signed because secondary monitors can sit at negative
/// coordinates relative to the primary one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Screen {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Default for Screen {
    fn default() -> Self {
        Self {
            left: 0,
            top: 0,
            width: 1920,
            height: 1080,
        }
    }
}

/// Requested popup size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupGeometry {
    pub width: u32,
    pub height: u32,
}

impl Default for PopupGeometry {
    fn default() -> Self {
        Self {
            width: 500,
            height: 600,
        }
    }
}

impl PopupGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Centers the popup on `screen`.
    ///
    /// A popup larger than the screen is shrunk to fit and pinned to the
    /// screen's top-left corner rather than pushed off-screen.
    pub fn centered_in(&self, screen: &Screen) -> Placement {
        let width = self.width.min(screen.width);
        let height = self.height.min(screen.height);
        let dx = (screen.width - width) / 2;
        let dy = (screen.height - height) / 2;
        Placement {
            left: screen.left.saturating_add_unsigned(dx),
            top: screen.top.saturating_add_unsigned(dy),
            width,
            height,
        }
    }
}

/// Concrete window coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Placement {
    /// The `window.open` feature string for this placement.
    pub fn features(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "width={},height={},left={},top={}",
            self.width, self.height, self.left, self.top
        )
    }
}
