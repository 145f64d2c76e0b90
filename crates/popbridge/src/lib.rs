//! # Popbridge
//!
//! Popup-based account linking and login.
//!
//! A [`Linker`] opens a provider page in a popup, listens for the page's
//! result over cross-window messaging, notices when the user closes the
//! popup by hand, and hands exactly one outcome to a [`ResultSink`]. Every
//! listener, poll and timer belonging to a session is gone by the time
//! the sink runs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use popbridge::prelude::*;
//!
//! # async fn run() -> Result<(), PopbridgeError> {
//! let bus = MessageBus::new();
//! let linker = LinkerBuilder::new()
//!     .provider_base("https://auth.example.com")
//!     .build(MemoryHost::new(bus.clone()), bus)?;
//!
//! let (tx, rx) = tokio::sync::oneshot::channel();
//! linker.start_link("42", tx)?;
//! match rx.await {
//!     Ok(Ok(credential)) => println!("linked, token: {:?}", credential.token),
//!     Ok(Err(reason)) if reason.is_user_initiated() => {}
//!     Ok(Err(reason)) => eprintln!("linking failed: {reason}"),
//!     Err(_) => {}
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Crates
//!
//! | Layer    | Crate                | Provides                                  |
//! |----------|----------------------|-------------------------------------------|
//! | Protocol | `popbridge-protocol` | payloads, origins, ids, codec             |
//! | Window   | `popbridge-window`   | launcher/window traits, message bus       |
//! | Session  | `popbridge-session`  | state machine, registry, config           |
//! | Watch    | `popbridge-watch`    | dismissal polling, deadlines              |
//! | Facade   | `popbridge`          | channel, coordinator, sinks, linker       |

mod channel;
mod coordinator;
mod error;
mod linker;
mod sink;

pub use channel::{MessageChannel, TrustedMessage};
pub use coordinator::SessionHandle;
pub use error::{LinkError, PopbridgeError};
pub use linker::{Linker, LinkerBuilder};
pub use sink::{Callbacks, LinkResult, ResultSink, callbacks};

pub use popbridge_protocol as protocol;
pub use popbridge_session as session;
pub use popbridge_watch as watch;
pub use popbridge_window as window;

pub mod prelude {
    pub use crate::{
        Callbacks, LinkError, LinkResult, Linker, LinkerBuilder, PopbridgeError, ResultSink,
        SessionHandle, callbacks,
    };
    pub use popbridge_protocol::{Credential, Origin, OriginPolicy, SessionId, WindowId};
    pub use popbridge_session::{SessionConfig, SessionState};
    pub use popbridge_window::{
        MemoryHost, MemoryWindow, MessageBus, PopupGeometry, PopupLauncher, PopupWindow, Screen,
    };
}
