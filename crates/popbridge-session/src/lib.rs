//! Link session management for Popbridge.
//!
//! This crate owns the bookkeeping for linking attempts:
//!
//! 1. **State machine**: [`SessionState`] and the transitions a
//!    [`LinkSession`] may take, with exactly one terminal state each
//! 2. **Registry**: [`SessionRegistry`], an arena of live sessions keyed
//!    by [`SessionId`](popbridge_protocol::SessionId) that also enforces
//!    single ownership of popup windows
//! 3. **Configuration**: [`SessionConfig`] (poll interval, deadline,
//!    origin policy)
//!
//! # How it fits in the stack
//!
//! ```text
//! Coordinator (above)  ← drives one LinkSession per attempt
//!     ↕
//! Session Layer (this crate)  ← state machine + registry
//!     ↕
//! Protocol Layer (below)  ← SessionId, WindowId, OriginPolicy
//! ```

mod error;
mod registry;
mod session;

pub use error::SessionError;
pub use registry::{RegistryEntry, SessionRegistry};
pub use session::{LinkSession, SessionConfig, SessionState};
