//! `Linker` builder and entry points.
//!
//! The linker is what applications hold on to. It ties the layers
//! together: launcher → message bus → session coordinator → result sink,
//! and keeps the registry of sessions still running.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use popbridge_protocol::{Codec, JsonCodec, Origin, OriginPolicy};
use popbridge_session::{SessionConfig, SessionRegistry};
use popbridge_window::{MessageBus, PopupGeometry, PopupLauncher, PopupRequest};
use url::Url;

use crate::coordinator::{SessionContext, SessionCoordinator, SharedRegistry, lock_registry};
use crate::{PopbridgeError, ResultSink, SessionHandle};

/// Builder for a [`Linker`].
///
/// # Example
///
/// ```rust
/// use popbridge::prelude::*;
///
/// let bus = MessageBus::new();
/// let linker = LinkerBuilder::new()
///     .provider_base("https://auth.example.com")
///     .timeout(std::time::Duration::from_secs(300))
///     .build(MemoryHost::new(bus.clone()), bus)?;
/// # Ok::<(), PopbridgeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct LinkerBuilder {
    provider_base: Option<String>,
    title: String,
    geometry: PopupGeometry,
    session: SessionConfig,
}

impl LinkerBuilder {
    pub const DEFAULT_TITLE: &'static str = "Sign in";

    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            provider_base: None,
            title: Self::DEFAULT_TITLE.to_string(),
            geometry: PopupGeometry::default(),
            session: SessionConfig::default(),
        }
    }

    /// Sets the identity provider's base URL. Required.
    pub fn provider_base(mut self, url: &str) -> Self {
        self.provider_base = Some(url.to_string());
        self
    }

    /// Sets the popup window title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the requested popup size.
    pub fn geometry(mut self, geometry: PopupGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Replaces the whole session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.session.poll_interval = interval;
        self
    }

    /// Gives up with `TimedOut` after `timeout` without a result.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.session.timeout = Some(timeout);
        self
    }

    pub fn origin_policy(mut self, policy: OriginPolicy) -> Self {
        self.session.origin_policy = policy;
        self
    }

    /// Builds the linker around `launcher`, listening on `bus`.
    ///
    /// Uses [`JsonCodec`]; switch with [`Linker::with_codec`].
    ///
    /// # Errors
    /// [`PopbridgeError::Config`] if the provider base is missing, is not
    /// an absolute URL, or cannot carry a path.
    pub fn build<L: PopupLauncher>(
        self,
        launcher: L,
        bus: MessageBus,
    ) -> Result<Linker<L>, PopbridgeError> {
        let raw = self
            .provider_base
            .ok_or_else(|| PopbridgeError::Config("provider_base is required".into()))?;
        let provider_base = Url::parse(&raw)
            .map_err(|e| PopbridgeError::Config(format!("provider_base {raw}: {e}")))?;
        if provider_base.cannot_be_a_base() {
            return Err(PopbridgeError::Config(format!(
                "provider_base {raw} cannot carry a path"
            )));
        }
        Origin::of_url(&provider_base)?;
        if let Some(timeout) = self.session.timeout.filter(|t| t.is_zero()) {
            return Err(PopbridgeError::Config(format!("timeout {timeout:?} must be non-zero")));
        }

        tracing::debug!(%provider_base, title = %self.title, "linker built");
        Ok(Linker {
            launcher,
            bus,
            codec: JsonCodec,
            provider_base,
            title: self.title,
            geometry: self.geometry,
            session: self.session,
            registry: Arc::new(Mutex::new(SessionRegistry::new())),
        })
    }
}

impl Default for LinkerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts provider sessions and keeps track of the running ones.
///
/// Sessions are independent: any number may run at once, each with its
/// own popup, listener and watcher.
pub struct Linker<L: PopupLauncher, C: Codec + Clone = JsonCodec> {
    launcher: L,
    bus: MessageBus,
    codec: C,
    provider_base: Url,
    title: String,
    geometry: PopupGeometry,
    session: SessionConfig,
    registry: SharedRegistry,
}

impl<L, C> Linker<L, C>
where
    L: PopupLauncher,
    C: Codec + Clone,
{
    /// Decodes provider payloads with `codec` instead.
    pub fn with_codec<C2: Codec + Clone>(self, codec: C2) -> Linker<L, C2> {
        Linker {
            launcher: self.launcher,
            bus: self.bus,
            codec,
            provider_base: self.provider_base,
            title: self.title,
            geometry: self.geometry,
            session: self.session,
            registry: self.registry,
        }
    }

    /// `<base>/link?userId=<user_id>`, with `user_id` query-encoded.
    pub fn link_url(&self, user_id: &str) -> Url {
        let mut url = self.endpoint("link");
        url.query_pairs_mut().append_pair("userId", user_id);
        url
    }

    /// `<base>/login`.
    pub fn login_url(&self) -> Url {
        self.endpoint("login")
    }

    fn endpoint(&self, segment: &str) -> Url {
        let mut url = self.provider_base.clone();
        url.set_query(None);
        url.set_fragment(None);
        // `build` rejected cannot-be-a-base URLs.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(segment);
        }
        url
    }

    /// Opens a popup at `url` and runs a session around it.
    ///
    /// Exactly one of the sink's methods runs once the session ends,
    /// including when the popup is blocked. Must be called from within a
    /// Tokio runtime.
    ///
    /// # Errors
    /// Only if `url` has no usable origin. Nothing is opened and the sink
    /// is dropped uncalled.
    pub fn start<S: ResultSink>(&self, url: Url, sink: S) -> Result<SessionHandle, PopbridgeError> {
        let request = PopupRequest::new(url, self.title.clone()).with_geometry(self.geometry);
        let cx = SessionContext {
            launcher: &self.launcher,
            bus: &self.bus,
            registry: &self.registry,
            config: &self.session,
        };
        SessionCoordinator::start(cx, self.codec.clone(), &request, sink)
    }

    /// Links the provider account to `user_id`.
    pub fn start_link<S: ResultSink>(
        &self,
        user_id: &str,
        sink: S,
    ) -> Result<SessionHandle, PopbridgeError> {
        self.start(self.link_url(user_id), sink)
    }

    /// Logs in through the provider.
    pub fn start_login<S: ResultSink>(&self, sink: S) -> Result<SessionHandle, PopbridgeError> {
        self.start(self.login_url(), sink)
    }

    /// Handles to every session that has not finished yet.
    pub fn active_sessions(&self) -> Vec<SessionHandle> {
        lock_registry(&self.registry).values().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        lock_registry(&self.registry).len()
    }

    /// Aborts every running session. Returns how many accepted the abort.
    pub fn abort_all(&self) -> usize {
        let handles = self.active_sessions();
        let aborted = handles.iter().filter(|h| h.abort()).count();
        if aborted > 0 {
            tracing::info!(aborted, "aborted all sessions");
        }
        aborted
    }

    /// Aborts sessions started more than `max_age` ago.
    pub fn abort_stale(&self, max_age: Duration) -> usize {
        let stale: Vec<SessionHandle> = {
            let registry = lock_registry(&self.registry);
            registry
                .stale(max_age)
                .iter()
                .filter_map(|id| registry.get(id).map(|entry| entry.value.clone()))
                .collect()
        };
        let aborted = stale.iter().filter(|h| h.abort()).count();
        if aborted > 0 {
            tracing::info!(aborted, max_age_ms = max_age.as_millis() as u64, "aborted stale sessions");
        }
        aborted
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn provider_base(&self) -> &Url {
        &self.provider_base
    }

    pub fn session_config(&self) -> &SessionConfig {
        &self.session
    }
}
