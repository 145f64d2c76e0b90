//! Session coordinator: one actor task per linking attempt.
//!
//! The coordinator owns the popup, the message channel, the dismissal
//! watcher and the deadline of a single session, and races them in one
//! `select!` loop. Whichever event is accepted first ends the session;
//! [`SessionCoordinator::finish`] is the only way out and tears everything
//! down before the sink sees the outcome.
//!
//! ```text
//! start() ──open──→ [spawn actor] ──→ loop { abort | message | dismissal | deadline }
//!    │                                          │
//!    └─ blocked ─→ Failed + on_error            └─→ finish(outcome) ─→ sink
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use popbridge_protocol::{Classification, Codec, Origin, SessionId, WindowId};
use popbridge_session::{LinkSession, SessionConfig, SessionError, SessionRegistry, SessionState};
use popbridge_watch::{Deadline, DismissalWatcher, WatchConfig};
use popbridge_window::{MessageBus, PopupLauncher, PopupRequest, PopupWindow};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::channel::{MessageChannel, TrustedMessage};
use crate::sink::{LinkResult, ResultSink, deliver};
use crate::{LinkError, PopbridgeError};

/// Commands a [`SessionHandle`] can send to its actor.
#[derive(Debug)]
pub(crate) enum Command {
    Abort,
}

const COMMAND_BUFFER: usize = 4;

/// Live sessions, keyed by id. Shared by a linker and its actors.
pub(crate) type SharedRegistry = Arc<Mutex<SessionRegistry<SessionHandle>>>;

pub(crate) fn lock_registry(
    registry: &SharedRegistry,
) -> MutexGuard<'_, SessionRegistry<SessionHandle>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// A handle to a running (or finished) session.
///
/// Cheap to clone. Dropping every handle does not stop the session; only
/// [`abort`](Self::abort) or a terminal event does.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    popup: Option<WindowId>,
    commands: Option<mpsc::Sender<Command>>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// A handle for a session that ended before its actor was spawned.
    fn finished_early(id: SessionId, state: SessionState) -> Self {
        let (_, rx) = watch::channel(state);
        Self {
            id,
            popup: None,
            commands: None,
            state: rx,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The popup the session opened, if the launcher produced one.
    pub fn popup(&self) -> Option<WindowId> {
        self.popup
    }

    /// The session's current state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Asks the session to end with [`LinkError::Aborted`].
    ///
    /// Returns `false` if the session already finished (or was never
    /// armed). A message already delivered in the same turn is not
    /// overridden once the actor has accepted it.
    pub fn abort(&self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.commands
            .as_ref()
            .is_some_and(|tx| tx.try_send(Command::Abort).is_ok())
    }

    /// Waits for the terminal state.
    ///
    /// The sink has already been called by the time this resolves.
    pub async fn finished(&self) -> SessionState {
        let mut rx = self.state.clone();
        let observed = rx.wait_for(|s| s.is_terminal()).await.map(|s| *s);
        observed.unwrap_or_else(|_| *rx.borrow())
    }
}

// ---------------------------------------------------------------------------
// SessionCoordinator
// ---------------------------------------------------------------------------

/// What a coordinator borrows from its linker while starting.
pub(crate) struct SessionContext<'a, L> {
    pub(crate) launcher: &'a L,
    pub(crate) bus: &'a MessageBus,
    pub(crate) registry: &'a SharedRegistry,
    pub(crate) config: &'a SessionConfig,
}

/// The actor that drives one session to its single outcome.
pub(crate) struct SessionCoordinator<W: PopupWindow, C: Codec, S: ResultSink> {
    session: LinkSession,
    window: W,
    channel: MessageChannel<C>,
    watcher: DismissalWatcher,
    deadline: Deadline,
    commands: mpsc::Receiver<Command>,
    state: watch::Sender<SessionState>,
    registry: SharedRegistry,
    sink: S,
}

impl<W, C, S> SessionCoordinator<W, C, S>
where
    W: PopupWindow,
    C: Codec,
    S: ResultSink,
{
    /// Opens the popup for `request` and spawns the session's actor.
    ///
    /// Every outcome, a blocked popup included, goes to `sink`. Must be
    /// called from within a Tokio runtime.
    ///
    /// # Errors
    /// Only if `request.url` has no usable origin; `sink` is then dropped
    /// uncalled and nothing was opened.
    pub(crate) fn start<L>(
        cx: SessionContext<'_, L>,
        codec: C,
        request: &PopupRequest,
        sink: S,
    ) -> Result<SessionHandle, PopbridgeError>
    where
        L: PopupLauncher<Window = W>,
    {
        let popup_origin = Origin::of_url(&request.url)?;
        let mut session = LinkSession::new();
        let id = session.id();
        session.transition(SessionState::Opening)?;
        // Armed before the popup exists so nothing after `open` can fail
        // halfway. Both are inert until the actor first polls them.
        let watcher = DismissalWatcher::new(WatchConfig::with_interval(cx.config.poll_interval));
        let deadline = Deadline::new(cx.config.timeout);
        info!(session_id = %id, url = %request.url, "opening provider popup");

        let window = match cx.launcher.open(request) {
            Ok(window) => window,
            Err(e) => {
                warn!(session_id = %id, error = %e, "popup could not be opened");
                return fail_before_arming(session, None::<&W>, sink, LinkError::PopupBlocked);
            }
        };
        let window_id = window.id();

        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (state, state_rx) = watch::channel(SessionState::Opening);
        let handle = SessionHandle {
            id,
            popup: Some(window_id),
            commands: Some(commands_tx),
            state: state_rx,
        };

        if let Err(e) = register(cx.registry, &handle) {
            warn!(session_id = %id, window_id = %window_id, error = %e, "session could not be registered");
            // Never close a window another live session still owns.
            let ours = !matches!(e, SessionError::PopupInUse { .. });
            let window = ours.then_some(&window);
            return fail_before_arming(session, window, sink, LinkError::Unavailable(e.to_string()));
        }

        let policy = cx.config.origin_policy.clone().resolve(&popup_origin);
        let channel = match MessageChannel::open(cx.bus, id, window_id, policy, codec) {
            Ok(channel) => channel,
            Err(e) => {
                warn!(session_id = %id, error = %e, "message channel could not be opened");
                lock_registry(cx.registry).remove(id);
                return fail_before_arming(
                    session,
                    Some(&window),
                    sink,
                    LinkError::Unavailable(e.to_string()),
                );
            }
        };

        session.popup_opened(window_id)?;
        state.send_replace(SessionState::AwaitingResult);

        let coordinator = SessionCoordinator {
            session,
            window,
            channel,
            watcher,
            deadline,
            commands,
            state,
            registry: Arc::clone(cx.registry),
            sink,
        };
        tokio::spawn(coordinator.run());

        info!(session_id = %id, window_id = %window_id, "awaiting provider result");
        Ok(handle)
    }

    async fn run(mut self) {
        let outcome = self.wait_for_outcome().await;
        self.finish(outcome);
    }

    /// Races the session's event sources until one of them decides it.
    async fn wait_for_outcome(&mut self) -> LinkResult {
        loop {
            tokio::select! {
                biased;

                Some(Command::Abort) = self.commands.recv() => {
                    debug!(session_id = %self.session.id(), "abort requested");
                    return Err(LinkError::Aborted);
                }

                message = self.channel.recv() => {
                    if let Some(result) = self.accept(message) {
                        return result;
                    }
                }

                info = self.watcher.wait_for_dismissal(&self.window) => {
                    debug!(session_id = %self.session.id(), polls = info.polls, "popup dismissed");
                    // A message posted right before closing still wins.
                    return self.drain().unwrap_or(Err(LinkError::UserCancelled));
                }

                limit = self.deadline.expired() => {
                    debug!(session_id = %self.session.id(), ?limit, "deadline elapsed");
                    return self.drain().unwrap_or(Err(LinkError::TimedOut(limit)));
                }
            }
        }
    }

    /// Classifies one trusted message. `None` if it had no usable shape.
    fn accept(&mut self, message: TrustedMessage) -> Option<LinkResult> {
        self.session.hold_payload(message.data);
        let classification = self
            .session
            .pending_payload()
            .and_then(|data| self.channel.classify(&message.origin, data));
        self.session.take_payload();

        classification.map(|c| match c {
            Classification::Success(credential) => Ok(credential),
            Classification::ProviderError(text) => Err(LinkError::Provider(text)),
        })
    }

    /// Classifies whatever was delivered but not yet read.
    fn drain(&mut self) -> Option<LinkResult> {
        while let Some(message) = self.channel.try_recv() {
            if let Some(result) = self.accept(message) {
                return Some(result);
            }
        }
        None
    }

    /// The single terminal path.
    ///
    /// Commits the state and disarms every event source, closes the popup
    /// and frees the registry slot before the sink sees the outcome. The
    /// handle observes the terminal state last, so `finished()` never
    /// resolves ahead of the sink.
    fn finish(self, outcome: LinkResult) {
        let Self {
            mut session,
            window,
            channel,
            watcher,
            deadline,
            commands,
            state,
            registry,
            sink,
        } = self;
        let id = session.id();

        let target = match &outcome {
            Ok(_) => SessionState::Succeeded,
            Err(reason) => reason.terminal_state(),
        };
        // The actor only runs in AwaitingResult, so this cannot be refused;
        // if it ever is, cleanup and delivery still happen exactly once.
        if let Err(e) = session.transition(target) {
            error!(session_id = %id, error = %e, "terminal transition rejected");
        }

        drop(channel);
        drop(watcher);
        drop(deadline);
        drop(commands);
        if !window.is_closed() {
            window.close();
        }
        lock_registry(&registry).remove(id);

        match &outcome {
            Ok(credential) => {
                info!(session_id = %id, has_token = credential.has_token(), "session succeeded")
            }
            Err(reason) => info!(session_id = %id, state = %target, %reason, "session ended"),
        }
        deliver(sink, outcome);
        state.send_replace(target);
    }
}

/// Inserts `handle` and claims its popup in one critical section.
fn register(registry: &SharedRegistry, handle: &SessionHandle) -> Result<(), SessionError> {
    let mut registry = lock_registry(registry);
    registry.insert(handle.id, handle.clone())?;
    if let Some(window) = handle.popup {
        if let Err(e) = registry.claim_popup(handle.id, window) {
            registry.remove(handle.id);
            return Err(e);
        }
    }
    Ok(())
}

/// Ends a session that never reached `AwaitingResult`: no listener,
/// watcher or timer exists for it.
fn fail_before_arming<W: PopupWindow, S: ResultSink>(
    mut session: LinkSession,
    window: Option<&W>,
    sink: S,
    reason: LinkError,
) -> Result<SessionHandle, PopbridgeError> {
    let target = reason.terminal_state();
    session.transition(target)?;
    if let Some(window) = window.filter(|w| !w.is_closed()) {
        window.close();
    }
    info!(session_id = %session.id(), state = %target, %reason, "session ended before arming");
    sink.on_error(reason);
    Ok(SessionHandle::finished_early(session.id(), target))
}
