//! Where a session's single outcome goes.

use popbridge_protocol::Credential;
use tokio::sync::oneshot;

use crate::LinkError;

/// A session's outcome.
pub type LinkResult = Result<Credential, LinkError>;

/// The caller's pair of callbacks.
///
/// Both methods take `self` by value: once a session hands its sink one
/// outcome, the sink is gone, so neither method can ever run twice and
/// they can never both run.
///
/// `UserCancelled` and `Aborted` arrive through `on_error`; check
/// [`LinkError::is_user_initiated`] to stay quiet about them.
pub trait ResultSink: Send + 'static {
    fn on_success(self, credential: Credential);
    fn on_error(self, reason: LinkError);
}

/// Routes a [`LinkResult`] to the matching callback.
pub(crate) fn deliver<S: ResultSink>(sink: S, result: LinkResult) {
    match result {
        Ok(credential) => sink.on_success(credential),
        Err(reason) => sink.on_error(reason),
    }
}

/// A [`ResultSink`] made of two closures. Build one with [`callbacks`].
pub struct Callbacks<S, E> {
    on_success: S,
    on_error: E,
}

/// Pairs a success and an error closure into a [`ResultSink`].
///
/// ```rust
/// use popbridge::callbacks;
///
/// let sink = callbacks(
///     |credential| println!("linked: {:?}", credential.token),
///     |reason| {
///         if !reason.is_user_initiated() {
///             eprintln!("linking failed: {reason}");
///         }
///     },
/// );
/// # let _ = sink;
/// ```
pub fn callbacks<S, E>(on_success: S, on_error: E) -> Callbacks<S, E>
where
    S: FnOnce(Credential) + Send + 'static,
    E: FnOnce(LinkError) + Send + 'static,
{
    Callbacks {
        on_success,
        on_error,
    }
}

impl<S, E> ResultSink for Callbacks<S, E>
where
    S: FnOnce(Credential) + Send + 'static,
    E: FnOnce(LinkError) + Send + 'static,
{
    fn on_success(self, credential: Credential) {
        (self.on_success)(credential)
    }

    fn on_error(self, reason: LinkError) {
        (self.on_error)(reason)
    }
}

/// Lets async callers `.await` the outcome on the receiving half.
///
/// A dropped receiver is fine: the outcome is discarded.
impl ResultSink for oneshot::Sender<LinkResult> {
    fn on_success(self, credential: Credential) {
        let _ = self.send(Ok(credential));
    }

    fn on_error(self, reason: LinkError) {
        let _ = self.send(Err(reason));
    }
}
