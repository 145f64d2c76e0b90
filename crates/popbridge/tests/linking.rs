//! End-to-end tests: linker → in-memory popup → provider message → sink.
//!
//! The test plays both the user (closing popups) and the provider page
//! (posting payloads). Time is paused, so 500 ms polls and multi-second
//! deadlines cost nothing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use popbridge::prelude::*;
use popbridge::protocol::MessageBody;
use popbridge::window::{PopupRequest, WindowError};
use serde_json::json;
use tokio::sync::oneshot;
use url::Url;

const PROVIDER: &str = "https://auth.example.com";

// =========================================================================
// Helpers
// =========================================================================

/// A sink that records what it was given. Clones share the record.
#[derive(Clone, Default)]
struct Recorder {
    successes: Arc<AtomicUsize>,
    credential: Arc<Mutex<Option<Credential>>>,
    errors: Arc<Mutex<Vec<LinkError>>>,
}

impl Recorder {
    fn successes(&self) -> usize {
        self.successes.load(Ordering::SeqCst)
    }

    fn errors(&self) -> Vec<LinkError> {
        self.errors.lock().unwrap().clone()
    }

    fn calls(&self) -> usize {
        self.successes() + self.errors().len()
    }

    fn credential(&self) -> Option<Credential> {
        self.credential.lock().unwrap().clone()
    }
}

impl ResultSink for Recorder {
    fn on_success(self, credential: Credential) {
        self.successes.fetch_add(1, Ordering::SeqCst);
        *self.credential.lock().unwrap() = Some(credential);
    }

    fn on_error(self, reason: LinkError) {
        self.errors.lock().unwrap().push(reason);
    }
}

struct Fixture {
    bus: MessageBus,
    host: MemoryHost,
    linker: Linker<MemoryHost>,
}

fn fixture() -> Fixture {
    fixture_with(LinkerBuilder::new())
}

fn fixture_with(builder: LinkerBuilder) -> Fixture {
    let bus = MessageBus::new();
    let host = MemoryHost::new(bus.clone());
    let linker = builder
        .provider_base(PROVIDER)
        .build(host.clone(), bus.clone())
        .unwrap();
    Fixture { bus, host, linker }
}

fn success(token: &str) -> MessageBody {
    MessageBody::Success {
        token: token.into(),
        user: json!({"id": 42, "name": "Ada"}),
    }
}

fn provider_error(text: &str) -> MessageBody {
    MessageBody::ProviderError { error: text.into() }
}

// =========================================================================
// Scenario A: success
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_success_message_delivers_credential_once() {
    let f = fixture();
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    assert_eq!(handle.state(), SessionState::AwaitingResult);

    let window = f.host.last_window().unwrap();
    window.post_and_close(&success("tok-1")).unwrap();

    assert_eq!(handle.finished().await, SessionState::Succeeded);
    assert_eq!(sink.successes(), 1);
    assert!(sink.errors().is_empty());
    let credential = sink.credential().unwrap();
    assert_eq!(credential.token.as_deref(), Some("tok-1"));
    assert_eq!(credential.user, Some(json!({"id": 42, "name": "Ada"})));

    assert_eq!(f.bus.listener_count(), 0);
    assert_eq!(f.linker.active_count(), 0);
    // The provider closed its own popup; nothing left to close.
    assert_eq!(window.close_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_success_with_open_popup_closes_it() {
    let f = fixture();
    let sink = Recorder::default();
    let handle = f.linker.start_login(sink.clone()).unwrap();

    let window = f.host.last_window().unwrap();
    window.post_body(&MessageBody::Established).unwrap();

    assert_eq!(handle.finished().await, SessionState::Succeeded);
    assert_eq!(sink.credential(), Some(Credential::default()));
    assert!(window.is_closed());
    assert_eq!(window.close_calls(), 1);
    assert_eq!(f.host.open_windows(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_success_disarms_dismissal() {
    let f = fixture();
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    let window = f.host.last_window().unwrap();

    window.post_body(&success("t")).unwrap();
    handle.finished().await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(sink.calls(), 1);
    assert_eq!(sink.successes(), 1);
}

// =========================================================================
// Scenario B: user closes the popup
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_user_close_reports_cancelled_within_one_poll() {
    let f = fixture();
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    let started = tokio::time::Instant::now();

    f.host.last_window().unwrap().user_close();

    assert_eq!(handle.finished().await, SessionState::Cancelled);
    assert!(started.elapsed() <= Duration::from_millis(500));
    assert_eq!(sink.errors(), vec![LinkError::UserCancelled]);
    assert!(sink.errors()[0].is_user_initiated());
    assert_eq!(sink.successes(), 0);
    assert_eq!(f.bus.listener_count(), 0);
    assert_eq!(f.linker.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_message_and_close_in_same_turn_message_wins() {
    let f = fixture();
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    let window = f.host.last_window().unwrap();

    window.post_body(&success("t")).unwrap();
    window.user_close();

    assert_eq!(handle.finished().await, SessionState::Succeeded);
    assert_eq!(sink.successes(), 1);
    assert!(sink.errors().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_message_posted_between_polls_then_closed_still_succeeds() {
    let f = fixture();
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    let window = f.host.last_window().unwrap();

    tokio::time::sleep(Duration::from_millis(700)).await;
    window.post_and_close(&success("late")).unwrap();

    assert_eq!(handle.finished().await, SessionState::Succeeded);
    assert_eq!(sink.credential().unwrap().token.as_deref(), Some("late"));
}

// =========================================================================
// Scenario C: provider error
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_provider_error_passes_text_and_closes_popup() {
    let f = fixture();
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    let window = f.host.last_window().unwrap();

    window.post_body(&provider_error("denied")).unwrap();

    assert_eq!(handle.finished().await, SessionState::Failed);
    assert_eq!(sink.errors(), vec![LinkError::Provider("denied".into())]);
    assert!(!sink.errors()[0].is_user_initiated());
    assert_eq!(window.close_calls(), 1);
    assert!(!window.closed_by_user());
}

#[tokio::test(start_paused = true)]
async fn test_success_false_without_error_is_unspecified_failure() {
    let f = fixture();
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();

    f.host
        .last_window()
        .unwrap()
        .post_raw(r#"{"success":false}"#)
        .unwrap();

    handle.finished().await;
    assert_eq!(
        sink.errors(),
        vec![LinkError::Provider(popbridge::protocol::UNSPECIFIED_FAILURE.into())]
    );
}

// =========================================================================
// Scenario D: popup blocked
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_blocked_popup_fails_without_arming_anything() {
    let f = fixture();
    f.host.set_popup_blocker(true);
    let sink = Recorder::default();

    let handle = f.linker.start_link("42", sink.clone()).unwrap();

    assert_eq!(handle.state(), SessionState::Failed);
    assert!(handle.is_finished());
    assert_eq!(handle.popup(), None);
    assert_eq!(sink.errors(), vec![LinkError::PopupBlocked]);
    assert_eq!(f.bus.listener_count(), 0);
    assert_eq!(f.linker.active_count(), 0);
    assert!(!handle.abort());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(sink.calls(), 1);
}

// =========================================================================
// Message filtering
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_malformed_messages_are_ignored() {
    let f = fixture();
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    let window = f.host.last_window().unwrap();

    window.post_raw("not json at all").unwrap();
    window.post_raw(r#"{"hello":"world"}"#).unwrap();
    window.post_raw(r#"[1,2,3]"#).unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(handle.state(), SessionState::AwaitingResult);
    assert_eq!(sink.calls(), 0);

    window.post_body(&success("t")).unwrap();

    assert_eq!(handle.finished().await, SessionState::Succeeded);
    assert_eq!(sink.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_second_message_is_ignored() {
    let f = fixture();
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    let window = f.host.last_window().unwrap();

    window.post_body(&provider_error("denied")).unwrap();
    window.post_body(&success("t")).unwrap();

    assert_eq!(handle.finished().await, SessionState::Failed);
    assert_eq!(sink.calls(), 1);
    assert_eq!(sink.successes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_foreign_origin_is_ignored() {
    let f = fixture();
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    let window = f.host.last_window().unwrap();

    window.navigate(Url::parse("https://evil.example.net/callback").unwrap());
    window.post_body(&success("stolen")).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.calls(), 0);

    window.user_close();

    assert_eq!(handle.finished().await, SessionState::Cancelled);
    assert_eq!(sink.successes(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_allow_list_accepts_sibling_origin() {
    let sibling = Origin::parse("https://accounts.example.com").unwrap();
    let f = fixture_with(
        LinkerBuilder::new().origin_policy(OriginPolicy::AllowList(vec![sibling])),
    );
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    let window = f.host.last_window().unwrap();

    window.navigate(Url::parse("https://accounts.example.com/done").unwrap());
    window.post_body(&success("t")).unwrap();

    assert_eq!(handle.finished().await, SessionState::Succeeded);
}

// =========================================================================
// Abort and deadline
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_abort_before_message_reports_aborted() {
    let f = fixture();
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    let window = f.host.last_window().unwrap();

    assert!(handle.abort());

    assert_eq!(handle.finished().await, SessionState::Aborted);
    assert_eq!(sink.errors(), vec![LinkError::Aborted]);
    assert!(sink.errors()[0].is_user_initiated());
    assert_eq!(window.close_calls(), 1);
    assert_eq!(f.bus.listener_count(), 0);
    assert!(!handle.abort());
}

#[tokio::test(start_paused = true)]
async fn test_deadline_reports_timed_out() {
    let f = fixture_with(LinkerBuilder::new().timeout(Duration::from_secs(30)));
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    let started = tokio::time::Instant::now();

    assert_eq!(handle.finished().await, SessionState::TimedOut);
    assert_eq!(started.elapsed(), Duration::from_secs(30));
    assert_eq!(sink.errors(), vec![LinkError::TimedOut(Duration::from_secs(30))]);
    assert!(f.host.last_window().unwrap().is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_message_before_deadline_wins() {
    let f = fixture_with(LinkerBuilder::new().timeout(Duration::from_secs(30)));
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    let window = f.host.last_window().unwrap();

    tokio::time::sleep(Duration::from_secs(29)).await;
    window.post_body(&success("t")).unwrap();

    assert_eq!(handle.finished().await, SessionState::Succeeded);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(sink.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_beyond_clock_range_never_fires() {
    let f = fixture_with(LinkerBuilder::new().timeout(Duration::MAX));
    let sink = Recorder::default();
    let handle = f.linker.start_link("42", sink.clone()).unwrap();
    assert_eq!(handle.state(), SessionState::AwaitingResult);
    assert_eq!(f.linker.active_count(), 1);

    tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
    assert_eq!(handle.state(), SessionState::AwaitingResult);
    assert_eq!(sink.calls(), 0);

    f.host.last_window().unwrap().post_body(&success("t")).unwrap();

    assert_eq!(handle.finished().await, SessionState::Succeeded);
    assert_eq!(sink.successes(), 1);
    assert_eq!(f.linker.active_count(), 0);
}

// =========================================================================
// Linker bookkeeping
// =========================================================================

/// Hands out the same window for every request, like a host that reuses a
/// named popup target.
struct ReusingLauncher {
    host: MemoryHost,
    window: Mutex<Option<MemoryWindow>>,
}

impl PopupLauncher for ReusingLauncher {
    type Window = MemoryWindow;

    fn open(&self, request: &PopupRequest) -> Result<MemoryWindow, WindowError> {
        let mut slot = self.window.lock().unwrap();
        if let Some(window) = slot.as_ref() {
            return Ok(window.clone());
        }
        let window = self.host.open(request)?;
        *slot = Some(window.clone());
        Ok(window)
    }
}

#[tokio::test(start_paused = true)]
async fn test_window_owned_by_live_session_fails_second_as_unavailable() {
    let bus = MessageBus::new();
    let host = MemoryHost::new(bus.clone());
    let launcher = ReusingLauncher {
        host: host.clone(),
        window: Mutex::new(None),
    };
    let linker = LinkerBuilder::new()
        .provider_base(PROVIDER)
        .build(launcher, bus.clone())
        .unwrap();
    let first_sink = Recorder::default();
    let second_sink = Recorder::default();

    let first = linker.start_link("1", first_sink.clone()).unwrap();
    let second = linker.start_link("2", second_sink.clone()).unwrap();

    assert_eq!(second.state(), SessionState::Failed);
    assert!(second.is_finished());
    assert!(matches!(
        second_sink.errors().as_slice(),
        [LinkError::Unavailable(_)]
    ));
    assert_eq!(second_sink.successes(), 0);

    let window = host.last_window().unwrap();
    assert_eq!(first.popup(), Some(window.id()));
    assert_eq!(window.close_calls(), 0);
    assert!(!window.is_closed());
    assert_eq!(bus.listener_count(), 1);
    assert_eq!(linker.active_count(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(first.state(), SessionState::AwaitingResult);
    assert_eq!(first_sink.calls(), 0);

    window.post_body(&success("t")).unwrap();
    assert_eq!(first.finished().await, SessionState::Succeeded);
    assert_eq!(first_sink.successes(), 1);
    assert_eq!(second_sink.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_registry_slot_freed_after_finish() {
    let f = fixture();
    let handle = f.linker.start_link("42", Recorder::default()).unwrap();

    let active: Vec<SessionId> = f.linker.active_sessions().iter().map(|h| h.id()).collect();
    assert_eq!(active, vec![handle.id()]);

    f.host.last_window().unwrap().user_close();
    handle.finished().await;

    assert!(f.linker.active_sessions().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_sessions_are_independent() {
    let f = fixture();
    let first_sink = Recorder::default();
    let second_sink = Recorder::default();
    let first = f.linker.start_link("1", first_sink.clone()).unwrap();
    let first_window = f.host.last_window().unwrap();
    let second = f.linker.start_link("2", second_sink.clone()).unwrap();
    let second_window = f.host.last_window().unwrap();
    assert_ne!(first.id(), second.id());
    assert_ne!(first_window.id(), second_window.id());
    assert_eq!(f.bus.listener_count(), 2);

    second_window.post_body(&success("second")).unwrap();
    assert_eq!(second.finished().await, SessionState::Succeeded);
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(first.state(), SessionState::AwaitingResult);
    assert_eq!(first_sink.calls(), 0);
    assert!(!first_window.is_closed());

    first_window.post_body(&provider_error("nope")).unwrap();
    assert_eq!(first.finished().await, SessionState::Failed);
    assert_eq!(second_sink.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_abort_all_aborts_every_session() {
    let f = fixture();
    let sinks = [Recorder::default(), Recorder::default()];
    let handles: Vec<_> = sinks
        .iter()
        .map(|s| f.linker.start_login(s.clone()).unwrap())
        .collect();

    assert_eq!(f.linker.abort_all(), 2);

    for handle in &handles {
        assert_eq!(handle.finished().await, SessionState::Aborted);
    }
    for sink in &sinks {
        assert_eq!(sink.errors(), vec![LinkError::Aborted]);
    }
    assert_eq!(f.host.open_windows(), 0);
    assert_eq!(f.linker.active_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_abort_stale_only_touches_old_sessions() {
    let f = fixture();
    let handle = f.linker.start_login(Recorder::default()).unwrap();

    assert_eq!(f.linker.abort_stale(Duration::from_secs(3600)), 0);

    // Registry ages use the wall clock, not Tokio's paused one.
    std::thread::sleep(Duration::from_millis(5));
    assert_eq!(f.linker.abort_stale(Duration::from_millis(1)), 1);
    assert_eq!(handle.finished().await, SessionState::Aborted);
}

#[tokio::test(start_paused = true)]
async fn test_popup_opened_at_login_url_with_title() {
    let f = fixture_with(LinkerBuilder::new().title("Connect account"));
    f.linker.start_login(Recorder::default()).unwrap();

    let attempt = &f.host.attempts()[0];
    assert_eq!(attempt.url.as_str(), "https://auth.example.com/login");
    assert_eq!(attempt.title, "Connect account");
    assert_eq!((attempt.placement.width, attempt.placement.height), (500, 600));
}

#[tokio::test(start_paused = true)]
async fn test_oneshot_sink_resolves_with_outcome() {
    let f = fixture();
    let (tx, rx) = oneshot::channel();
    f.linker.start_link("42", tx).unwrap();

    f.host
        .last_window()
        .unwrap()
        .post_body(&provider_error("denied"))
        .unwrap();

    assert_eq!(rx.await.unwrap(), Err(LinkError::Provider("denied".into())));
}

#[tokio::test(start_paused = true)]
async fn test_callbacks_sink_runs_matching_closure() {
    let f = fixture();
    let successes = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let (s, e) = (Arc::clone(&successes), Arc::clone(&errors));
    let handle = f
        .linker
        .start_login(callbacks(
            move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            },
            move |_| {
                e.fetch_add(1, Ordering::SeqCst);
            },
        ))
        .unwrap();

    f.host.last_window().unwrap().user_close();
    handle.finished().await;

    assert_eq!(successes.load(Ordering::SeqCst), 0);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_with_opaque_url_is_rejected_before_opening() {
    let f = fixture();
    let sink = Recorder::default();

    let result = f
        .linker
        .start(Url::parse("data:text/html,hello").unwrap(), sink.clone());

    assert!(matches!(result, Err(PopbridgeError::Protocol(_))));
    assert!(f.host.attempts().is_empty());
    assert_eq!(sink.calls(), 0);
}
