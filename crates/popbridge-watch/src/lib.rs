//! Popup dismissal polling and session deadlines for Popbridge.
//!
//! A closed window cannot be observed as an event, so the
//! [`DismissalWatcher`] asks the window at a fixed interval. The
//! [`Deadline`] bounds how long a session may wait at all.
//!
//! # Integration
//!
//! Both are designed to sit inside a session actor's `tokio::select!`
//! loop, next to the message channel:
//!
//! ```ignore
//! loop {
//!     tokio::select! {
//!         biased;
//!         c = channel.next() => { /* success or provider error */ }
//!         info = watcher.wait_for_dismissal(&window) => { /* cancelled */ }
//!         limit = deadline.expired() => { /* timed out */ }
//!     }
//! }
//! ```
//!
//! Dropping either one is enough to disarm it; no background task is
//! ever spawned.

use std::time::Duration;

use popbridge_window::PopupWindow;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for the dismissal watcher.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// How often to ask the window whether it has been closed.
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }
}

impl WatchConfig {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
    pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);
    pub const MAX_POLL_INTERVAL: Duration = Duration::from_secs(60);

    pub fn with_interval(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }

    /// Clamps `poll_interval` into
    /// [`MIN_POLL_INTERVAL`](Self::MIN_POLL_INTERVAL)..=[`MAX_POLL_INTERVAL`](Self::MAX_POLL_INTERVAL).
    ///
    /// Called automatically by [`DismissalWatcher::new`].
    pub fn validated(mut self) -> Self {
        let clamped = self
            .poll_interval
            .clamp(Self::MIN_POLL_INTERVAL, Self::MAX_POLL_INTERVAL);
        if clamped != self.poll_interval {
            warn!(
                requested_ms = self.poll_interval.as_millis() as u64,
                clamped_ms = clamped.as_millis() as u64,
                "poll_interval out of range, clamping"
            );
            self.poll_interval = clamped;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// DismissalWatcher
// ---------------------------------------------------------------------------

/// Returned once the watcher sees the window closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DismissalInfo {
    /// Polls performed, including the one that saw the window closed.
    pub polls: u64,
    /// Time from the watcher's creation to the observation.
    pub elapsed: Duration,
}

/// Polls a popup until it reports itself closed.
///
/// One watcher per session. It fires at most once: after reporting a
/// dismissal, or after [`stop`](Self::stop), it pends forever.
pub struct DismissalWatcher {
    config: WatchConfig,
    /// Created lazily on the first wait so the first poll lands one full
    /// interval after arming, not immediately.
    interval: Option<Interval>,
    created: Instant,
    polls: u64,
    stopped: bool,
}

impl DismissalWatcher {
    pub fn new(config: WatchConfig) -> Self {
        let config = config.validated();
        debug!(
            poll_ms = config.poll_interval.as_millis() as u64,
            "dismissal watcher armed"
        );
        Self {
            config,
            interval: None,
            created: Instant::now(),
            polls: 0,
            stopped: false,
        }
    }

    /// Waits until `window` reports itself closed.
    ///
    /// Cancel-safe: dropping the future between polls loses nothing, the
    /// poll count and schedule live in `self`.
    pub async fn wait_for_dismissal<W: PopupWindow + ?Sized>(
        &mut self,
        window: &W,
    ) -> DismissalInfo {
        if self.stopped {
            return std::future::pending().await;
        }

        let period = self.config.poll_interval;
        let created = self.created;
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = time::interval_at(created + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            interval.tick().await;
            self.polls += 1;
            trace!(window_id = %window.id(), poll = self.polls, "polling popup");
            if window.is_closed() {
                self.stopped = true;
                let info = DismissalInfo {
                    polls: self.polls,
                    elapsed: self.created.elapsed(),
                };
                debug!(window_id = %window.id(), polls = info.polls, "popup observed closed");
                return info;
            }
        }
    }

    /// Stops polling. Idempotent.
    pub fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.interval = None;
            debug!(polls = self.polls, "dismissal watcher stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Polls performed so far.
    pub fn polls(&self) -> u64 {
        self.polls
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }
}

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

/// An optional limit on how long a session may wait for a result.
///
/// With no limit configured, [`expired`](Self::expired) pends forever,
/// which leaves the other `select!` branches in charge. A limit too large
/// to represent as an instant behaves the same way.
#[derive(Debug, Clone)]
pub struct Deadline {
    limit: Option<Duration>,
    at: Option<Instant>,
}

impl Deadline {
    /// Starts the clock now.
    pub fn new(limit: Option<Duration>) -> Self {
        let at = limit.and_then(|d| Instant::now().checked_add(d));
        if at.is_none() && limit.is_some() {
            debug!(?limit, "deadline beyond the clock's range, never expires");
        }
        Self { limit, at }
    }

    /// A deadline that never expires.
    pub fn none() -> Self {
        Self::new(None)
    }

    /// Resolves with the configured limit once it has elapsed.
    pub async fn expired(&self) -> Duration {
        match (self.at, self.limit) {
            (Some(at), Some(limit)) => {
                time::sleep_until(at).await;
                limit
            }
            _ => std::future::pending().await,
        }
    }

    /// Whether the deadline has already passed. Always `false` without a limit.
    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Time left, or `None` when the deadline never expires.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn limit(&self) -> Option<Duration> {
        self.limit
    }
}
