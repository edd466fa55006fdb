//! Per-user fixed-window rate limiting.
//!
//! Each identity gets a counter that resets completely once its window has
//! elapsed. Bursts of up to `2 * max_calls` across a window boundary are
//! accepted behaviour of a fixed-window counter.

use std::{
    collections::{BTreeMap, HashMap},
    future::Future,
    sync::Arc,
    time::Duration,
};

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::domain::UserId;

/// Request counter for one identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateWindow {
    pub request_count: u32,
    pub window_start: Instant,
}

impl RateWindow {
    fn new(now: Instant) -> Self {
        Self {
            request_count: 0,
            window_start: now,
        }
    }
}

/// Why a call was not let through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Refusal {
    pub identity: UserId,
    /// Display name the refusal addresses the user by.
    pub name: String,
    pub max_calls: u32,
    pub window: Duration,
}

impl Refusal {
    /// Human-readable refusal sent back to the user.
    pub fn message(&self) -> String {
        let secs = self.window.as_secs();
        format!(
            "🛑 Not so fast, {}. You have exceeded the limit of {} messages every {secs} seconds. \
Please wait {secs} seconds before sending another message.",
            self.name, self.max_calls
        )
    }
}

/// A result type that can stand in for a refused call.
///
/// The substitute has the same shape as a real result so callers handle both
/// without branching.
pub trait Refusable {
    fn refused(refusal: &Refusal) -> Self;
}

impl<T: Refusable, E> Refusable for std::result::Result<T, E> {
    fn refused(refusal: &Refusal) -> Self {
        Ok(T::refused(refusal))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Call allowed; `count` is the request number within the current window.
    Allowed { count: u32 },
    Refused(Refusal),
}

/// Fixed-window call gate keyed by user identity.
///
/// Windows are created lazily on first use and live as long as the limiter.
/// The map lock is only held to look up or insert a window; each window has
/// its own lock so different users never wait on each other, and no lock is
/// held while the gated operation runs.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: u32,
    window: Duration,
    session_id: String,
    display_names: BTreeMap<String, String>,
    windows: Mutex<HashMap<UserId, Arc<Mutex<RateWindow>>>>,
}

impl RateLimiter {
    /// `max_calls` and `window` must be non-zero (validated by the config loader).
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            session_id: String::new(),
            display_names: BTreeMap::new(),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Session id attached to refusal logs.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    /// Identity -> display name, used to address refused users.
    pub fn with_display_names(mut self, names: BTreeMap<String, String>) -> Self {
        self.display_names = names;
        self
    }

    pub fn max_calls(&self) -> u32 {
        self.max_calls
    }

    pub fn window_duration(&self) -> Duration {
        self.window
    }

    async fn window_for(&self, identity: &UserId, now: Instant) -> Arc<Mutex<RateWindow>> {
        let mut map = self.windows.lock().await;
        map.entry(identity.clone())
            .or_insert_with(|| Arc::new(Mutex::new(RateWindow::new(now))))
            .clone()
    }

    pub async fn admit(&self, identity: &UserId) -> Admission {
        self.admit_at(identity, Instant::now()).await
    }

    /// Count one request for `identity` at `now`.
    ///
    /// The increment is never rolled back, even when the request is refused.
    pub async fn admit_at(&self, identity: &UserId, now: Instant) -> Admission {
        let lock = self.window_for(identity, now).await;
        let mut w = lock.lock().await;

        if now.saturating_duration_since(w.window_start) > self.window {
            w.request_count = 0;
            w.window_start = now;
        }

        w.request_count = w.request_count.saturating_add(1);

        if w.request_count > self.max_calls {
            tracing::warn!(
                session = %self.session_id,
                user = %identity,
                count = w.request_count,
                max = self.max_calls,
                window_secs = self.window.as_secs(),
                "rate limit exceeded"
            );
            return Admission::Refused(Refusal {
                identity: identity.clone(),
                name: self
                    .display_names
                    .get(identity.as_str())
                    .cloned()
                    .unwrap_or_else(|| identity.to_string()),
                max_calls: self.max_calls,
                window: self.window,
            });
        }

        Admission::Allowed {
            count: w.request_count,
        }
    }

    /// Run `op` for `identity` unless it is over quota, in which case the
    /// refusal value of `T` is returned and `op` is never invoked.
    pub async fn gate<T, F, Fut>(&self, identity: &UserId, op: F) -> T
    where
        T: Refusable,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match self.admit(identity).await {
            Admission::Allowed { .. } => op().await,
            Admission::Refused(refusal) => T::refused(&refusal),
        }
    }

    /// Snapshot of the identity's window, if it has made any request.
    pub async fn window(&self, identity: &UserId) -> Option<RateWindow> {
        let lock = self.windows.lock().await.get(identity).cloned()?;
        let w = *lock.lock().await;
        Some(w)
    }
}
