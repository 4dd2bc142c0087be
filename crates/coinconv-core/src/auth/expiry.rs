//! One-shot expiry timers for bearer tokens.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Claims;

/// A pending expiry callback. Empty when nothing was scheduled.
///
/// Dropping the handle disarms it.
#[derive(Debug, Default)]
pub struct ExpiryHandle {
    task: Option<JoinHandle<()>>,
}

impl ExpiryHandle {
    pub fn empty() -> Self {
        Self::default()
    }

    /// True while the callback is scheduled and has not run yet
    pub fn is_pending(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the pending callback. No-op on empty or fired handles.
    pub fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ExpiryHandle {
    fn drop(&mut self) {
        self.disarm();
    }
}

/// Holds at most one pending expiry timer.
#[derive(Debug, Default)]
pub struct ExpiryScheduler {
    current: ExpiryHandle,
}

impl ExpiryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `on_expire` for the expiry instant in `claims`.
    ///
    /// Without claims or `exp` nothing is scheduled. If the instant has
    /// already passed, `on_expire` runs before this returns.
    pub fn arm<F>(claims: Option<&Claims>, on_expire: F) -> ExpiryHandle
    where
        F: FnOnce() + Send + 'static,
    {
        Self::arm_at(claims, Utc::now(), on_expire)
    }

    pub fn arm_at<F>(claims: Option<&Claims>, now: DateTime<Utc>, on_expire: F) -> ExpiryHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(exp) = claims.and_then(|c| c.exp) else {
            return ExpiryHandle::empty();
        };

        let delay_ms = exp * 1000.0 - now.timestamp_millis() as f64;
        if delay_ms <= 0.0 {
            debug!(exp, "Token already expired, expiring now");
            on_expire();
            return ExpiryHandle::empty();
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "No async runtime, expiry timer not armed");
                return ExpiryHandle::empty();
            }
        };

        let delay = Duration::from_millis(delay_ms.ceil() as u64);
        debug!(delay_ms = delay.as_millis() as u64, "Arming expiry timer");
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            on_expire();
        });
        ExpiryHandle { task: Some(task) }
    }

    /// Disarm the current timer, then arm a new one.
    pub fn rearm<F>(&mut self, claims: Option<&Claims>, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.current.disarm();
        self.current = Self::arm(claims, on_expire);
    }

    /// Install an already armed handle, disarming the previous one.
    pub fn replace(&mut self, handle: ExpiryHandle) {
        self.current.disarm();
        self.current = handle;
    }

    pub fn disarm(&mut self) {
        self.current.disarm();
    }

    pub fn is_pending(&self) -> bool {
        self.current.is_pending()
    }
}
