//! Background expiry check for one credential slot.
//!
//! The monitor runs as a cancellable tokio task: one check on `start`, then
//! one per tick of a fixed interval until `stop` (or drop). Elapsed windows
//! go through [`AuthSession::expire`], the same routine the request path uses.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::credential::{expiry_warning, Audience};
use super::session::AuthSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorStatus {
    Inactive,
    Active { remaining: Duration },
    ExpiringSoon { remaining: Duration },
    Expired,
}

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("session monitor requires a running tokio runtime")]
    NoRuntime,
}

struct MonitorCore {
    auth: Arc<AuthSession>,
    audience: Audience,
    warning: Duration,
    /// issued_at of the credential that already received the notice.
    notified_for: Mutex<Option<DateTime<Utc>>>,
}

impl MonitorCore {
    fn check(&self) -> MonitorStatus {
        let store = self.auth.store(self.audience);
        let Some(credential) = store.current() else {
            return MonitorStatus::Inactive;
        };

        let now = store.now();
        if credential.is_expired(self.audience, now) {
            self.auth.expire(self.audience);
            return MonitorStatus::Expired;
        }

        // A window no longer than the warning starts below it and never crosses.
        let remaining = credential.remaining(self.audience, now);
        if remaining > self.warning || self.audience.window() <= self.warning {
            return MonitorStatus::Active { remaining };
        }

        let mut notified = self.notified_for.lock().expect("monitor mutex poisoned");
        if *notified != Some(credential.issued_at) {
            *notified = Some(credential.issued_at);
            info!(audience = %self.audience, minutes = remaining.num_minutes(), "session expiring soon");
            self.auth
                .navigator()
                .notify_expiring(self.audience, remaining);
        }
        MonitorStatus::ExpiringSoon { remaining }
    }
}

struct MonitorTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct SessionMonitor {
    core: Arc<MonitorCore>,
    interval: StdDuration,
    task: Mutex<Option<MonitorTask>>,
}

impl SessionMonitor {
    pub fn new(auth: Arc<AuthSession>, audience: Audience, interval: StdDuration) -> Self {
        Self {
            core: Arc::new(MonitorCore {
                auth,
                audience,
                warning: expiry_warning(),
                notified_for: Mutex::new(None),
            }),
            interval,
            task: Mutex::new(None),
        }
    }

    pub fn with_warning(mut self, warning: Duration) -> Self {
        if let Some(core) = Arc::get_mut(&mut self.core) {
            core.warning = warning;
        }
        self
    }

    pub fn audience(&self) -> Audience {
        self.core.audience
    }

    /// Runs one expiry check immediately.
    pub fn check(&self) -> MonitorStatus {
        self.core.check()
    }

    /// Checks once, then keeps checking on the interval. A second call while
    /// running only performs the check.
    pub fn start(&self) -> Result<MonitorStatus, MonitorError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| MonitorError::NoRuntime)?;
        let status = self.core.check();

        let mut task = self.task.lock().expect("monitor mutex poisoned");
        if task.is_some() {
            return Ok(status);
        }

        let (shutdown, mut stopped) = watch::channel(false);
        let core = self.core.clone();
        let period = self.interval;
        let handle = runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let status = core.check();
                        debug!(audience = %core.audience, ?status, "session check");
                    }
                    _ = stopped.changed() => break,
                }
            }
        });

        info!(audience = %self.core.audience, interval_secs = period.as_secs(), "session monitor started");
        *task = Some(MonitorTask { shutdown, handle });
        Ok(status)
    }

    /// Stops the background task. Safe to call repeatedly.
    pub fn stop(&self) {
        let task = self.task.lock().expect("monitor mutex poisoned").take();
        if let Some(task) = task {
            let _ = task.shutdown.send(true);
            task.handle.abort();
            info!(audience = %self.core.audience, "session monitor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .expect("monitor mutex poisoned")
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for SessionMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMonitor")
            .field("audience", &self.core.audience)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
