// src/services/notification_poller.rs
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing;

use crate::{
    errors::{SparrowError as AppError, SparrowResult},
    models::notification::NotificationItem,
    services::{
        api_service::TrackingApi,
        messaging_service::NotificationDispatcher,
        poll_loop::{self, FirstTick, LoopCounter, PollHandle},
    },
    utils::id_generator::{IdGenerator, IdType},
};

pub const DEFAULT_NOTIFICATION_INTERVAL: Duration = Duration::from_secs(60);

/// Wall-clock source for the last-check window.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

struct PollerShared {
    api: Arc<dyn TrackingApi>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Clock,
    last_check: Mutex<DateTime<Utc>>,
}

impl PollerShared {
    fn last_check(&self) -> DateTime<Utc> {
        *self.last_check.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn check_for_new_notifications(&self, cancel: &CancellationToken) -> SparrowResult<usize> {
        let fetched = poll_loop::until_cancelled(cancel, self.api.fetch_notifications()).await;

        let items = match fetched {
            Ok(items) => items,
            Err(AppError::Cancelled) => {
                tracing::debug!("Notification check cancelled");
                return Err(AppError::Cancelled);
            }
            Err(e) => {
                // The window stays open so the next tick sees the same items.
                tracing::error!(error = %e, "Error checking notifications");
                return Err(e);
            }
        };

        let since = self.last_check();
        let fresh: Vec<NotificationItem> = items.into_iter().filter(|n| n.is_new_since(since)).collect();

        for notification in &fresh {
            tracing::debug!(id = ?notification.id, title = %notification.title, "New notification");
            // A stop mid-batch leaves the window where it was.
            self.dispatcher
                .show_notification_until(&notification.title, &notification.message, cancel)
                .await?;
        }

        let now = (self.clock)();
        *self.last_check.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;

        if !fresh.is_empty() {
            tracing::info!(count = fresh.len(), "Raised new notifications");
        }
        Ok(fresh.len())
    }
}

/// Periodically raises a notification for every unread item created since the
/// previous successful check.
pub struct NotificationManager {
    shared: Arc<PollerShared>,
    check_interval: Duration,
    active: Mutex<Option<PollHandle>>,
    loops: LoopCounter,
}

impl NotificationManager {
    pub fn new(api: Arc<dyn TrackingApi>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self::with_clock(api, dispatcher, system_clock())
    }

    pub fn with_clock(api: Arc<dyn TrackingApi>, dispatcher: Arc<NotificationDispatcher>, clock: Clock) -> Self {
        let last_check = clock();
        Self {
            shared: Arc::new(PollerShared {
                api,
                dispatcher,
                clock,
                last_check: Mutex::new(last_check),
            }),
            check_interval: DEFAULT_NOTIFICATION_INTERVAL,
            active: Mutex::new(None),
            loops: LoopCounter::default(),
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> SparrowResult<Self> {
        self.check_interval = poll_loop::validate_period(interval, "notification poll interval")?;
        Ok(self)
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Starts the periodic check. The first check runs one full period after
    /// starting. Calling again restarts the timer.
    pub fn start_notification_polling(&self) {
        let mut active = self.lock_active();
        if let Some(previous) = active.take() {
            tracing::info!(poller_id = %previous.poller_id, "Restarting notification poll");
            drop(previous.stop());
        }

        let poller_id = IdGenerator::generate(IdType::NotificationPoller);
        tracing::info!(poller_id = %poller_id, interval = ?self.check_interval, "Starting notification poll");

        let shared = self.shared.clone();
        *active = Some(poll_loop::spawn_poll_loop(
            poller_id,
            self.check_interval,
            FirstTick::AfterPeriod,
            &self.loops,
            move |cancel| {
                let shared = shared.clone();
                async move {
                    let _ = shared.check_for_new_notifications(&cancel).await;
                }
            },
        ));
    }

    pub fn stop_notification_polling(&self) {
        if let Some(previous) = self.lock_active().take() {
            tracing::info!(poller_id = %previous.poller_id, "Stopping notification poll");
            drop(previous.stop());
        }
    }

    pub async fn shutdown(&self) {
        let previous = self.lock_active().take();
        if let Some(previous) = previous {
            if let Err(e) = previous.stop().await {
                tracing::warn!(error = %e, "Notification poll task ended abnormally");
            }
        }
    }

    pub fn is_polling(&self) -> bool {
        self.lock_active().is_some()
    }

    pub fn active_loops(&self) -> usize {
        self.loops.get()
    }

    pub fn last_check(&self) -> DateTime<Utc> {
        self.shared.last_check()
    }

    /// One check outside the timer. Returns how many notifications were raised.
    pub async fn check_for_new_notifications(&self) -> SparrowResult<usize> {
        self.shared
            .check_for_new_notifications(&CancellationToken::new())
            .await
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<PollHandle>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for NotificationManager {
    fn drop(&mut self) {
        self.stop_notification_polling();
    }
}
