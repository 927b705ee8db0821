// src/services/tracker_service.rs
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing;

use crate::{
    errors::{SparrowError as AppError, SparrowResult},
    models::tracking::TrackingRecord,
    services::{
        api_service::TrackingApi,
        display_service::DisplaySurface,
        messaging_service::{DispatchOutcome, NotificationDispatcher},
        poll_loop::{self, FirstTick, LoopCounter, PollHandle},
    },
    utils::{
        id_generator::{IdGenerator, IdType},
        markup::{render_record_badge, render_timeline, StatusBadge},
    },
};

pub const DEFAULT_TRACKING_INTERVAL: Duration = Duration::from_secs(30);
pub const UPDATED_TITLE: &str = "Tracking Updated";
pub const UPDATED_MESSAGE: &str = "Latest tracking information loaded";

/// What one render wrote to the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedTracking {
    pub badge: StatusBadge,
    pub badges_updated: usize,
    /// Timeline markup, when the record carried events and the surface has a container.
    pub timeline: Option<String>,
}

/// Renders `record` into `surface` and returns the markup that was written.
pub fn update_tracking_display(
    record: &TrackingRecord,
    surface: &dyn DisplaySurface,
) -> SparrowResult<RenderedTracking> {
    let badge = render_record_badge(record);
    let timeline = match &record.tracking_events {
        Some(events) if surface.has_timeline() => Some(render_timeline(events)?),
        _ => None,
    };

    // Nothing is written until every piece rendered.
    let badges_updated = surface.apply_status_badge(&badge);
    if let Some(markup) = &timeline {
        surface.replace_timeline(markup);
    }

    Ok(RenderedTracking {
        badge,
        badges_updated,
        timeline,
    })
}

struct TrackerShared {
    api: Arc<dyn TrackingApi>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl TrackerShared {
    async fn update_tracking_info(
        &self,
        tracking_number: &str,
        cancel: &CancellationToken,
    ) -> SparrowResult<RenderedTracking> {
        let fetched = poll_loop::until_cancelled(cancel, self.api.fetch_tracking(tracking_number)).await;

        let record = match fetched {
            Ok(record) => record,
            Err(AppError::Cancelled) => {
                tracing::debug!(tracking_number, "Tracking request cancelled");
                return Err(AppError::Cancelled);
            }
            Err(e) => {
                tracing::error!(tracking_number, error = %e, "Error updating tracking info");
                return Err(e);
            }
        };

        let rendered = update_tracking_display(&record, self.dispatcher.surface().as_ref()).inspect_err(|e| {
            tracing::error!(tracking_number, error = %e, "Error rendering tracking info");
        })?;
        tracing::debug!(
            tracking_number,
            status = %record.status,
            badges = rendered.badges_updated,
            timeline = rendered.timeline.is_some(),
            "Tracking display updated"
        );

        self.dispatcher
            .show_notification_until(UPDATED_TITLE, UPDATED_MESSAGE, cancel)
            .await
            .inspect_err(|_| tracing::debug!(tracking_number, "Tracking notification cancelled"))?;
        Ok(rendered)
    }
}

#[derive(Debug)]
struct ActivePoll {
    tracking_number: String,
    handle: PollHandle,
}

/// Polls one parcel on a fixed period and keeps its badges and timeline current.
///
/// Two states: idle and polling. `start_polling` always ends up polling the
/// given parcel with exactly one timer; `stop_polling` always ends up idle.
pub struct RealTimeTracker {
    shared: Arc<TrackerShared>,
    polling_interval: Duration,
    active: Mutex<Option<ActivePoll>>,
    loops: LoopCounter,
}

impl RealTimeTracker {
    pub fn new(api: Arc<dyn TrackingApi>, dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self {
            shared: Arc::new(TrackerShared { api, dispatcher }),
            polling_interval: DEFAULT_TRACKING_INTERVAL,
            active: Mutex::new(None),
            loops: LoopCounter::default(),
        }
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> SparrowResult<Self> {
        self.polling_interval = poll_loop::validate_period(interval, "tracking poll interval")?;
        Ok(self)
    }

    pub fn polling_interval(&self) -> Duration {
        self.polling_interval
    }

    /// Starts polling `tracking_number`, replacing any poll already running.
    /// The first fetch happens immediately. The number is sent exactly as
    /// given; blank input is rejected. Must be called inside a tokio runtime.
    pub fn start_polling(&self, tracking_number: &str) -> SparrowResult<()> {
        if tracking_number.trim().is_empty() {
            return Err(AppError::invalid_tracking_number(tracking_number));
        }

        let mut active = self.lock_active();
        if let Some(previous) = active.take() {
            tracing::info!(
                poller_id = %previous.handle.poller_id,
                tracking_number = %previous.tracking_number,
                "Restarting tracking poll"
            );
            drop(previous.handle.stop());
        }

        let poller_id = IdGenerator::generate(IdType::Tracker);
        tracing::info!(
            poller_id = %poller_id,
            tracking_number,
            interval = ?self.polling_interval,
            "Starting tracking poll"
        );

        let shared = self.shared.clone();
        let number = tracking_number.to_string();
        let handle = poll_loop::spawn_poll_loop(
            poller_id,
            self.polling_interval,
            FirstTick::Immediate,
            &self.loops,
            move |cancel| {
                let shared = shared.clone();
                let number = number.clone();
                async move {
                    // Failures are logged inside; the timer keeps running.
                    let _ = shared.update_tracking_info(&number, &cancel).await;
                }
            },
        );

        *active = Some(ActivePoll {
            tracking_number: tracking_number.to_string(),
            handle,
        });
        Ok(())
    }

    /// Stops the timer and cancels any request in flight. No-op when idle.
    pub fn stop_polling(&self) {
        if let Some(previous) = self.lock_active().take() {
            tracing::info!(
                poller_id = %previous.handle.poller_id,
                tracking_number = %previous.tracking_number,
                "Stopping tracking poll"
            );
            drop(previous.handle.stop());
        }
    }

    /// Like `stop_polling`, but waits for the loop task to finish.
    pub async fn shutdown(&self) {
        let previous = self.lock_active().take();
        if let Some(previous) = previous {
            if let Err(e) = previous.handle.stop().await {
                tracing::warn!(error = %e, "Tracking poll task ended abnormally");
            }
        }
    }

    pub fn is_polling(&self) -> bool {
        self.lock_active().is_some()
    }

    pub fn current_tracking_number(&self) -> Option<String> {
        self.lock_active().as_ref().map(|a| a.tracking_number.clone())
    }

    /// Number of poll loops still alive, including ones winding down after a stop.
    pub fn active_loops(&self) -> usize {
        self.loops.get()
    }

    /// One fetch-and-render outside the timer. Errors are logged and returned.
    pub async fn update_tracking_info(&self, tracking_number: &str) -> SparrowResult<RenderedTracking> {
        self.shared
            .update_tracking_info(tracking_number, &CancellationToken::new())
            .await
    }

    pub fn update_tracking_display(&self, record: &TrackingRecord) -> SparrowResult<RenderedTracking> {
        update_tracking_display(record, self.shared.dispatcher.surface().as_ref())
    }

    pub async fn show_notification(&self, title: &str, message: &str) -> DispatchOutcome {
        self.shared.dispatcher.show_notification(title, message).await
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActivePoll>> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for RealTimeTracker {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tracking::TrackingEvent;
    use crate::services::display_service::PageSurface;
    use crate::services::messaging_service::MockNotifier;
    use crate::services::test_support::FakeApi;

    struct Harness {
        api: Arc<FakeApi>,
        page: Arc<PageSurface>,
        notifier: Arc<MockNotifier>,
        tracker: RealTimeTracker,
    }

    fn record(status: &str) -> TrackingRecord {
        TrackingRecord::new(status).with_events(vec![
            TrackingEvent::new("Parcel scanned for delivery", "2025-08-28T10:15:00Z").with_location("Accra Hub"),
            TrackingEvent::new("Order placed", "2025-08-27T09:00:00Z"),
        ])
    }

    fn harness(with_timeline: bool) -> Harness {
        let api = Arc::new(FakeApi::new(record("in_transit")));
        let page = Arc::new(PageSurface::new(2, with_timeline, false));
        let notifier = Arc::new(MockNotifier::granted());
        let dispatcher = Arc::new(NotificationDispatcher::new(notifier.clone(), page.clone()));
        let tracker = RealTimeTracker::new(api.clone(), dispatcher);

        Harness {
            api,
            page,
            notifier,
            tracker,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_fetches_immediately_then_every_period() {
        let h = harness(true);
        h.tracker.start_polling("A1B2C3D4").unwrap();
        settle().await;

        assert!(h.tracker.is_polling());
        assert_eq!(h.api.tracking_calls(), 1);
        assert_eq!(h.api.last_tracking_number().as_deref(), Some("A1B2C3D4"));

        let state = h.page.snapshot();
        assert!(state.badges.iter().all(|b| b.text == "In Transit"));
        assert!(state.timeline.unwrap().contains("Accra Hub"));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(h.api.tracking_calls(), 1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.api.tracking_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_leaves_one_timer() {
        let h = harness(true);
        h.tracker.start_polling("FIRST").unwrap();
        h.tracker.start_polling("SECOND").unwrap();
        settle().await;

        assert_eq!(h.tracker.active_loops(), 1);
        assert_eq!(h.tracker.current_tracking_number().as_deref(), Some("SECOND"));
        assert_eq!(h.api.tracking_calls(), 1);
        assert_eq!(h.api.last_tracking_number().as_deref(), Some("SECOND"));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.api.tracking_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_idle_is_noop() {
        let h = harness(true);
        h.tracker.stop_polling();
        h.tracker.stop_polling();

        assert!(!h.tracker.is_polling());
        assert_eq!(h.tracker.active_loops(), 0);
        assert_eq!(h.api.tracking_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_polling() {
        let h = harness(true);
        h.tracker.start_polling("A1B2C3D4").unwrap();
        settle().await;
        h.tracker.stop_polling();
        settle().await;

        assert!(!h.tracker.is_polling());
        assert_eq!(h.tracker.active_loops(), 0);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.api.tracking_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_keeps_timer_running() {
        let h = harness(true);
        h.api.set_failing(true);
        h.tracker.start_polling("A1B2C3D4").unwrap();
        settle().await;

        assert_eq!(h.api.tracking_calls(), 1);
        assert!(h.tracker.is_polling());
        let state = h.page.snapshot();
        assert!(state.badges.iter().all(|b| b.text.is_empty()));
        assert!(state.banners.is_empty());
        assert!(h.notifier.shown().is_empty());

        h.api.set_failing(false);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.api.tracking_calls(), 2);
        assert!(h.page.snapshot().badges.iter().all(|b| b.text == "In Transit"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_in_flight_request() {
        let h = harness(true);
        h.api.set_delay(Duration::from_secs(10));
        h.tracker.start_polling("A1B2C3D4").unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.api.tracking_calls(), 1);
        h.tracker.stop_polling();

        tokio::time::sleep(Duration::from_secs(20)).await;
        let state = h.page.snapshot();
        assert!(state.badges.iter().all(|b| b.text.is_empty()));
        assert_eq!(state.timeline.as_deref(), Some(""));
        assert!(state.banners.is_empty());
        assert_eq!(h.tracker.active_loops(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending_notification() {
        let api = Arc::new(FakeApi::new(record("in_transit")));
        let page = Arc::new(PageSurface::new(1, true, false));
        let notifier = Arc::new(MockNotifier::granted().slow(Duration::from_secs(600)));
        let dispatcher = Arc::new(NotificationDispatcher::new(notifier.clone(), page.clone()));
        let tracker = RealTimeTracker::new(api.clone(), dispatcher);

        tracker.start_polling("A1B2C3D4").unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(api.tracking_calls(), 1);
        assert!(page.snapshot().badges.iter().all(|b| b.text == "In Transit"));

        let stopped = tokio::time::timeout(Duration::from_secs(1), tracker.shutdown()).await;
        assert!(stopped.is_ok());
        assert_eq!(tracker.active_loops(), 0);
        assert!(notifier.shown().is_empty());
        assert!(page.snapshot().banners.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracking_number_is_passed_through_unchanged() {
        let h = harness(true);
        h.tracker.start_polling(" A1 ").unwrap();
        settle().await;

        assert_eq!(h.tracker.current_tracking_number().as_deref(), Some(" A1 "));
        assert_eq!(h.api.last_tracking_number().as_deref(), Some(" A1 "));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_tracking_info_renders_and_notifies() {
        let h = harness(true);
        let rendered = h.tracker.update_tracking_info("A1B2C3D4").await.unwrap();

        assert_eq!(rendered.badge.text, "In Transit");
        assert_eq!(rendered.badge.class_name, "status-badge status-in_transit");
        assert_eq!(rendered.badges_updated, 2);
        assert_eq!(h.page.snapshot().timeline, rendered.timeline);

        let shown = h.notifier.shown();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, UPDATED_TITLE);
        assert_eq!(shown[0].body, UPDATED_MESSAGE);
        assert_eq!(h.page.snapshot().banners[0].title, UPDATED_TITLE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_tracking_info_returns_error() {
        let h = harness(true);
        h.api.set_failing(true);

        let err = h.tracker.update_tracking_info("A1B2C3D4").await.unwrap_err();
        assert!(matches!(err, AppError::NetworkConnection(_)));
        assert!(h.page.snapshot().banners.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeline_left_alone_without_events_or_container() {
        let h = harness(true);
        h.api.set_record(TrackingRecord::new("delivered"));
        let rendered = h.tracker.update_tracking_info("A1B2C3D4").await.unwrap();
        assert!(rendered.timeline.is_none());
        assert_eq!(h.page.snapshot().timeline.as_deref(), Some(""));

        let h = harness(false);
        let rendered = h.tracker.update_tracking_display(&record("collected")).unwrap();
        assert_eq!(rendered.badge.text, "Collected");
        assert!(rendered.timeline.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_blank_tracking_number() {
        let h = harness(true);
        let err = h.tracker.start_polling("   ").unwrap_err();
        assert!(matches!(err, AppError::InvalidTrackingNumber(_)));
        assert!(!h.tracker.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_rejected() {
        let h = harness(true);
        assert!(h.tracker.with_polling_interval(Duration::ZERO).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_waits_for_loop() {
        let h = harness(true);
        h.tracker.start_polling("A1B2C3D4").unwrap();
        h.tracker.shutdown().await;
        assert_eq!(h.tracker.active_loops(), 0);
        assert!(!h.tracker.is_polling());
    }
}
