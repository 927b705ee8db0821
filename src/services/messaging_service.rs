// src/services/messaging_service.rs
use async_trait::async_trait;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing;

use crate::{
    errors::{SparrowError as AppError, SparrowResult},
    services::{display_service::DisplaySurface, poll_loop},
    utils::{id_generator::generate_banner_id, markup::render_banner},
};

pub const DEFAULT_ICON: &str = "/static/tracking/images/logo.png";
pub const DEFAULT_BANNER_TTL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Push send failed: {0}")]
    PushFailed(String),

    #[error("Push endpoint rejected the notification with status {0}")]
    Rejected(u16),
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        AppError::NotificationDelivery(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub push_url: String,
    pub push_key: Option<String>,
    /// Bounds each push request; `None` leaves timing to the network stack.
    pub request_timeout: Option<Duration>,
}

/// Desktop notification permission, as the platform reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    Default, // Not asked yet
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
}

impl NotificationMessage {
    pub fn new(title: &str, body: &str) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            icon: None,
        }
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }
}

/// Native, OS-level notification channel.
#[async_trait]
pub trait DesktopNotifier: Send + Sync {
    fn permission(&self) -> PermissionState;

    /// Prompts for permission and returns the resulting state.
    async fn request_permission(&self) -> PermissionState;

    async fn show(&self, message: &NotificationMessage) -> Result<(), AppError>;
}

/// Delivers desktop notifications by POSTing them to a push gateway.
pub struct PushNotifier {
    config: PushConfig,
    client: reqwest::Client,
}

impl PushNotifier {
    pub fn new(config: PushConfig) -> SparrowResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl DesktopNotifier for PushNotifier {
    // Configuring a gateway is the operator's consent.
    fn permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn request_permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn show(&self, message: &NotificationMessage) -> Result<(), AppError> {
        tracing::debug!(url = %self.config.push_url, title = %message.title, "Sending push notification");

        let mut payload = json!({
            "title": message.title,
            "body": message.body,
        });
        if let Some(icon) = &message.icon {
            payload["icon"] = json!(icon);
        }

        let mut request = self.client.post(&self.config.push_url).json(&payload);
        if let Some(key) = &self.config.push_key {
            request = request.header("Authorization", format!("key={}", key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotificationError::PushFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!(status, body = %error_text, "Push request failed");
            return Err(NotificationError::Rejected(status).into());
        }

        tracing::debug!("Push notification sent successfully");
        Ok(())
    }
}

/// Logs notifications instead of delivering them. Used when no push gateway is configured.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl DesktopNotifier for LogNotifier {
    fn permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn request_permission(&self) -> PermissionState {
        PermissionState::Granted
    }

    async fn show(&self, message: &NotificationMessage) -> Result<(), AppError> {
        tracing::info!(title = %message.title, body = %message.body, "Desktop notification");
        Ok(())
    }
}

// Mock notifier for development and testing
#[derive(Debug)]
pub struct MockNotifier {
    permission: Mutex<PermissionState>,
    prompt_answer: PermissionState,
    fail_delivery: bool,
    delivery_delay: Duration,
    prompts: AtomicUsize,
    shown: Mutex<Vec<NotificationMessage>>,
}

impl MockNotifier {
    /// `prompt_answer` is what the user picks when asked for permission.
    pub fn new(permission: PermissionState, prompt_answer: PermissionState) -> Self {
        Self {
            permission: Mutex::new(permission),
            prompt_answer,
            fail_delivery: false,
            delivery_delay: Duration::ZERO,
            prompts: AtomicUsize::new(0),
            shown: Mutex::new(Vec::new()),
        }
    }

    pub fn granted() -> Self {
        Self::new(PermissionState::Granted, PermissionState::Granted)
    }

    pub fn failing(mut self) -> Self {
        self.fail_delivery = true;
        self
    }

    /// Makes every `show` take `delay` before it is delivered.
    pub fn slow(mut self, delay: Duration) -> Self {
        self.delivery_delay = delay;
        self
    }

    pub fn shown(&self) -> Vec<NotificationMessage> {
        self.shown.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DesktopNotifier for MockNotifier {
    fn permission(&self) -> PermissionState {
        self.permission.lock().map(|p| *p).unwrap_or(PermissionState::Denied)
    }

    async fn request_permission(&self) -> PermissionState {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut permission) = self.permission.lock() {
            *permission = self.prompt_answer;
        }
        tracing::info!("[MOCK] Permission prompt answered: {:?}", self.prompt_answer);
        self.prompt_answer
    }

    async fn show(&self, message: &NotificationMessage) -> Result<(), AppError> {
        if !self.delivery_delay.is_zero() {
            tokio::time::sleep(self.delivery_delay).await;
        }
        if self.fail_delivery {
            return Err(NotificationError::PushFailed("mock failure".to_string()).into());
        }
        tracing::info!("[MOCK] Would notify: {} - {}", message.title, message.body);
        if let Ok(mut shown) = self.shown.lock() {
            shown.push(message.clone());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub desktop_shown: bool,
    pub banner_id: String,
}

/// Raises one notification on both channels: desktop (permission allowing)
/// and an in-page banner that removes itself after `banner_ttl`.
pub struct NotificationDispatcher {
    notifier: Arc<dyn DesktopNotifier>,
    surface: Arc<dyn DisplaySurface>,
    banner_ttl: Duration,
    icon: String,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn DesktopNotifier>, surface: Arc<dyn DisplaySurface>) -> Self {
        Self {
            notifier,
            surface,
            banner_ttl: DEFAULT_BANNER_TTL,
            icon: DEFAULT_ICON.to_string(),
        }
    }

    pub fn with_banner_ttl(mut self, ttl: Duration) -> Self {
        self.banner_ttl = ttl;
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn surface(&self) -> &Arc<dyn DisplaySurface> {
        &self.surface
    }

    pub async fn show_notification(&self, title: &str, message: &str) -> DispatchOutcome {
        let desktop_shown = self.show_desktop(title, message).await;
        let banner_id = self.show_in_page(title, message);

        DispatchOutcome {
            desktop_shown,
            banner_id,
        }
    }

    /// Like `show_notification`, but gives up as soon as `cancel` fires. A
    /// cancelled dispatch shows no banner.
    pub async fn show_notification_until(
        &self,
        title: &str,
        message: &str,
        cancel: &CancellationToken,
    ) -> SparrowResult<DispatchOutcome> {
        let desktop_shown =
            poll_loop::until_cancelled(cancel, async { Ok(self.show_desktop(title, message).await) }).await?;
        let banner_id = self.show_in_page(title, message);

        Ok(DispatchOutcome {
            desktop_shown,
            banner_id,
        })
    }

    /// Asks for permission once at startup if it was never decided.
    pub async fn request_permission_if_default(&self) -> PermissionState {
        match self.notifier.permission() {
            PermissionState::Default => self.notifier.request_permission().await,
            decided => decided,
        }
    }

    async fn show_desktop(&self, title: &str, message: &str) -> bool {
        let permission = match self.notifier.permission() {
            PermissionState::Default => self.notifier.request_permission().await,
            decided => decided,
        };

        if permission != PermissionState::Granted {
            tracing::debug!(?permission, "Desktop notification skipped");
            return false;
        }

        let desktop = NotificationMessage::new(title, message).with_icon(self.icon.clone());
        match self.notifier.show(&desktop).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, title = %title, "Desktop notification failed");
                false
            }
        }
    }

    fn show_in_page(&self, title: &str, message: &str) -> String {
        let banner = render_banner(generate_banner_id(), title, message);
        let banner_id = banner.id.clone();
        self.surface.insert_banner(&banner);

        let surface = self.surface.clone();
        let ttl = self.banner_ttl;
        let id = banner_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if surface.remove_banner(&id) {
                tracing::debug!(banner_id = %id, "Banner expired");
            }
        });

        banner_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::display_service::PageSurface;

    fn dispatcher(notifier: Arc<MockNotifier>, page: Arc<PageSurface>) -> NotificationDispatcher {
        NotificationDispatcher::new(notifier, page)
    }

    #[tokio::test(start_paused = true)]
    async fn test_granted_shows_desktop_and_banner() {
        let notifier = Arc::new(MockNotifier::granted());
        let page = Arc::new(PageSurface::new(0, false, true));

        let outcome = dispatcher(notifier.clone(), page.clone())
            .show_notification("Tracking Updated", "Latest tracking information loaded")
            .await;

        assert!(outcome.desktop_shown);
        let shown = notifier.shown();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].icon.as_deref(), Some(DEFAULT_ICON));
        assert_eq!(notifier.prompt_count(), 0);

        let banners = page.snapshot().banners;
        assert_eq!(banners.len(), 1);
        assert_eq!(banners[0].id, outcome.banner_id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_permission_prompts_then_shows() {
        let notifier = Arc::new(MockNotifier::new(PermissionState::Default, PermissionState::Granted));
        let page = Arc::new(PageSurface::new(0, false, true));
        let dispatcher = dispatcher(notifier.clone(), page);

        assert!(dispatcher.show_notification("a", "b").await.desktop_shown);
        assert!(dispatcher.show_notification("c", "d").await.desktop_shown);
        assert_eq!(notifier.prompt_count(), 1);
        assert_eq!(notifier.shown().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_still_shows_banner() {
        let notifier = Arc::new(MockNotifier::new(PermissionState::Denied, PermissionState::Denied));
        let page = Arc::new(PageSurface::new(0, false, true));

        let outcome = dispatcher(notifier.clone(), page.clone()).show_notification("t", "m").await;

        assert!(!outcome.desktop_shown);
        assert_eq!(notifier.prompt_count(), 0);
        assert!(notifier.shown().is_empty());
        assert_eq!(page.snapshot().banners.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_declined_shows_only_banner() {
        let notifier = Arc::new(MockNotifier::new(PermissionState::Default, PermissionState::Denied));
        let page = Arc::new(PageSurface::new(0, false, true));

        let outcome = dispatcher(notifier.clone(), page.clone()).show_notification("t", "m").await;

        assert!(!outcome.desktop_shown);
        assert_eq!(notifier.prompt_count(), 1);
        assert_eq!(page.snapshot().banners.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_failure_keeps_banner() {
        let notifier = Arc::new(MockNotifier::granted().failing());
        let page = Arc::new(PageSurface::new(0, false, true));

        let outcome = dispatcher(notifier, page.clone()).show_notification("t", "m").await;

        assert!(!outcome.desktop_shown);
        assert_eq!(page.snapshot().banners.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_banner_expires_after_ttl() {
        let notifier = Arc::new(MockNotifier::granted());
        let page = Arc::new(PageSurface::new(0, false, true));
        let dispatcher = dispatcher(notifier, page.clone());

        dispatcher.show_notification("t", "m").await;
        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(page.snapshot().banners.len(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(page.snapshot().banners.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismissed_banner_expiry_is_harmless() {
        let notifier = Arc::new(MockNotifier::granted());
        let page = Arc::new(PageSurface::new(0, false, true));
        let dispatcher = dispatcher(notifier, page.clone()).with_banner_ttl(Duration::from_secs(1));

        let outcome = dispatcher.show_notification("t", "m").await;
        assert!(page.dismiss_banner(&outcome.banner_id));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(page.snapshot().banners.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_abandons_slow_delivery() {
        let notifier = Arc::new(MockNotifier::granted().slow(Duration::from_secs(60)));
        let page = Arc::new(PageSurface::new(0, false, true));
        let dispatcher = Arc::new(dispatcher(notifier.clone(), page.clone()));
        let cancel = CancellationToken::new();

        let pending = {
            let dispatcher = dispatcher.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { dispatcher.show_notification_until("t", "m", &cancel).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), pending).await.unwrap().unwrap();
        assert!(matches!(result, Err(AppError::Cancelled)));
        assert!(notifier.shown().is_empty());
        assert!(page.snapshot().banners.is_empty());
    }

    #[tokio::test]
    async fn test_request_permission_if_default() {
        let notifier = Arc::new(MockNotifier::new(PermissionState::Default, PermissionState::Denied));
        let page = Arc::new(PageSurface::new(0, false, false));
        let dispatcher = dispatcher(notifier.clone(), page);

        assert_eq!(dispatcher.request_permission_if_default().await, PermissionState::Denied);
        assert_eq!(dispatcher.request_permission_if_default().await, PermissionState::Denied);
        assert_eq!(notifier.prompt_count(), 1);
    }
}
