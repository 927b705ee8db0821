// src/state.rs
use std::sync::Arc;
use std::time::Duration;

use crate::{
    errors::{SparrowError, SparrowResult},
    services::{
        api_service::{ApiSettings, HttpTrackingApi, TrackingApi},
        display_service::DisplaySurface,
        messaging_service::{
            DesktopNotifier, LogNotifier, NotificationDispatcher, PermissionState, PushConfig, PushNotifier,
            DEFAULT_BANNER_TTL, DEFAULT_ICON,
        },
        notification_poller::{NotificationManager, DEFAULT_NOTIFICATION_INTERVAL},
        tracker_service::{RealTimeTracker, DEFAULT_TRACKING_INTERVAL},
    },
};

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base_url: String,
    pub tracking_poll_interval: Duration,
    pub notification_poll_interval: Duration,
    pub banner_ttl: Duration,
    pub request_timeout: Option<Duration>,
    pub push_url: Option<String>,
    pub push_key: Option<String>,
    pub notification_icon: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000".to_string(),
            tracking_poll_interval: DEFAULT_TRACKING_INTERVAL,
            notification_poll_interval: DEFAULT_NOTIFICATION_INTERVAL,
            banner_ttl: DEFAULT_BANNER_TTL,
            request_timeout: None,
            push_url: None,
            push_key: None,
            notification_icon: DEFAULT_ICON.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> SparrowResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset or blank keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> SparrowResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let config = Self {
            api_base_url: get("SPARROW_API_BASE_URL").unwrap_or(defaults.api_base_url),
            tracking_poll_interval: match get("SPARROW_TRACKING_POLL_SECS") {
                Some(raw) => parse_secs("SPARROW_TRACKING_POLL_SECS", &raw)?,
                None => defaults.tracking_poll_interval,
            },
            notification_poll_interval: match get("SPARROW_NOTIFICATION_POLL_SECS") {
                Some(raw) => parse_secs("SPARROW_NOTIFICATION_POLL_SECS", &raw)?,
                None => defaults.notification_poll_interval,
            },
            banner_ttl: match get("SPARROW_BANNER_TTL_SECS") {
                Some(raw) => parse_secs("SPARROW_BANNER_TTL_SECS", &raw)?,
                None => defaults.banner_ttl,
            },
            request_timeout: get("SPARROW_REQUEST_TIMEOUT_SECS")
                .map(|raw| parse_secs("SPARROW_REQUEST_TIMEOUT_SECS", &raw))
                .transpose()?,
            push_url: get("SPARROW_PUSH_URL"),
            push_key: get("SPARROW_PUSH_KEY"),
            notification_icon: get("SPARROW_NOTIFICATION_ICON").unwrap_or(defaults.notification_icon),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SparrowResult<()> {
        url::Url::parse(&self.api_base_url)
            .map_err(|e| SparrowError::invalid_config(format!("SPARROW_API_BASE_URL: {}", e)))?;
        if let Some(push_url) = &self.push_url {
            url::Url::parse(push_url)
                .map_err(|e| SparrowError::invalid_config(format!("SPARROW_PUSH_URL: {}", e)))?;
        }
        Ok(())
    }
}

fn parse_secs(key: &str, raw: &str) -> SparrowResult<Duration> {
    match raw.parse::<u64>() {
        Ok(0) => Err(SparrowError::invalid_config(format!("{} must be greater than zero", key))),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => Err(SparrowError::invalid_config(format!("{} is not a number of seconds: '{}'", key, raw))),
    }
}

/// Process-wide services: one tracker and one notification manager sharing a
/// single dispatcher, alive until `shutdown`.
pub struct AppState {
    pub tracker: RealTimeTracker,
    pub notification_manager: NotificationManager,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub surface: Arc<dyn DisplaySurface>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(config: AppConfig, surface: Arc<dyn DisplaySurface>) -> SparrowResult<Self> {
        let api: Arc<dyn TrackingApi> = Arc::new(HttpTrackingApi::new(ApiSettings {
            base_url: config.api_base_url.clone(),
            request_timeout: config.request_timeout,
        })?);

        let notifier: Arc<dyn DesktopNotifier> = match &config.push_url {
            Some(push_url) => Arc::new(PushNotifier::new(PushConfig {
                push_url: push_url.clone(),
                push_key: config.push_key.clone(),
                request_timeout: config.request_timeout,
            })?),
            None => {
                tracing::warn!("SPARROW_PUSH_URL not set, desktop notifications go to the log");
                Arc::new(LogNotifier)
            }
        };

        Self::with_services(config, api, notifier, surface)
    }

    pub fn with_services(
        config: AppConfig,
        api: Arc<dyn TrackingApi>,
        notifier: Arc<dyn DesktopNotifier>,
        surface: Arc<dyn DisplaySurface>,
    ) -> SparrowResult<Self> {
        let dispatcher = Arc::new(
            NotificationDispatcher::new(notifier, surface.clone())
                .with_banner_ttl(config.banner_ttl)
                .with_icon(config.notification_icon.clone()),
        );

        let tracker = RealTimeTracker::new(api.clone(), dispatcher.clone())
            .with_polling_interval(config.tracking_poll_interval)?;
        let notification_manager = NotificationManager::new(api, dispatcher.clone())
            .with_check_interval(config.notification_poll_interval)?;

        Ok(Self {
            tracker,
            notification_manager,
            dispatcher,
            surface,
            config,
        })
    }

    /// Page-load hook: starts notification polling for signed-in users and
    /// asks for desktop permission if it was never decided.
    /// Returns whether notification polling was started.
    pub async fn on_page_load(&self) -> bool {
        let authenticated = self.surface.is_user_authenticated();
        if authenticated {
            self.notification_manager.start_notification_polling();
        } else {
            tracing::debug!("No authenticated user, notification polling not started");
        }

        if self.dispatcher.request_permission_if_default().await == PermissionState::Denied {
            tracing::warn!("Desktop notifications denied; only in-page banners will be shown");
        }

        authenticated
    }

    pub async fn shutdown(&self) {
        self.tracker.shutdown().await;
        self.notification_manager.shutdown().await;
        tracing::info!("Pollers stopped");
    }
}
