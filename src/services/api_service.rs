// src/services/api_service.rs
use async_trait::async_trait;
use reqwest::Url;
use std::time::Duration;
use tracing;

use crate::{
    errors::{SparrowError as AppError, SparrowResult},
    models::{
        notification::{NotificationItem, NotificationPage},
        tracking::TrackingRecord,
    },
};

/// Read side of the tracking backend.
#[async_trait]
pub trait TrackingApi: Send + Sync {
    /// `GET /api/public/track/{tracking_number}/`
    async fn fetch_tracking(&self, tracking_number: &str) -> Result<TrackingRecord, AppError>;

    /// `GET /api/notifications/`, flattened from either payload shape.
    async fn fetch_notifications(&self) -> Result<Vec<NotificationItem>, AppError>;
}

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    pub request_timeout: Option<Duration>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: None,
        }
    }
}

pub struct HttpTrackingApi {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpTrackingApi {
    pub fn new(settings: ApiSettings) -> SparrowResult<Self> {
        let base_url = Url::parse(&settings.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::InvalidUrl(format!("{} cannot be a base URL", settings.base_url)));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build()?;

        Ok(Self { base_url, client })
    }

    pub fn tracking_url(&self, tracking_number: &str) -> SparrowResult<Url> {
        self.endpoint(&["api", "public", "track", tracking_number])
    }

    pub fn notifications_url(&self) -> SparrowResult<Url> {
        self.endpoint(&["api", "notifications"])
    }

    // Segments are percent-encoded; the trailing slash matches the backend's routes.
    fn endpoint(&self, segments: &[&str]) -> SparrowResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| AppError::InvalidUrl(self.base_url.to_string()))?;
            path.pop_if_empty();
            path.extend(segments);
            path.push("");
        }
        Ok(url)
    }

    async fn get_json<T>(&self, url: Url) -> SparrowResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        tracing::debug!(url = %url, "GET");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::http_status(status.as_u16(), url.as_str()));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl TrackingApi for HttpTrackingApi {
    async fn fetch_tracking(&self, tracking_number: &str) -> Result<TrackingRecord, AppError> {
        let url = self.tracking_url(tracking_number)?;
        self.get_json(url).await
    }

    async fn fetch_notifications(&self) -> Result<Vec<NotificationItem>, AppError> {
        let url = self.notifications_url()?;
        let page: NotificationPage = self.get_json(url).await?;
        Ok(page.into_items())
    }
}
