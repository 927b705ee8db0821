// src/services/test_support.rs
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::{
    errors::SparrowError as AppError,
    models::{notification::NotificationItem, tracking::TrackingRecord},
    services::api_service::TrackingApi,
};

/// In-memory backend with switchable failures and latency.
pub(crate) struct FakeApi {
    record: Mutex<TrackingRecord>,
    notifications: Mutex<Vec<NotificationItem>>,
    fail: AtomicBool,
    delay: Mutex<Duration>,
    tracking_calls: AtomicUsize,
    notification_calls: AtomicUsize,
    last_tracking_number: Mutex<Option<String>>,
}

impl FakeApi {
    pub fn new(record: TrackingRecord) -> Self {
        Self {
            record: Mutex::new(record),
            notifications: Mutex::new(Vec::new()),
            fail: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            tracking_calls: AtomicUsize::new(0),
            notification_calls: AtomicUsize::new(0),
            last_tracking_number: Mutex::new(None),
        }
    }

    pub fn set_record(&self, record: TrackingRecord) {
        *self.record.lock().unwrap() = record;
    }

    pub fn set_notifications(&self, items: Vec<NotificationItem>) {
        *self.notifications.lock().unwrap() = items;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn tracking_calls(&self) -> usize {
        self.tracking_calls.load(Ordering::SeqCst)
    }

    pub fn notification_calls(&self) -> usize {
        self.notification_calls.load(Ordering::SeqCst)
    }

    pub fn last_tracking_number(&self) -> Option<String> {
        self.last_tracking_number.lock().unwrap().clone()
    }

    async fn respond<T>(&self, value: T) -> Result<T, AppError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::NetworkConnection("connection refused".to_string()));
        }
        Ok(value)
    }
}

#[async_trait]
impl TrackingApi for FakeApi {
    async fn fetch_tracking(&self, tracking_number: &str) -> Result<TrackingRecord, AppError> {
        self.tracking_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_tracking_number.lock().unwrap() = Some(tracking_number.to_string());
        let record = self.record.lock().unwrap().clone();
        self.respond(record).await
    }

    async fn fetch_notifications(&self) -> Result<Vec<NotificationItem>, AppError> {
        self.notification_calls.fetch_add(1, Ordering::SeqCst);
        let items = self.notifications.lock().unwrap().clone();
        self.respond(items).await
    }
}
