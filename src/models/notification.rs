// src/models/notification.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NotificationItem {
    #[serde(default)]
    pub id: Option<i64>,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub parcel: Option<i64>, // Parcel primary key, when the notification concerns one
}

/// Body of `GET /api/notifications/`: either a bare list or a paginated wrapper.
///
/// Items stay raw until `into_items`, so one malformed entry cannot sink the page.
#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum NotificationPage {
    Paginated {
        results: Vec<serde_json::Value>,
        #[serde(default)]
        count: Option<u64>,
        #[serde(default)]
        next: Option<String>,
        #[serde(default)]
        previous: Option<String>,
    },
    List(Vec<serde_json::Value>),
}

impl NotificationPage {
    /// Decodes every entry on its own, dropping (and logging) the ones that do not fit.
    pub fn into_items(self) -> Vec<NotificationItem> {
        let raw = match self {
            NotificationPage::Paginated { results, .. } => results,
            NotificationPage::List(items) => items,
        };

        raw.into_iter()
            .enumerate()
            .filter_map(|(index, value)| match serde_json::from_value::<NotificationItem>(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(index, error = %e, "Skipping malformed notification");
                    None
                }
            })
            .collect()
    }
}

impl NotificationItem {
    /// Unread and created strictly after `since`.
    pub fn is_new_since(&self, since: DateTime<Utc>) -> bool {
        !self.is_read && self.created_at > since
    }
}
