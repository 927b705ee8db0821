// src/utils/markup.rs
//! Pure renderers. Each takes data and returns serialized markup; writing it
//! anywhere is the caller's job. Templates live under `templates/` and escape
//! every interpolated value.
use askama::Template;

use crate::errors::SparrowResult;
use crate::models::tracking::{TrackingEvent, TrackingRecord};
use crate::utils::formatting::{format_date_time, format_status};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusBadge {
    pub text: String,
    pub class_name: String,
}

/// Dismissible in-page notification.
#[derive(Template, Debug, Clone, PartialEq, Eq)]
#[template(path = "banner.html")]
pub struct Banner {
    pub id: String,
    pub title: String,
    pub message: String,
}

impl Banner {
    pub fn markup(&self) -> SparrowResult<String> {
        Ok(self.render()?)
    }
}

#[derive(Template, Debug)]
#[template(path = "timeline.html")]
struct TimelineTemplate<'a> {
    items: Vec<TimelineItem<'a>>,
}

#[derive(Debug)]
struct TimelineItem<'a> {
    status_update: &'a str,
    notes: &'a str,
    location: Option<&'a str>,
    timestamp: String,
    /// Image first, then signature.
    attachments: Vec<&'a str>,
}

pub fn render_status_badge(status: &str) -> StatusBadge {
    StatusBadge {
        text: format_status(status),
        class_name: format!("status-badge status-{}", status),
    }
}

pub fn render_record_badge(record: &TrackingRecord) -> StatusBadge {
    render_status_badge(&record.status)
}

pub fn render_timeline(events: &[TrackingEvent]) -> SparrowResult<String> {
    render_timeline_with(events, format_date_time)
}

/// Same as [`render_timeline`] with an explicit timestamp formatter.
pub fn render_timeline_with<F>(events: &[TrackingEvent], format_timestamp: F) -> SparrowResult<String>
where
    F: Fn(&str) -> String,
{
    let items = events
        .iter()
        .map(|event| TimelineItem {
            status_update: &event.status_update,
            notes: &event.notes,
            location: event.location.as_deref(),
            timestamp: format_timestamp(&event.timestamp),
            attachments: [&event.image, &event.signature]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .collect(),
        })
        .collect();

    Ok(TimelineTemplate { items }.render()?)
}

pub fn render_banner(id: impl Into<String>, title: &str, message: &str) -> Banner {
    Banner {
        id: id.into(),
        title: title.to_string(),
        message: message.to_string(),
    }
}
