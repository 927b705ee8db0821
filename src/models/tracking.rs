// src/models/tracking.rs
use serde::{Deserialize, Deserializer, Serialize};

/// Parcel snapshot served by the public tracking endpoint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrackingRecord {
    pub status: String,
    // Absent means "leave the timeline alone"; an empty list still re-renders it.
    #[serde(default)]
    pub tracking_events: Option<Vec<TrackingEvent>>,

    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub pickup_address: Option<String>,
    #[serde(default)]
    pub delivery_address: Option<String>,
    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub booked_at: Option<String>,
    #[serde(default)]
    pub expected_delivery_date: Option<String>,
    #[serde(default)]
    pub driver_latitude: Option<f64>,
    #[serde(default)]
    pub driver_longitude: Option<f64>,
}

/// One entry in a parcel's status history. Values are display strings and are
/// rendered in server order.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrackingEvent {
    #[serde(default)]
    pub id: Option<i64>,
    pub status_update: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub notes: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub location: Option<String>,
    pub timestamp: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub image: Option<String>,      // URL
    #[serde(default, deserialize_with = "blank_as_none")]
    pub signature: Option<String>,  // URL
    #[serde(default)]
    pub created_by_name: Option<String>,
}

impl TrackingRecord {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            tracking_events: None,
            tracking_number: None,
            pickup_address: None,
            delivery_address: None,
            recipient_name: None,
            booked_at: None,
            expected_delivery_date: None,
            driver_latitude: None,
            driver_longitude: None,
        }
    }

    pub fn with_events(mut self, events: Vec<TrackingEvent>) -> Self {
        self.tracking_events = Some(events);
        self
    }
}

impl TrackingEvent {
    pub fn new(status_update: impl Into<String>, timestamp: impl Into<String>) -> Self {
        Self {
            id: None,
            status_update: status_update.into(),
            notes: String::new(),
            location: None,
            timestamp: timestamp.into(),
            image: None,
            signature: None,
            created_by_name: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image = Some(url.into());
        self
    }

    pub fn with_signature(mut self, url: impl Into<String>) -> Self {
        self.signature = Some(url.into());
        self
    }
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
