pub mod errors;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

// Re-export commonly used types
pub use errors::{SparrowError, SparrowResult};
pub use services::{
    api_service::{ApiSettings, HttpTrackingApi, TrackingApi},
    display_service::{DisplaySurface, PageSurface, StdoutSurface},
    messaging_service::{DesktopNotifier, NotificationDispatcher, PermissionState},
    notification_poller::NotificationManager,
    tracker_service::{RealTimeTracker, RenderedTracking, update_tracking_display},
};
pub use state::{AppConfig, AppState};
