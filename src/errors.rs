use std::fmt;

/// Main error type for the sparrow-track client
#[derive(Debug)]
pub enum SparrowError {
    // Network and HTTP client errors
    NetworkTimeout,
    NetworkConnection(String),
    HttpClient(String),
    HttpStatus { status: u16, url: String },
    InvalidUrl(String),

    // Serialization and parsing errors
    JsonParsing(String),

    // Rendering errors
    Rendering(String),

    // Tracking errors
    InvalidTrackingNumber(String),
    Cancelled,

    // Notification errors
    NotificationDelivery(String),

    // Configuration and setup errors
    ConfigurationError(String),
    InvalidConfiguration(String),
}

impl fmt::Display for SparrowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SparrowError::NetworkTimeout => write!(f, "Network request timed out"),
            SparrowError::NetworkConnection(msg) => write!(f, "Network connection error: {}", msg),
            SparrowError::HttpClient(msg) => write!(f, "HTTP client error: {}", msg),
            SparrowError::HttpStatus { status, url } => {
                write!(f, "Unexpected HTTP status {} from {}", status, url)
            }
            SparrowError::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),

            SparrowError::JsonParsing(msg) => write!(f, "JSON parsing error: {}", msg),

            SparrowError::Rendering(msg) => write!(f, "Template rendering failed: {}", msg),

            SparrowError::InvalidTrackingNumber(id) => write!(f, "Invalid tracking number: '{}'", id),
            SparrowError::Cancelled => write!(f, "Request cancelled"),

            SparrowError::NotificationDelivery(msg) => write!(f, "Notification delivery failed: {}", msg),

            SparrowError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            SparrowError::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for SparrowError {}

// Convenience type alias for Results
pub type SparrowResult<T> = Result<T, SparrowError>;

impl From<reqwest::Error> for SparrowError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SparrowError::NetworkTimeout
        } else if err.is_connect() {
            SparrowError::NetworkConnection(err.to_string())
        } else if err.is_decode() {
            SparrowError::JsonParsing(err.to_string())
        } else if let Some(status) = err.status() {
            SparrowError::HttpStatus {
                status: status.as_u16(),
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            SparrowError::HttpClient(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SparrowError {
    fn from(err: serde_json::Error) -> Self {
        SparrowError::JsonParsing(err.to_string())
    }
}

impl From<askama::Error> for SparrowError {
    fn from(err: askama::Error) -> Self {
        SparrowError::Rendering(err.to_string())
    }
}

impl From<url::ParseError> for SparrowError {
    fn from(err: url::ParseError) -> Self {
        SparrowError::InvalidUrl(err.to_string())
    }
}

// Helper functions for creating common errors
impl SparrowError {
    pub fn http_status(status: u16, url: impl Into<String>) -> Self {
        SparrowError::HttpStatus {
            status,
            url: url.into(),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        SparrowError::InvalidConfiguration(msg.into())
    }

    pub fn invalid_tracking_number(id: impl Into<String>) -> Self {
        SparrowError::InvalidTrackingNumber(id.into())
    }
}
