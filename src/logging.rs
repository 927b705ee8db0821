// src/logging.rs
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::errors::{SparrowError, SparrowResult};

/// Initialize logging to stderr. A valid `RUST_LOG` replaces the crate
/// default; otherwise `quiet` picks errors only over info.
pub fn init_logging(quiet: bool) -> SparrowResult<()> {
    let filter = build_filter(quiet, std::env::var("RUST_LOG").ok().as_deref());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init()
        .map_err(|e| SparrowError::ConfigurationError(format!("logging already initialised: {}", e)))
}

fn build_filter(quiet: bool, rust_log: Option<&str>) -> EnvFilter {
    if let Some(filter) = rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
    {
        return filter;
    }

    EnvFilter::new(if quiet { "sparrow_track=error" } else { "sparrow_track=info" })
}
