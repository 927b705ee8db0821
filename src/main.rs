use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use sparrow_track::{
    logging::init_logging,
    services::display_service::StdoutSurface,
    state::{AppConfig, AppState},
    SparrowResult,
};

/// Follow a parcel: poll its tracking record and print status, timeline and notifications.
#[derive(Debug, Parser)]
#[command(name = "sparrow-track", version)]
struct Cli {
    /// Tracking number of the parcel to follow
    tracking_number: String,

    /// API base URL (overrides SPARROW_API_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Also poll the signed-in user's notifications
    #[arg(long)]
    authenticated: bool,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.quiet) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "sparrow-track failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> SparrowResult<()> {
    let mut config = AppConfig::from_env()?;
    if let Some(base_url) = cli.base_url {
        config.api_base_url = base_url;
        config.validate()?;
    }

    let surface = Arc::new(StdoutSurface::new(cli.authenticated));
    let app_state = AppState::new(config, surface)?;

    app_state.on_page_load().await;
    app_state.tracker.start_polling(&cli.tracking_number)?;

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C, shutting down");
    }

    app_state.shutdown().await;
    Ok(())
}
