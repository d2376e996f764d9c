//! CodeAtEase: backend for a browser-based code editor
//!
//! The binary loads settings, installs logging and serves the HTTP API from
//! `codeatease-api` over the sync engine in `codeatease-core`.

pub mod cli;

use codeatease_api::ApiServer;
use codeatease_core::Settings;
use tracing::info;

use cli::{Args, Result};

/// Load settings with the command-line overrides applied
pub fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref())?;
    args.apply(&mut settings);
    Ok(settings)
}

/// Run the server until shutdown
pub async fn run(args: Args) -> Result<()> {
    let settings = load_settings(&args)?;
    if args.check_config {
        println!("{}", cli::summary(&settings));
        return Ok(());
    }

    let _guard = cli::logging::init(
        args.log_format,
        &settings.server.log_level,
        args.log_dir.as_deref(),
    )?;
    info!(
        "Starting CodeAtEase v{} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        settings.server.host,
        settings.server.port
    );

    let state = cli::build_state(&settings)?;
    ApiServer::new(state).start().await?;
    Ok(())
}
