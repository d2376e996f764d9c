//! CLI module
//!
//! Provides:
//! - Argument parsing
//! - Tracing subscriber setup
//! - Server state wiring from settings

pub mod args;
pub mod logging;
pub mod wiring;

// Re-exports
pub use args::{Args, LogFormat};
pub use wiring::{api_config, build_state, language_model, summary};

use codeatease_core::settings::SettingsError;
use codeatease_core::transport::TransportError;
use codeatease_core::SyncError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("HTTP client error: {0}")]
    Transport(#[from] TransportError),

    #[error("Startup error: {0}")]
    Startup(#[from] SyncError),

    #[error("Server error: {0}")]
    Server(#[from] anyhow::Error),
}

impl Error {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Settings(_) | Error::Logging(_) => EXIT_CONFIG_ERROR,
            _ => EXIT_FAILURE,
        }
    }
}

/// Exit codes (deterministic)
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_CONFIG_ERROR: i32 = 2;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, Error>;
