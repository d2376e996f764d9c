//! CLI argument parsing
//!
//! Every flag is optional; anything left unset comes from the layered
//! settings (defaults, `codeatease.toml`, `CODEATEASE__*` variables).

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use codeatease_core::Settings;

/// Parsed CLI arguments
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "codeatease",
    version,
    about = "Backend for the CodeAtEase browser editor"
)]
pub struct Args {
    /// Configuration file (default: ./codeatease.toml when present)
    #[arg(long, short = 'c', value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Listen address, overrides server.host
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port, overrides server.port
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Console log format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Also write daily-rotated logs into this directory
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Load and validate the configuration, print a summary and exit
    #[arg(long)]
    pub check_config: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Args {
    /// Apply command-line overrides on top of loaded settings
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}
