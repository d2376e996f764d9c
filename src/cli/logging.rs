//! Tracing subscriber setup
//!
//! `RUST_LOG` wins over `server.log_level`. With a log directory, a second
//! plain-text layer writes to `codeatease.log.<date>` through a non-blocking
//! writer whose guard must outlive the server.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::cli::{Error, LogFormat, Result};

pub const LOG_FILE_PREFIX: &str = "codeatease.log";

/// Build the level filter from `RUST_LOG`, falling back to `default_level`
pub fn env_filter(default_level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level)
            .map_err(|e| Error::Logging(format!("invalid log level '{}': {}", default_level, e))),
    }
}

/// Install the global subscriber
pub fn init(
    format: LogFormat,
    default_level: &str,
    log_dir: Option<&Path>,
) -> Result<Option<WorkerGuard>> {
    let console = match format {
        LogFormat::Pretty => fmt::layer().with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().boxed(),
    };

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(default_level)?)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_default_level_is_rejected() {
        std::env::remove_var("RUST_LOG");
        assert!(env_filter("info").is_ok());
        assert!(env_filter("codeatease=debug,tower_http=trace").is_ok());
        assert!(matches!(env_filter("codeatease=loud"), Err(Error::Logging(_))));
    }
}
