//! Logging setup for worker processes.
//!
//! Workers own stdout for the JSON-lines protocol, so every log line goes to
//! stderr. The filter comes from the command line, then `RUST_LOG`, then
//! defaults to `info`.

use std::sync::OnceLock;

use tracing_subscriber::{filter::ParseError, fmt, prelude::*, EnvFilter, Registry};

const DEFAULT_FILTER: &str = "info";

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}' (expected text or json)")),
        }
    }
}

/// Errors that may occur while initializing logging.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The filter directive could not be parsed.
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    /// Failed to set the global tracing subscriber.
    #[error("failed to install global tracing subscriber: {0}")]
    Install(String),
}

/// Install the global subscriber.
///
/// Subsequent calls are no-ops.
///
/// # Errors
/// - `LoggingError::Filter` if `filter` is not a valid directive
/// - `LoggingError::Install` if another subscriber is already global
pub fn init(filter: Option<&str>, format: LogFormat) -> Result<(), LoggingError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let env_filter = build_env_filter(filter)?;
    let result = match format {
        LogFormat::Text => Registry::default()
            .with(env_filter)
            .with(fmt::layer().with_ansi(false).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Json => Registry::default()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| LoggingError::Install(e.to_string()))?;
    let _ = INSTALLED.set(());
    Ok(())
}

fn build_env_filter(filter: Option<&str>) -> Result<EnvFilter, ParseError> {
    match filter {
        Some(directive) => EnvFilter::try_new(directive),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formats() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("text".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn rejects_bad_filter() {
        assert!(build_env_filter(Some("miner=notalevel")).is_err());
        assert!(build_env_filter(Some("miner_session=debug")).is_ok());
    }
}
