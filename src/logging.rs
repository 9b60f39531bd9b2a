//! Tracing subscriber setup.
//!
//! CLI runs log to stderr. The dashboard owns the terminal, so it logs to a
//! file with `--debug` and not at all otherwise.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::PipelineError;

/// Log file used by the dashboard in debug mode.
pub const TUI_LOG_FILE: &str = "forecast-debug.log";

/// Where log lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogSink {
    Stderr,
    /// [`TUI_LOG_FILE`] in the working directory.
    File,
    Off,
}

impl LogSink {
    pub fn for_dashboard(debug: bool) -> Self {
        if debug { LogSink::File } else { LogSink::Off }
    }
}

/// Default filter directives; `RUST_LOG` takes precedence.
pub fn default_directives(debug: bool) -> &'static str {
    if debug { "warn,fin_forecast=debug" } else { "warn" }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init(sink: LogSink, debug: bool) -> Result<(), PipelineError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directives(debug).into());

    let result = match sink {
        LogSink::Off => return Ok(()),
        LogSink::Stderr => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
        LogSink::File => {
            let file = File::create(Path::new(TUI_LOG_FILE)).map_err(|e| {
                PipelineError::Config(format!("Failed to create log file '{TUI_LOG_FILE}': {e}"))
            })?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .try_init()
        }
    };

    if let Err(err) = result {
        // Already installed (tests, repeated dispatch).
        tracing::debug!(error = %err, "tracing subscriber already set");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_raises_crate_level_only() {
        assert_eq!(default_directives(false), "warn");
        assert_eq!(default_directives(true), "warn,fin_forecast=debug");
    }

    #[test]
    fn dashboard_logs_only_with_debug() {
        assert_eq!(LogSink::for_dashboard(true), LogSink::File);
        assert_eq!(LogSink::for_dashboard(false), LogSink::Off);
    }

    #[test]
    fn off_sink_installs_nothing() {
        assert!(init(LogSink::Off, true).is_ok());
    }
}
