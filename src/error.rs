use thiserror::Error;

use crate::app::pipeline::Stage;

/// Binary-facing error: a message for the user plus the process exit code.
///
/// Exit codes:
/// - 2: configuration / input problems (bad flags, missing secrets, export path)
/// - 3: the data itself is unusable (schema mismatch, nothing left after normalization)
/// - 4: an external collaborator failed (store, model fit, terminal)
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Failures of a single pipeline run.
///
/// Every variant is terminal for the run: later stages never execute.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to connect to the warehouse: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Schema error: expected fields {expected:?}, found {found:?}")]
    Schema {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("No valid rows remain after normalization ({rows_read} row(s) read).")]
    EmptySeries { rows_read: usize },

    #[error("Forecast failed: {0}")]
    Forecast(String),

    #[error("Export failed: {0}")]
    Export(String),
}

impl PipelineError {
    /// The stage this failure belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Config(_) | PipelineError::Connection(_) | PipelineError::Query(_) => {
                Stage::Fetching
            }
            PipelineError::Schema { .. } | PipelineError::EmptySeries { .. } => Stage::Normalizing,
            PipelineError::Forecast(_) => Stage::Forecasting,
            PipelineError::Export(_) => Stage::Presenting,
        }
    }

    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Config(_) | PipelineError::Export(_) => 2,
            PipelineError::Schema { .. } | PipelineError::EmptySeries { .. } => 3,
            PipelineError::Connection(_) | PipelineError::Query(_) | PipelineError::Forecast(_) => 4,
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_lists_found_and_expected_fields() {
        let err = PipelineError::Schema {
            expected: vec!["ds".to_string(), "y".to_string()],
            found: vec!["date".to_string(), "amount".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("\"ds\""));
        assert!(msg.contains("\"amount\""));
        assert_eq!(err.stage(), Stage::Normalizing);
    }

    #[test]
    fn pipeline_errors_map_to_exit_codes() {
        let app: AppError = PipelineError::EmptySeries { rows_read: 0 }.into();
        assert_eq!(app.exit_code(), 3);
        let app: AppError = PipelineError::Connection("refused".to_string()).into();
        assert_eq!(app.exit_code(), 4);
        assert!(app.message().contains("refused"));
    }
}
