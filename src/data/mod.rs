//! Fetcher: one read-only query against a tabular store.
//!
//! A run opens exactly one connection, executes the fixed
//! `SELECT <date_col>, <value_col> FROM <table> ORDER BY <date_col>` query and
//! closes the connection again on every exit path. There is no pooling and no
//! retry; a transient failure fails the run.

use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::domain::{RawResultSet, RunConfig, SourceKind};
use crate::error::PipelineError;

pub mod csv_table;
pub mod snowflake;
pub mod synthetic;

pub use csv_table::CsvTableConnector;
pub use snowflake::SnowflakeConnector;
pub use synthetic::{SyntheticConnector, SyntheticSpec};

/// An open connection to a store.
pub trait StoreConnection {
    /// Execute the query and return the full result set.
    fn execute(&mut self, query: &Query) -> Result<RawResultSet, PipelineError>;

    /// Release the connection. Called at most once by the fetcher.
    fn close(&mut self) -> Result<(), PipelineError>;
}

/// Something that can open connections to a store.
pub trait StoreConnector {
    /// Short human-readable description (for logs and the dashboard header).
    fn describe(&self) -> String;

    fn connect(&self) -> Result<Box<dyn StoreConnection>, PipelineError>;
}

/// The fixed two-column query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub table: String,
    pub date_col: String,
    pub value_col: String,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            table: "forecast_data".to_string(),
            date_col: "ds".to_string(),
            value_col: "y".to_string(),
        }
    }
}

impl Query {
    /// Build a query, rejecting anything that is not a plain (optionally
    /// dot-qualified) identifier.
    pub fn new(
        table: impl Into<String>,
        date_col: impl Into<String>,
        value_col: impl Into<String>,
    ) -> Result<Self, PipelineError> {
        let query = Self {
            table: table.into().trim().to_string(),
            date_col: date_col.into().trim().to_string(),
            value_col: value_col.into().trim().to_string(),
        };
        for (what, ident) in [
            ("table", &query.table),
            ("date column", &query.date_col),
            ("value column", &query.value_col),
        ] {
            if !is_valid_identifier(ident) {
                return Err(PipelineError::Query(format!("Invalid {what} identifier '{ident}'.")));
            }
        }
        Ok(query)
    }

    pub fn from_config(config: &RunConfig) -> Result<Self, PipelineError> {
        Self::new(&config.table, &config.date_col, &config.value_col)
    }

    pub fn sql(&self) -> String {
        format!(
            "SELECT {date}, {value} FROM {table} ORDER BY {date}",
            date = self.date_col,
            value = self.value_col,
            table = self.table
        )
    }
}

fn is_valid_identifier(s: &str) -> bool {
    if s.is_empty() {
        return false;
    }
    s.split('.').all(|part| {
        let mut chars = part.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    })
}

/// Closes the wrapped connection when dropped unless `close` was called.
struct ConnectionGuard {
    conn: Option<Box<dyn StoreConnection>>,
}

impl ConnectionGuard {
    fn new(conn: Box<dyn StoreConnection>) -> Self {
        Self { conn: Some(conn) }
    }

    fn execute(&mut self, query: &Query) -> Result<RawResultSet, PipelineError> {
        match self.conn.as_mut() {
            Some(conn) => conn.execute(query),
            None => Err(PipelineError::Connection("Connection already closed.".to_string())),
        }
    }

    fn close(mut self) -> Result<(), PipelineError> {
        match self.conn.take() {
            Some(mut conn) => conn.close(),
            None => Ok(()),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            if let Err(err) = conn.close() {
                warn!(error = %err, "failed to close store connection");
            }
        }
    }
}

/// Run the query once against `connector`.
pub fn fetch(connector: &dyn StoreConnector, query: &Query) -> Result<RawResultSet, PipelineError> {
    debug!(store = %connector.describe(), sql = %query.sql(), "opening store connection");
    let mut guard = ConnectionGuard::new(connector.connect()?);

    // On error the guard's Drop closes the connection before we return.
    let result = guard.execute(query)?;

    if let Err(err) = guard.close() {
        warn!(error = %err, "store connection did not close cleanly");
    }
    debug!(rows = result.len(), columns = ?result.columns, "store connection closed");
    Ok(result)
}

/// Build the connector selected by `config`.
///
/// Credentials are resolved here, before any connection is attempted, so a
/// missing secret surfaces as a configuration error.
pub fn connector_for(config: &RunConfig) -> Result<Box<dyn StoreConnector>, PipelineError> {
    match config.source {
        SourceKind::Snowflake => {
            let store = match &config.secrets_path {
                Some(path) => StoreConfig::from_secrets_file(path)?,
                None => StoreConfig::from_env()?,
            };
            Ok(Box::new(SnowflakeConnector::new(store)?))
        }
        SourceKind::Csv => {
            let path = config.csv_path.clone().ok_or_else(|| {
                PipelineError::Config("The csv source needs a file path (--csv <file>).".to_string())
            })?;
            Ok(Box::new(CsvTableConnector::new(path)))
        }
        SourceKind::Synthetic => Ok(Box::new(SyntheticConnector::new(SyntheticSpec {
            rows: config.synthetic_rows,
            frequency: config.frequency(),
            seed: config.seed,
        }))),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryStore;
    use super::*;
    use crate::domain::RawValue;

    #[test]
    fn default_query_matches_contract() {
        assert_eq!(Query::default().sql(), "SELECT ds, y FROM forecast_data ORDER BY ds");
    }

    #[test]
    fn identifiers_are_validated() {
        assert!(Query::new("finance.public.forecast_data", "DS", "Y").is_ok());
        assert!(Query::new("forecast_data; DROP TABLE x", "ds", "y").is_err());
        assert!(Query::new("forecast_data", "1ds", "y").is_err());
        assert!(Query::new("forecast_data", "ds", "").is_err());
        assert!(Query::new("t", "ds", "y -- comment").is_err());
    }

    #[test]
    fn fetch_closes_connection_on_success() {
        let store = MemoryStore::with_rows(&["ds", "y"], vec![vec![RawValue::from("2023-01-01"), 1.0.into()]]);
        let set = fetch(&store, &Query::default()).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(store.opened.get(), 1);
        assert_eq!(store.closed.get(), 1);
    }

    #[test]
    fn fetch_closes_connection_on_query_error() {
        let store = MemoryStore::with_result(Err(PipelineError::Query("no such table".to_string())));
        let err = fetch(&store, &Query::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Query(_)));
        assert_eq!(store.opened.get(), 1);
        assert_eq!(store.closed.get(), 1);
    }

    #[test]
    fn connect_failure_is_a_connection_error() {
        let mut store = MemoryStore::with_rows(&["ds", "y"], Vec::new());
        store.fail_connect = true;
        let err = fetch(&store, &Query::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Connection(_)));
        assert_eq!(store.closed.get(), 0);
    }

    #[test]
    fn csv_source_without_path_is_a_config_error() {
        let config = RunConfig {
            source: SourceKind::Csv,
            ..RunConfig::default()
        };
        let err = connector_for(&config).err().unwrap();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
