//! Warehouse connection settings.
//!
//! Credentials are loaded once, up front, into an explicit `StoreConfig` that is
//! handed to the connector. Two sources are supported:
//!
//! - a secrets TOML file with a `[snowflake]` table
//! - `SNOWFLAKE_*` environment variables (a `.env` file is loaded first)
//!
//! Every key is required. Missing keys are all reported together, before any
//! connection is attempted.

use std::collections::BTreeMap;
use std::path::Path;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::PipelineError;

const ENV_PREFIX: &str = "SNOWFLAKE_";

/// Keys in the order they are reported when missing.
pub const REQUIRED_KEYS: [&str; 6] = ["account", "user", "password", "warehouse", "database", "schema"];

/// Resolved store connection descriptor.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub account: String,
    pub user: String,
    pub password: SecretString,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
}

#[derive(Debug, Deserialize)]
struct SecretsFile {
    snowflake: Option<BTreeMap<String, toml::Value>>,
}

impl StoreConfig {
    /// Load from `.env` + process environment.
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| {
            std::env::var(format!("{ENV_PREFIX}{}", key.to_ascii_uppercase())).ok()
        })
    }

    /// Load from a secrets TOML file (`[snowflake]` table).
    pub fn from_secrets_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read secrets file '{}': {e}", path.display()))
        })?;
        Self::from_secrets_toml(&text)
    }

    pub fn from_secrets_toml(text: &str) -> Result<Self, PipelineError> {
        let file: SecretsFile = toml::from_str(text)
            .map_err(|e| PipelineError::Config(format!("Invalid secrets file: {e}")))?;
        let table = file
            .snowflake
            .ok_or_else(|| PipelineError::Config("Secrets file has no [snowflake] table.".to_string()))?;

        Self::from_lookup(|key| match table.get(key)? {
            toml::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
    }

    /// Build from any key lookup; empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let mut values = BTreeMap::new();
        let mut missing = Vec::new();
        for key in REQUIRED_KEYS {
            match lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty()) {
                Some(v) => {
                    values.insert(key, v);
                }
                None => missing.push(key),
            }
        }

        if !missing.is_empty() {
            return Err(PipelineError::Config(format!(
                "Missing warehouse setting(s): {}.",
                missing.join(", ")
            )));
        }

        let mut take = |key: &str| values.remove(key).unwrap_or_default();
        Ok(Self {
            account: take("account"),
            user: take("user"),
            password: SecretString::from(take("password")),
            warehouse: take("warehouse"),
            database: take("database"),
            schema: take("schema"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const FULL: &str = r#"
[snowflake]
account = "xy12345.eu-west-1"
user = "analyst"
password = "hunter2"
warehouse = "COMPUTE_WH"
database = "FINANCE"
schema = "PUBLIC"
"#;

    #[test]
    fn secrets_toml_loads_all_keys() {
        let cfg = StoreConfig::from_secrets_toml(FULL).unwrap();
        assert_eq!(cfg.account, "xy12345.eu-west-1");
        assert_eq!(cfg.schema, "PUBLIC");
        assert_eq!(cfg.password.expose_secret(), "hunter2");
    }

    #[test]
    fn debug_output_redacts_password() {
        let cfg = StoreConfig::from_secrets_toml(FULL).unwrap();
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("hunter2"));
    }

    #[test]
    fn all_missing_keys_are_reported() {
        let err = StoreConfig::from_lookup(|key| match key {
            "account" => Some("acct".to_string()),
            "user" => Some("  ".to_string()),
            _ => None,
        })
        .unwrap_err();
        let msg = err.to_string();
        for key in ["user", "password", "warehouse", "database", "schema"] {
            assert!(msg.contains(key), "missing {key} in: {msg}");
        }
        assert!(!msg.contains("account"));
    }

    #[test]
    fn secrets_without_table_is_a_config_error() {
        let err = StoreConfig::from_secrets_toml("[other]\nkey = 1\n").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
