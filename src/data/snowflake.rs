//! Snowflake warehouse connector (blocking HTTPS).
//!
//! Session flow:
//! 1. `POST /session/v1/login-request` with account/user/password; the
//!    warehouse, database and schema ride along as query parameters
//! 2. `POST /queries/v1/query-request` with the session token
//! 3. `GET` each result chunk listed in the response, if any
//! 4. `POST /session?delete=true` to end the session
//!
//! Large results come back as a first inline `rowset` plus presigned chunk
//! URLs. Chunks are fetched with the `chunkHeaders` from the response, or with
//! the SSE-C headers built from `qrmk` when no headers are given, and appended
//! in order.
//!
//! Snowflake upper-cases unquoted identifiers, so result columns usually come
//! back as `DS` / `Y`. Cells arrive as strings; `DATE` and `TIMESTAMP_*` cells
//! are epoch-based and converted to ISO text here so the normalizer only ever
//! sees calendar strings.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use reqwest::blocking::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::data::{Query, StoreConnection, StoreConnector};
use crate::domain::{RawRecord, RawResultSet, RawValue};
use crate::error::PipelineError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CLIENT_APP_ID: &str = "fin-forecast";
const SSE_C_ALGORITHM: &str = "x-amz-server-side-encryption-customer-algorithm";
const SSE_C_KEY: &str = "x-amz-server-side-encryption-customer-key";

pub struct SnowflakeConnector {
    client: Client,
    base_url: String,
    store: StoreConfig,
}

impl SnowflakeConnector {
    pub fn new(store: StoreConfig) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Connection(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url(&store.account),
            store,
        })
    }
}

impl StoreConnector for SnowflakeConnector {
    fn describe(&self) -> String {
        format!(
            "snowflake {}/{}.{} ({})",
            self.store.account, self.store.database, self.store.schema, self.store.warehouse
        )
    }

    fn connect(&self) -> Result<Box<dyn StoreConnection>, PipelineError> {
        let url = format!("{}/session/v1/login-request", self.base_url);
        let request_id = Uuid::new_v4().to_string();
        let body = LoginRequest {
            data: LoginData {
                client_app_id: CLIENT_APP_ID,
                client_app_version: env!("CARGO_PKG_VERSION"),
                account_name: account_name(&self.store.account),
                login_name: &self.store.user,
                password: self.store.password.expose_secret(),
            },
        };

        let resp = self
            .client
            .post(&url)
            .query(&[
                ("request_id", request_id.as_str()),
                ("warehouse", self.store.warehouse.as_str()),
                ("databaseName", self.store.database.as_str()),
                ("schemaName", self.store.schema.as_str()),
            ])
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .map_err(|e| PipelineError::Connection(format!("Login request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(PipelineError::Connection(format!(
                "Login failed with status {}.",
                resp.status()
            )));
        }

        let login: Envelope<LoginResponseData> = resp
            .json()
            .map_err(|e| PipelineError::Connection(format!("Failed to parse login response: {e}")))?;

        if !login.success {
            return Err(PipelineError::Connection(login.describe_failure("Login rejected")));
        }
        let token = login
            .data
            .and_then(|d| d.token)
            .ok_or_else(|| PipelineError::Connection("Login response carried no session token.".to_string()))?;

        debug!(account = %self.store.account, "snowflake session opened");
        Ok(Box::new(SnowflakeSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }))
    }
}

struct SnowflakeSession {
    client: Client,
    base_url: String,
    /// `None` once the session was deleted.
    token: Option<String>,
}

impl SnowflakeSession {
    fn auth_header(&self) -> Result<String, PipelineError> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| PipelineError::Connection("Session already closed.".to_string()))?;
        Ok(format!("Snowflake Token=\"{token}\""))
    }

    /// Chunk URLs are presigned, so only the chunk headers are sent.
    fn download_chunk(&self, chunk: &ChunkInfo, headers: &[(String, String)]) -> Result<String, PipelineError> {
        let mut req = self.client.get(&chunk.url);
        for (name, value) in headers {
            req = req.header(name.as_str(), value.as_str());
        }
        let resp = req
            .send()
            .map_err(|e| PipelineError::Connection(format!("Result chunk download failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(PipelineError::Query(format!(
                "Result chunk download failed with status {}.",
                resp.status()
            )));
        }
        resp.text()
            .map_err(|e| PipelineError::Query(format!("Failed to read result chunk: {e}")))
    }
}

impl StoreConnection for SnowflakeSession {
    fn execute(&mut self, query: &Query) -> Result<RawResultSet, PipelineError> {
        let url = format!("{}/queries/v1/query-request", self.base_url);
        let request_id = Uuid::new_v4().to_string();
        let body = QueryRequest {
            sql_text: query.sql(),
            async_exec: false,
            sequence_id: 1,
            query_submission_time: chrono::Utc::now().timestamp_millis(),
        };

        let resp = self
            .client
            .post(&url)
            .query(&[("requestId", request_id.as_str())])
            .header("Authorization", self.auth_header()?)
            .header("Accept", "application/snowflake")
            .json(&body)
            .send()
            .map_err(|e| PipelineError::Connection(format!("Query request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(PipelineError::Query(format!(
                "Query request failed with status {}.",
                resp.status()
            )));
        }

        let envelope: Envelope<QueryResponseData> = resp
            .json()
            .map_err(|e| PipelineError::Query(format!("Failed to parse query response: {e}")))?;

        decode_query_response(envelope, |chunk, headers| self.download_chunk(chunk, headers))
    }

    fn close(&mut self) -> Result<(), PipelineError> {
        if self.token.is_none() {
            return Ok(());
        }
        let url = format!("{}/session", self.base_url);
        let auth = self.auth_header()?;
        // The token is dropped even if the delete call fails; the server expires it.
        self.token = None;

        let resp = self
            .client
            .post(&url)
            .query(&[("delete", "true")])
            .header("Authorization", auth)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| PipelineError::Connection(format!("Session delete failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(PipelineError::Connection(format!(
                "Session delete failed with status {}.",
                resp.status()
            )));
        }
        debug!("snowflake session closed");
        Ok(())
    }
}

impl Drop for SnowflakeSession {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn base_url(account: &str) -> String {
    let account = account.trim().trim_end_matches('/');
    if account.starts_with("https://") || account.starts_with("http://") {
        return account.to_string();
    }
    if account.ends_with(".snowflakecomputing.com") {
        return format!("https://{account}");
    }
    format!("https://{account}.snowflakecomputing.com")
}

/// Account locator without region/cloud suffixes (`xy12345.eu-west-1` -> `xy12345`).
fn account_name(account: &str) -> &str {
    let account = account
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    account.split('.').next().unwrap_or(account)
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    data: LoginData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct LoginData<'a> {
    client_app_id: &'a str,
    client_app_version: &'a str,
    account_name: &'a str,
    login_name: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    sql_text: String,
    async_exec: bool,
    sequence_id: u64,
    query_submission_time: i64,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    success: bool,
    message: Option<String>,
    code: Option<String>,
}

impl<T> Envelope<T> {
    fn describe_failure(&self, what: &str) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(msg)) => format!("{what} ({code}): {msg}"),
            (None, Some(msg)) => format!("{what}: {msg}"),
            (Some(code), None) => format!("{what} ({code})."),
            (None, None) => format!("{what}."),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponseData {
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponseData {
    #[serde(default)]
    rowtype: Vec<ColumnType>,
    #[serde(default)]
    rowset: Vec<Vec<Option<String>>>,
    #[serde(default)]
    chunks: Vec<ChunkInfo>,
    #[serde(default, rename = "chunkHeaders")]
    chunk_headers: Option<BTreeMap<String, String>>,
    #[serde(default)]
    qrmk: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkInfo {
    url: String,
    #[serde(default, rename = "rowCount")]
    row_count: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ColumnType {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Decode a query response, pulling any remote chunks through `download`.
fn decode_query_response(
    envelope: Envelope<QueryResponseData>,
    mut download: impl FnMut(&ChunkInfo, &[(String, String)]) -> Result<String, PipelineError>,
) -> Result<RawResultSet, PipelineError> {
    if !envelope.success {
        return Err(PipelineError::Query(envelope.describe_failure("Query rejected")));
    }
    let mut data = envelope
        .data
        .ok_or_else(|| PipelineError::Query("Query response carried no data.".to_string()))?;

    if !data.chunks.is_empty() {
        let headers = chunk_request_headers(&data);
        debug!(chunks = data.chunks.len(), inline_rows = data.rowset.len(), "downloading result chunks");
        for (idx, chunk) in data.chunks.iter().enumerate() {
            let rows = parse_chunk_rows(&download(chunk, headers.as_slice())?)
                .map_err(|e| PipelineError::Query(format!("Result chunk {idx}: {e}")))?;
            if let Some(expected) = chunk.row_count.filter(|&n| n != rows.len()) {
                return Err(PipelineError::Query(format!(
                    "Result chunk {idx} holds {} row(s); the response announced {expected}.",
                    rows.len()
                )));
            }
            data.rowset.extend(rows);
        }
    }

    let columns: Vec<String> = data.rowtype.iter().map(|c| c.name.clone()).collect();
    let kinds: Vec<String> = data.rowtype.iter().map(|c| c.kind.to_ascii_lowercase()).collect();

    let rows: Vec<RawRecord> = data
        .rowset
        .into_iter()
        .map(|row| {
            row.into_iter()
                .enumerate()
                .map(|(idx, cell)| decode_cell(cell, kinds.get(idx).map(String::as_str)))
                .collect()
        })
        .collect();

    Ok(RawResultSet::new(columns, rows))
}

fn chunk_request_headers(data: &QueryResponseData) -> Vec<(String, String)> {
    if let Some(headers) = data.chunk_headers.as_ref().filter(|h| !h.is_empty()) {
        return headers.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    }
    match &data.qrmk {
        Some(key) => vec![
            (SSE_C_ALGORITHM.to_string(), "AES256".to_string()),
            (SSE_C_KEY.to_string(), key.clone()),
        ],
        None => Vec::new(),
    }
}

/// Chunk bodies are comma-separated JSON row arrays without the outer brackets.
fn parse_chunk_rows(body: &str) -> Result<Vec<Vec<Option<String>>>, String> {
    let body = body.trim().trim_end_matches(',');
    serde_json::from_str(&format!("[{body}]")).map_err(|e| format!("invalid row data: {e}"))
}

fn decode_cell(cell: Option<String>, kind: Option<&str>) -> RawValue {
    let Some(text) = cell else {
        return RawValue::Null;
    };
    match kind {
        Some("date") => epoch_days_to_iso(&text).map(RawValue::Text).unwrap_or(RawValue::Text(text)),
        Some("timestamp_ntz" | "timestamp_ltz" | "timestamp_tz") => {
            epoch_seconds_to_iso(&text).map(RawValue::Text).unwrap_or(RawValue::Text(text))
        }
        _ => RawValue::Text(text),
    }
}

fn epoch_days_to_iso(text: &str) -> Option<String> {
    let days: i64 = text.trim().parse().ok()?;
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    let date = epoch.checked_add_signed(chrono::Duration::days(days))?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// `TIMESTAMP_*` cells look like `"1672531200.000000000"`; `TIMESTAMP_TZ`
/// appends an offset index after a space, which we ignore (UTC).
fn epoch_seconds_to_iso(text: &str) -> Option<String> {
    let head = text.split_whitespace().next()?;
    let (whole, frac) = head.split_once('.').unwrap_or((head, "0"));
    let mut secs: i64 = whole.parse().ok()?;
    let mut nanos: u32 = format!("{frac:0<9}").get(..9)?.parse().ok()?;
    // "-1.5" is 1.5 s before the epoch: second -2 plus 0.5 s.
    if whole.starts_with('-') && nanos > 0 {
        secs -= 1;
        nanos = 1_000_000_000 - nanos;
    }
    let dt = DateTime::from_timestamp(secs, nanos)?;
    Some(dt.naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}
