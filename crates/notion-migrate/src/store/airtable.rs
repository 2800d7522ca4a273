//! Airtable REST API client.

use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;
use ureq::http::Response;
use ureq::typestate::WithBody;
use ureq::{Agent, Body, RequestBuilder};

use super::{Fields, RecordFilter, RecordStore, StoreError, StoredRecord};

static QUOTED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("valid quoted name pattern"));

/// Blocking Airtable client with one connection pool.
pub struct AirtableStore {
    agent: Agent,
    api_url: String,
    base_id: String,
    api_key: String,
}

impl fmt::Debug for AirtableStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AirtableStore")
            .field("api_url", &self.api_url)
            .field("base_id", &self.base_id)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct RecordPage {
    #[serde(default)]
    records: Vec<StoredRecord>,
    offset: Option<String>,
}

impl AirtableStore {
    pub fn new(api_url: &str, base_id: &str, api_key: &str, timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: Agent::new_with_config(config),
            api_url: api_url.trim_end_matches('/').to_string(),
            base_id: base_id.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!(
            "{}/{}/{}",
            self.api_url,
            self.base_id,
            urlencoding::encode(table)
        )
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    fn write(
        &self,
        request: RequestBuilder<WithBody>,
        fields: Fields,
    ) -> Result<StoredRecord, StoreError> {
        let body = json!({ "fields": fields, "typecast": true }).to_string();
        let bearer = self.bearer();
        let response = request
            .header("Authorization", bearer.as_str())
            .header("Content-Type", "application/json")
            .send(body.as_str());

        let value = read_json(response)?;
        serde_json::from_value(value)
            .map_err(|e| StoreError::Transport(format!("unexpected record payload: {}", e)))
    }
}

impl RecordStore for AirtableStore {
    fn create_record(&self, table: &str, fields: Fields) -> Result<StoredRecord, StoreError> {
        let url = self.table_url(table);
        debug!(table, "create record");
        self.write(self.agent.post(&url), fields)
    }

    fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> Result<StoredRecord, StoreError> {
        let url = format!("{}/{}", self.table_url(table), record_id);
        debug!(table, record_id, "update record");
        self.write(self.agent.patch(&url), fields)
    }

    fn find_records(
        &self,
        table: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        let url = self.table_url(table);
        let formula = filter.to_formula();
        let bearer = self.bearer();
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut request = self
                .agent
                .get(&url)
                .header("Authorization", bearer.as_str())
                .query("filterByFormula", &formula);
            if let Some(offset) = &offset {
                request = request.query("offset", offset);
            }
            debug!(table, formula = %formula, "find records");

            let page: RecordPage = serde_json::from_value(read_json(request.call())?)
                .map_err(|e| StoreError::Transport(format!("unexpected list payload: {}", e)))?;
            records.extend(page.records);
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(records)
    }
}

/// Read a response body as JSON, classifying non-success statuses.
fn read_json(response: Result<Response<Body>, ureq::Error>) -> Result<Value, StoreError> {
    let mut response = response.map_err(|e| StoreError::Transport(e.to_string()))?;
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response
        .body_mut()
        .read_to_string()
        .map_err(|e| StoreError::Transport(e.to_string()))?;

    if (200..300).contains(&status) {
        serde_json::from_str(&body)
            .map_err(|e| StoreError::Transport(format!("invalid JSON response: {}", e)))
    } else {
        Err(classify_error(status, &body, retry_after.as_deref()))
    }
}

/// Map an Airtable error response to a [`StoreError`].
///
/// Error bodies look like `{"error": {"type": "...", "message": "..."}}`;
/// some endpoints send `{"error": "NOT_FOUND"}` instead.
pub fn classify_error(status: u16, body: &str, retry_after: Option<&str>) -> StoreError {
    let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    let error = &parsed["error"];
    let kind = error["type"]
        .as_str()
        .or_else(|| error.as_str())
        .unwrap_or_default()
        .to_string();
    let message = error["message"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| if kind.is_empty() { body.trim().to_string() } else { kind.clone() });

    match status {
        429 => StoreError::RateLimited {
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        },
        401 | 403 => StoreError::Unauthorized { message },
        404 => StoreError::NotFound { message },
        _ if kind.contains("NOT_FOUND") => StoreError::NotFound { message },
        _ if kind == "UNKNOWN_FIELD_NAME" => StoreError::UnknownField {
            field: quoted_name(&message),
        },
        422 if message.to_lowercase().contains("computed") => StoreError::ComputedField {
            field: quoted_name(&message),
        },
        _ => StoreError::Rejected { status, message },
    }
}

fn quoted_name(message: &str) -> String {
    QUOTED_NAME
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| message.to_string())
}
