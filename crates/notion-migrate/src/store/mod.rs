//! Remote record store abstraction.
//!
//! The migrator only needs three operations from the destination: create a
//! record, update a record and find records by a filter. [`AirtableStore`]
//! implements them against the Airtable REST API; [`InMemoryStore`] keeps
//! records in memory for tests. [`PacedStore`] wraps either one with the
//! call delay and rate-limit retries.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub mod airtable;
pub mod memory;
pub mod paced;

pub use airtable::AirtableStore;
pub use memory::InMemoryStore;
pub use paced::PacedStore;

/// Field name to value, as sent to and returned by the store
pub type Fields = serde_json::Map<String, Value>;

/// A record as returned by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
}

impl StoredRecord {
    /// Id of the first attachment stored in `field`.
    pub fn attachment_id(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)?
            .as_array()?
            .first()?
            .get("id")?
            .as_str()
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.fields.get(field)?.as_str()
    }
}

/// Record filter understood by every store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    /// Text field value begins with `prefix`
    StartsWith { field: String, prefix: String },
}

impl RecordFilter {
    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        RecordFilter::StartsWith {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    /// Airtable formula for this filter.
    pub fn to_formula(&self) -> String {
        match self {
            RecordFilter::StartsWith { field, prefix } => format!(
                "SEARCH('{}', {{{}}}) = 1",
                prefix.replace('\\', "\\\\").replace('\'', "\\'"),
                field
            ),
        }
    }

    pub fn matches(&self, record: &StoredRecord) -> bool {
        match self {
            RecordFilter::StartsWith { field, prefix } => record
                .text(field)
                .is_some_and(|value| value.starts_with(prefix.as_str())),
        }
    }
}

/// Errors returned by a [`RecordStore`]
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The field is computed (formula, lookup, created time) and read-only
    #[error("field {field} is computed and cannot be written")]
    ComputedField { field: String },

    #[error("unknown field name {field}")]
    UnknownField { field: String },

    #[error("not authorized: {message}")]
    Unauthorized { message: String },

    /// Base or table does not exist
    #[error("not found: {message}")]
    NotFound { message: String },

    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    /// The store refused this one record
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// Fatal errors would repeat for every following item, so they abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::ComputedField { .. }
                | StoreError::UnknownField { .. }
                | StoreError::Unauthorized { .. }
                | StoreError::NotFound { .. }
        )
    }
}

/// Destination of the migration.
///
/// Methods take `&self`; implementations needing mutation use interior
/// mutability so one store can be shared by the upload and import stages.
pub trait RecordStore {
    /// Create one record and return it as stored, including generated
    /// attachment ids.
    fn create_record(&self, table: &str, fields: Fields) -> Result<StoredRecord, StoreError>;

    /// Overwrite the given fields of an existing record.
    fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> Result<StoredRecord, StoreError>;

    fn find_records(
        &self,
        table: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<StoredRecord>, StoreError>;
}

impl<S: RecordStore + ?Sized> RecordStore for &S {
    fn create_record(&self, table: &str, fields: Fields) -> Result<StoredRecord, StoreError> {
        (**self).create_record(table, fields)
    }

    fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> Result<StoredRecord, StoreError> {
        (**self).update_record(table, record_id, fields)
    }

    fn find_records(
        &self,
        table: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        (**self).find_records(table, filter)
    }
}
