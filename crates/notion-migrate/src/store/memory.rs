//! In-memory record store for testing.
//!
//! Records live in RAM and clones share the same data, so a test can hand a
//! clone to the uploader and inspect the original afterwards. Failure modes
//! of the real API (computed fields, rate limits, rejected records) can be
//! switched on per instance.

use serde_json::{json, Value};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use super::{Fields, RecordFilter, RecordStore, StoreError, StoredRecord};

/// In-memory store using `Rc<RefCell<>>` for shared interior mutability.
///
/// # Examples
///
/// ```
/// use notion_migrate::store::{Fields, InMemoryStore, RecordStore};
///
/// let store = InMemoryStore::new();
/// let mut fields = Fields::new();
/// fields.insert("Title".into(), "Valplan".into());
/// let record = store.create_record("DOCUMENT", fields).unwrap();
///
/// assert_eq!(store.records("DOCUMENT")[0].id, record.id);
/// ```
#[derive(Clone, Default)]
#[allow(dead_code)] // Public API used only in tests, not in binary
pub struct InMemoryStore {
    tables: Rc<RefCell<BTreeMap<String, Vec<StoredRecord>>>>,
    computed: Rc<RefCell<BTreeSet<String>>>,
    rejected_values: Rc<RefCell<Vec<String>>>,
    rate_limited: Rc<Cell<u32>>,
    strip_attachment_ids: Rc<Cell<bool>>,
    revoked_after: Rc<Cell<Option<u32>>>,
    next_id: Rc<Cell<u32>>,
    calls: Rc<Cell<u32>>,
}

#[allow(dead_code)] // Public API used only in tests, not in binary
impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes to `field` the way a formula field would.
    pub fn with_computed_field(self, field: &str) -> Self {
        self.computed.borrow_mut().insert(field.to_string());
        self
    }

    /// Reject any create whose field values contain `needle`.
    pub fn reject_values_containing(self, needle: &str) -> Self {
        self.rejected_values.borrow_mut().push(needle.to_string());
        self
    }

    /// Answer the next `count` calls with a rate-limit error.
    pub fn rate_limit_next(&self, count: u32) {
        self.rate_limited.set(count);
    }

    /// Return created attachments without ids.
    pub fn without_attachment_ids(self) -> Self {
        self.strip_attachment_ids.set(true);
        self
    }

    /// Answer every call after the first `calls` as unauthorized.
    pub fn revoke_after(self, calls: u32) -> Self {
        self.revoked_after.set(Some(calls));
        self
    }

    /// Insert a record directly, bypassing failure modes.
    pub fn seed(&self, table: &str, fields: Fields) -> String {
        let id = self.next_record_id();
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .push(StoredRecord {
                id: id.clone(),
                fields,
            });
        id
    }

    pub fn records(&self, table: &str) -> Vec<StoredRecord> {
        self.tables
            .borrow()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn record(&self, table: &str, id: &str) -> Option<StoredRecord> {
        self.records(table).into_iter().find(|r| r.id == id)
    }

    /// Number of store calls made, including failed ones.
    pub fn call_count(&self) -> u32 {
        self.calls.get()
    }

    fn next_record_id(&self) -> String {
        let n = self.next_id.get() + 1;
        self.next_id.set(n);
        format!("rec{:06}", n)
    }

    fn check(&self, fields: &Fields) -> Result<(), StoreError> {
        self.calls.set(self.calls.get() + 1);

        if self.revoked_after.get().is_some_and(|limit| self.calls.get() > limit) {
            return Err(StoreError::Unauthorized {
                message: "token revoked".to_string(),
            });
        }

        let pending = self.rate_limited.get();
        if pending > 0 {
            self.rate_limited.set(pending - 1);
            return Err(StoreError::RateLimited { retry_after: None });
        }

        if let Some(field) = fields
            .keys()
            .find(|name| self.computed.borrow().contains(name.as_str()))
        {
            return Err(StoreError::ComputedField {
                field: field.clone(),
            });
        }

        let rejected = self.rejected_values.borrow();
        for value in fields.values() {
            let text = value.to_string();
            if let Some(needle) = rejected.iter().find(|n| text.contains(n.as_str())) {
                return Err(StoreError::Rejected {
                    status: 422,
                    message: format!("value containing {} refused", needle),
                });
            }
        }

        Ok(())
    }

    /// Give every attachment object an id, as the real API does.
    fn store_attachments(&self, fields: &mut Fields, record_id: &str) {
        for value in fields.values_mut() {
            let Value::Array(items) = value else {
                continue;
            };
            for (idx, item) in items.iter_mut().enumerate() {
                let Value::Object(attachment) = item else {
                    continue;
                };
                if !attachment.contains_key("url") || attachment.contains_key("id") {
                    continue;
                }
                if !self.strip_attachment_ids.get() {
                    attachment.insert(
                        "id".to_string(),
                        json!(format!("att{}{}", &record_id[3..], idx)),
                    );
                }
            }
        }
    }
}

impl RecordStore for InMemoryStore {
    fn create_record(&self, table: &str, mut fields: Fields) -> Result<StoredRecord, StoreError> {
        self.check(&fields)?;
        let id = self.next_record_id();
        self.store_attachments(&mut fields, &id);
        let record = StoredRecord { id, fields };
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    fn update_record(
        &self,
        table: &str,
        record_id: &str,
        fields: Fields,
    ) -> Result<StoredRecord, StoreError> {
        self.check(&fields)?;
        let mut tables = self.tables.borrow_mut();
        let record = tables
            .get_mut(table)
            .and_then(|records| records.iter_mut().find(|r| r.id == record_id))
            .ok_or_else(|| StoreError::Rejected {
                status: 404,
                message: format!("record {} not found", record_id),
            })?;
        record.fields.extend(fields);
        Ok(record.clone())
    }

    fn find_records(
        &self,
        table: &str,
        filter: &RecordFilter,
    ) -> Result<Vec<StoredRecord>, StoreError> {
        self.check(&Fields::new())?;
        Ok(self
            .records(table)
            .into_iter()
            .filter(|record| filter.matches(record))
            .collect())
    }
}
