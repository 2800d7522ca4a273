//! Attach mode: add images to documents imported without them.
//!
//! Exported images carry the first 8 hex characters of their page's Notion
//! id as filename prefix. For every prefix the document whose source id
//! starts with it is looked up, its images are uploaded, and one pointer line
//! per image is appended to the document content.

use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use crate::config::MigrateConfig;
use crate::errors::MigrateError;
use crate::report::{RunReport, Stage};
use crate::store::{Fields, RecordFilter, RecordStore};
use crate::upload::AssetUploader;

static IMAGE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-f0-9]{8})_").expect("valid image prefix pattern"));

/// Group image filenames by their Notion id prefix; others are dropped.
pub fn group_by_prefix(filenames: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in filenames {
        if let Some(caps) = IMAGE_PREFIX.captures(name) {
            groups
                .entry(caps[1].to_string())
                .or_default()
                .push(name.clone());
        }
    }
    groups
}

/// Append pointer lines to existing content, one per line.
pub fn append_pointers(content: &str, pointers: &[String]) -> String {
    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&pointers.join("\n"));
    out
}

pub struct Attacher<'a, S: RecordStore> {
    store: &'a S,
    config: &'a MigrateConfig,
    uploader: AssetUploader<'a, S>,
}

impl<'a, S: RecordStore> Attacher<'a, S> {
    pub fn new(store: &'a S, config: &'a MigrateConfig, uploader: AssetUploader<'a, S>) -> Self {
        Self {
            store,
            config,
            uploader,
        }
    }

    pub fn attach(&self, filenames: &[String], report: &mut RunReport) -> Result<(), MigrateError> {
        let fields = &self.config.airtable.document_fields;
        let source_field = fields
            .source_id
            .as_deref()
            .ok_or_else(|| MigrateError::MissingSetting {
                setting: "airtable.document_fields.source_id".to_string(),
            })?;
        let table = &self.config.airtable.document_table;

        let groups = group_by_prefix(filenames);
        info!(documents = groups.len(), images = filenames.len(), "attaching images");
        if let Some(first) = filenames.first() {
            self.uploader.check_host(first, report);
        }

        for (prefix, images) in &groups {
            let filter = RecordFilter::starts_with(source_field, prefix.as_str());
            let found = match self.store.find_records(table, &filter) {
                Ok(found) => found,
                Err(e) if e.is_fatal() => return Err(MigrateError::Destination(e)),
                Err(e) => {
                    warn!(prefix = %prefix, error = %e, "document lookup failed");
                    report.documents.failed += 1;
                    report.fail(Stage::Attach, prefix.as_str(), e);
                    continue;
                }
            };

            let Some(document) = found.first() else {
                debug!(prefix = %prefix, "no document record for prefix");
                report.not_found.push(prefix.clone());
                continue;
            };
            if found.len() > 1 {
                warn!(prefix = %prefix, matches = found.len(), chosen = %document.id, "several documents share a prefix");
            }

            let assets = self.uploader.upload(images, report)?;
            if assets.is_empty() {
                continue;
            }
            let pointers: Vec<String> = images
                .iter()
                .filter_map(|name| assets.get(name))
                .map(|asset| asset.pointer(&asset.caption))
                .collect();

            let current = document.text(&fields.content).unwrap_or_default();
            let mut update = Fields::new();
            update.insert(
                fields.content.clone(),
                Value::String(append_pointers(current, &pointers)),
            );

            match self.store.update_record(table, &document.id, update) {
                Ok(_) => {
                    debug!(prefix = %prefix, record = %document.id, images = pointers.len(), "document updated");
                    report.documents.updated += 1;
                    report.substitutions += pointers.len();
                }
                Err(e) if e.is_fatal() => return Err(MigrateError::Destination(e)),
                Err(e) => {
                    warn!(record = %document.id, error = %e, "document update failed");
                    report.documents.failed += 1;
                    report.fail(Stage::Attach, document.id.as_str(), e);
                }
            }
        }

        Ok(())
    }
}
