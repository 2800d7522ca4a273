//! Document import: one destination record per exported page.

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::MigrateConfig;
use crate::document::{clean_value, ImageResolver};
use crate::domain::{AssetMap, Document};
use crate::errors::MigrateError;
use crate::report::{RunReport, Stage};
use crate::store::{Fields, RecordStore};

/// Writes documents with their image references rewritten to asset pointers.
pub struct DocumentImporter<'a, S: RecordStore> {
    store: &'a S,
    config: &'a MigrateConfig,
}

impl<'a, S: RecordStore> DocumentImporter<'a, S> {
    pub fn new(store: &'a S, config: &'a MigrateConfig) -> Self {
        Self { store, config }
    }

    /// Destination fields for `document` with the already rewritten `content`.
    ///
    /// Empty values, disabled fields and unmapped statuses are left out.
    pub fn record_fields(&self, document: &Document, content: &str) -> Fields {
        let names = &self.config.airtable.document_fields;
        let mut fields = Fields::new();

        let mut put = |name: Option<&String>, value: String| {
            if let Some(name) = name {
                if !value.is_empty() {
                    fields.insert(name.clone(), Value::String(value));
                }
            }
        };

        put(Some(&names.title), clean_value(&document.title));
        put(Some(&names.content), content.trim().to_string());
        if let Some(status) = &document.status {
            let mapped = self
                .config
                .status_mapping
                .map(&clean_value(status))
                .map(str::to_string)
                .unwrap_or_default();
            put(names.status.as_ref(), mapped);
        }
        if let Some(id) = &document.notion_id {
            put(names.source_id.as_ref(), id.to_string());
        }
        let tags: Vec<String> = document
            .tags
            .iter()
            .map(|tag| clean_value(tag))
            .filter(|tag| !tag.is_empty())
            .collect();
        put(names.tags.as_ref(), tags.join(", "));
        if let Some(date) = &document.publish_date {
            put(names.publish_date.as_ref(), clean_value(date));
        }
        put(names.project.as_ref(), clean_value(&document.project));

        fields
    }

    /// Import every document.
    ///
    /// Documents with unresolved references are still written; the references
    /// go into the report. Documents without a title are skipped. A fatal
    /// store error stops the import and is returned.
    pub fn import(
        &self,
        documents: &[Document],
        assets: &AssetMap,
        report: &mut RunReport,
    ) -> Result<(), MigrateError> {
        let resolver = ImageResolver::new(assets);
        let table = &self.config.airtable.document_table;
        info!(
            count = documents.len(),
            assets = resolver.catalog().len(),
            "importing documents"
        );

        for document in documents {
            if clean_value(&document.title).is_empty() {
                debug!(source = %document.source_file, "skipping document without title");
                report.documents.skipped += 1;
                continue;
            }

            let key = document.key();
            let outcome = resolver.rewrite(&key, document.image_prefix(), &document.content);
            report.substitutions += outcome.substitutions;
            report.unresolved.extend(outcome.unresolved);
            report.ambiguities.extend(outcome.ambiguities);

            let fields = self.record_fields(document, &outcome.body);
            match self.store.create_record(table, fields) {
                Ok(record) => {
                    debug!(title = %document.title, record = %record.id, "imported");
                    report.documents.created += 1;
                }
                Err(e) if e.is_fatal() => return Err(MigrateError::Destination(e)),
                Err(e) => {
                    warn!(title = %document.title, error = %e, "document import failed");
                    report.documents.failed += 1;
                    report.fail(Stage::Documents, document.title.as_str(), e);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SourceId;
    use crate::domain::Asset;
    use crate::store::{InMemoryStore, StoreError};
    use std::collections::BTreeSet;

    fn document(title: &str, content: &str) -> Document {
        Document {
            title: title.to_string(),
            content: content.to_string(),
            status: None,
            notion_id: None,
            tags: BTreeSet::new(),
            publish_date: None,
            project: "Inbox".to_string(),
            source_file: format!("{}.md", title),
            images: Vec::new(),
        }
    }

    fn assets() -> AssetMap {
        let mut map = AssetMap::new();
        map.insert(
            "abc123_photo-final.png".to_string(),
            Asset {
                filename: "abc123_photo-final.png".to_string(),
                url: "https://img/abc123_photo-final.png".to_string(),
                caption: "photo-final".to_string(),
                record_id: "recA".to_string(),
                attachment_id: "attA".to_string(),
            },
        );
        map
    }

    #[test]
    fn test_record_fields_defaults() {
        let store = InMemoryStore::new();
        let config = MigrateConfig::default();
        let importer = DocumentImporter::new(&store, &config);

        let mut doc = document(" \"Valplan\" ", "Body");
        doc.status = Some("Imported".to_string());
        doc.notion_id = Some(SourceId::new("281fc2711b808049b837d239a4b31baf"));
        doc.tags = ["val".to_string(), "politik".to_string()].into_iter().collect();
        doc.publish_date = Some("2024-01-05".to_string());
        doc.project = "Politik".to_string();

        let fields = importer.record_fields(&doc, "Body");
        assert_eq!(fields["Title"], "Valplan");
        assert_eq!(fields["Content"], "Body");
        assert_eq!(fields["Status"], "Inbox");
        assert_eq!(fields["Notion_ID"], "281fc2711b808049b837d239a4b31baf");
        assert_eq!(fields["Notion_Tag"], "politik, val");
        assert_eq!(fields["Publish_Date"], "2024-01-05");
        assert_eq!(fields["Import_Project"], "Politik");
    }

    #[test]
    fn test_unmapped_status_and_empty_values_omitted() {
        let store = InMemoryStore::new();
        let config = MigrateConfig::default();
        let importer = DocumentImporter::new(&store, &config);

        let mut doc = document("Plan", "");
        doc.status = Some("Draft".to_string());

        let fields = importer.record_fields(&doc, "");
        assert!(!fields.contains_key("Status"));
        assert!(!fields.contains_key("Content"));
        assert!(!fields.contains_key("Notion_Tag"));
        assert!(!fields.contains_key("Publish_Date"));
    }

    #[test]
    fn test_disabled_field_omitted() {
        let store = InMemoryStore::new();
        let mut config = MigrateConfig::default();
        config.airtable.document_fields.project = None;
        let importer = DocumentImporter::new(&store, &config);

        let fields = importer.record_fields(&document("Plan", "x"), "x");
        assert!(!fields.contains_key("Import_Project"));
    }

    #[test]
    fn test_import_rewrites_and_reports_unresolved() {
        let store = InMemoryStore::new();
        let config = MigrateConfig::default();
        let importer = DocumentImporter::new(&store, &config);
        let mut report = RunReport::new();

        let docs = vec![
            document("A", "See ![alt](photo-final.png) here"),
            document("B", "Gone: ![[missing.png]]"),
            document("  ", "no title"),
        ];
        importer.import(&docs, &assets(), &mut report).unwrap();

        let records = store.records("DOCUMENT");
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].text("Content"),
            Some("See ![alt](asset:recA:attA) here")
        );
        assert_eq!(records[1].text("Content"), Some("Gone: ![[missing.png]]"));
        assert_eq!(report.documents.created, 2);
        assert_eq!(report.documents.skipped, 1);
        assert_eq!(report.substitutions, 1);
        assert_eq!(report.unresolved.len(), 1);
        assert_eq!(report.unresolved[0].reference, "![[missing.png]]");
        assert_eq!(report.unresolved[0].document, "B.md");
    }

    #[test]
    fn test_failed_write_is_recorded() {
        let store = InMemoryStore::new().reject_values_containing("poison");
        let config = MigrateConfig::default();
        let importer = DocumentImporter::new(&store, &config);
        let mut report = RunReport::new();

        let docs = vec![document("A", "poison"), document("B", "fine")];
        importer.import(&docs, &AssetMap::new(), &mut report).unwrap();

        assert_eq!(report.documents.created, 1);
        assert_eq!(report.documents.failed, 1);
        assert_eq!(report.failures[0].item, "A");
    }

    #[test]
    fn test_computed_field_aborts() {
        let store = InMemoryStore::new().with_computed_field("Import_Project");
        let config = MigrateConfig::default();
        let importer = DocumentImporter::new(&store, &config);
        let mut report = RunReport::new();

        let err = importer
            .import(&[document("A", "x")], &AssetMap::new(), &mut report)
            .unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Destination(StoreError::ComputedField { .. })
        ));
    }
}
