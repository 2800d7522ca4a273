//! Batch image upload.
//!
//! Each exported image becomes one asset record whose attachment field points
//! at the image's public URL; Airtable fetches the file from there. The
//! resulting filename to asset map is what the document importer rewrites
//! references against.
//!
//! Uploads are not idempotent: running the stage twice creates every asset
//! twice.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::AirtableConfig;
use crate::document::PrefixedFilename;
use crate::domain::{Asset, AssetMap};
use crate::errors::MigrateError;
use crate::files::{read_json, write_json};
use crate::host::ImageHost;
use crate::report::{RunReport, Stage, HOST_UNREACHABLE};
use crate::store::{Fields, RecordStore};

/// Extensions picked up from the images directory (compared lowercase)
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Image filenames directly inside `dir`, sorted.
pub fn list_images(dir: &Path) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(MigrateError::input_not_found(dir).into());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read images directory: {}", dir.display()))?
    {
        let entry = entry.context("Failed to read directory entry")?;
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if is_image_name(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Uploads images as asset records.
pub struct AssetUploader<'a, S: RecordStore> {
    store: &'a S,
    config: &'a AirtableConfig,
    host: &'a ImageHost,
    reachable: Box<dyn Fn(&str) -> bool + 'a>,
}

impl<'a, S: RecordStore> AssetUploader<'a, S> {
    pub fn new(store: &'a S, config: &'a AirtableConfig, host: &'a ImageHost) -> Self {
        Self {
            store,
            config,
            host,
            reachable: Box::new(|url| ImageHost::is_reachable(url, REACHABILITY_TIMEOUT)),
        }
    }

    /// Replace the reachability check run before the first upload.
    pub fn with_reachability_check(mut self, check: impl Fn(&str) -> bool + 'a) -> Self {
        self.reachable = Box::new(check);
        self
    }

    /// Fields of the asset record for `filename`.
    pub fn asset_fields(&self, filename: &str, url: &str) -> Fields {
        let fields = &self.config.asset_fields;
        let mut record = Fields::new();
        record.insert(
            fields.caption.clone(),
            Value::String(caption_for(filename)),
        );
        record.insert(fields.attachment.clone(), json!([{ "url": url }]));
        for (name, value) in &fields.extra {
            record.insert(name.clone(), Value::String(value.clone()));
        }
        record
    }

    /// Check the public URL of `first`; an unreachable host is a warning.
    pub fn check_host(&self, first: &str, report: &mut RunReport) {
        let url = self.host.url_for(first);
        if !(self.reachable)(&url) {
            warn!(url = %url, "image host did not answer; uploads will likely fail");
            report.warn(HOST_UNREACHABLE);
        }
    }

    /// Check the host, then upload every file in `filenames` into `assets`.
    ///
    /// On a fatal error `assets` still holds every image uploaded before it,
    /// so the caller can persist them.
    pub fn upload_all(
        &self,
        filenames: &[String],
        assets: &mut AssetMap,
        report: &mut RunReport,
    ) -> Result<(), MigrateError> {
        if let Some(first) = filenames.first() {
            self.check_host(first, report);
        }
        self.upload_into(filenames, assets, report)
    }

    /// Upload every file in `filenames` into a fresh map.
    pub fn upload(
        &self,
        filenames: &[String],
        report: &mut RunReport,
    ) -> Result<AssetMap, MigrateError> {
        let mut assets = AssetMap::new();
        self.upload_into(filenames, &mut assets, report)?;
        Ok(assets)
    }

    /// A failing image is recorded in `report` and skipped. A fatal store
    /// error (computed or unknown field, bad credential, missing table) stops
    /// the batch and is returned.
    fn upload_into(
        &self,
        filenames: &[String],
        assets: &mut AssetMap,
        report: &mut RunReport,
    ) -> Result<(), MigrateError> {
        info!(count = filenames.len(), "uploading images");
        for (idx, filename) in filenames.iter().enumerate() {
            let url = self.host.url_for(filename);
            let fields = self.asset_fields(filename, &url);

            let record = match self.store.create_record(&self.config.asset_table, fields) {
                Ok(record) => record,
                Err(e) if e.is_fatal() => {
                    warn!(uploaded = assets.len(), "stopping image upload");
                    return Err(MigrateError::Destination(e));
                }
                Err(e) => {
                    warn!(filename = %filename, error = %e, "image upload failed");
                    report.assets.failed += 1;
                    report.fail(Stage::Images, filename.as_str(), e);
                    continue;
                }
            };

            let Some(attachment_id) = record.attachment_id(&self.config.asset_fields.attachment)
            else {
                warn!(filename = %filename, record = %record.id, "no attachment id returned");
                report.assets.failed += 1;
                report.fail(
                    Stage::Images,
                    filename.as_str(),
                    format!("record {} was created without an attachment id", record.id),
                );
                continue;
            };

            debug!(
                progress = format!("{}/{}", idx + 1, filenames.len()),
                filename = %filename,
                record = %record.id,
                "uploaded"
            );
            report.assets.created += 1;
            assets.insert(
                filename.clone(),
                Asset {
                    filename: filename.clone(),
                    url,
                    caption: caption_for(filename),
                    record_id: record.id.clone(),
                    attachment_id: attachment_id.to_string(),
                },
            );
        }

        Ok(())
    }
}

/// Persist the asset map so a later `documents` run can use it.
pub fn save_asset_map(path: &Path, assets: &AssetMap) -> Result<()> {
    write_json(path, assets)?;
    info!(path = %path.display(), count = assets.len(), "asset map written");
    Ok(())
}

/// Load an asset map written by [`save_asset_map`].
pub fn load_asset_map(path: &Path) -> Result<AssetMap> {
    read_json(path).context("Run the images stage first to create the asset map")
}

/// Caption of an uploaded image: its name without prefix or extension.
pub fn caption_for(filename: &str) -> String {
    PrefixedFilename::parse(filename).stem().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreError};
    use tempfile::TempDir;

    fn host() -> ImageHost {
        ImageHost::with_base("https://img.example.com")
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_list_images_filters_and_sorts() {
        let temp = TempDir::new().unwrap();
        for name in ["b_two.PNG", "a_one.jpg", "notes.txt", "c_three.webp"] {
            fs::write(temp.path().join(name), b"x").unwrap();
        }
        fs::create_dir(temp.path().join("d_dir.png")).unwrap();

        assert_eq!(
            list_images(temp.path()).unwrap(),
            vec!["a_one.jpg", "b_two.PNG", "c_three.webp"]
        );
    }

    #[test]
    fn test_list_images_missing_dir() {
        let temp = TempDir::new().unwrap();
        assert!(list_images(&temp.path().join("images")).is_err());
    }

    #[test]
    fn test_asset_fields() {
        let store = InMemoryStore::new();
        let mut config = AirtableConfig::default();
        config
            .asset_fields
            .extra
            .insert("Type".to_string(), "Image".to_string());
        let host = host();
        let uploader = AssetUploader::new(&store, &config, &host);

        let fields = uploader.asset_fields("abc123_photo-final.png", "https://img.example.com/x");
        assert_eq!(fields["Caption"], "photo-final");
        assert_eq!(fields["Attachment"][0]["url"], "https://img.example.com/x");
        assert_eq!(fields["Type"], "Image");
    }

    #[test]
    fn test_upload_builds_asset_map() {
        let store = InMemoryStore::new();
        let config = AirtableConfig::default();
        let host = host();
        let uploader = AssetUploader::new(&store, &config, &host)
            .with_reachability_check(|_| true);
        let mut report = RunReport::new();

        let mut assets = AssetMap::new();
        uploader
            .upload_all(&names(&["abc_logo.png", "def_chart.png"]), &mut assets, &mut report)
            .unwrap();

        assert_eq!(assets.len(), 2);
        let logo = &assets["abc_logo.png"];
        assert_eq!(logo.url, "https://img.example.com/abc_logo.png");
        assert_eq!(logo.caption, "logo");
        assert!(logo.record_id.starts_with("rec"));
        assert!(logo.attachment_id.starts_with("att"));
        assert_eq!(report.assets.created, 2);
        assert_eq!(store.records("ASSET").len(), 2);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_single_failure_is_skipped() {
        let store = InMemoryStore::new().reject_values_containing("broken");
        let config = AirtableConfig::default();
        let host = host();
        let uploader = AssetUploader::new(&store, &config, &host)
            .with_reachability_check(|_| true);
        let mut report = RunReport::new();

        let assets = uploader
            .upload(&names(&["a_ok.png", "b_broken.png", "c_fine.png"]), &mut report)
            .unwrap();

        assert_eq!(assets.len(), 2);
        assert!(!assets.contains_key("b_broken.png"));
        assert_eq!(report.assets.created, 2);
        assert_eq!(report.assets.failed, 1);
        assert_eq!(report.failures[0].item, "b_broken.png");
        assert_eq!(report.failures[0].stage, Stage::Images);
    }

    #[test]
    fn test_computed_field_aborts_batch() {
        let store = InMemoryStore::new().with_computed_field("Caption");
        let config = AirtableConfig::default();
        let host = host();
        let uploader = AssetUploader::new(&store, &config, &host)
            .with_reachability_check(|_| true);
        let mut report = RunReport::new();

        let mut assets = AssetMap::new();
        let err = uploader
            .upload_all(&names(&["a.png", "b.png"]), &mut assets, &mut report)
            .unwrap_err();

        assert!(matches!(
            err,
            MigrateError::Destination(StoreError::ComputedField { ref field }) if field == "Caption"
        ));
        assert_eq!(store.call_count(), 1);
        assert!(assets.is_empty());
    }

    #[test]
    fn test_fatal_error_keeps_earlier_uploads() {
        let store = InMemoryStore::new().revoke_after(2);
        let config = AirtableConfig::default();
        let host = host();
        let uploader = AssetUploader::new(&store, &config, &host)
            .with_reachability_check(|_| true);
        let mut report = RunReport::new();
        let mut assets = AssetMap::new();

        let err = uploader
            .upload_all(
                &names(&["a_one.png", "b_two.png", "c_three.png", "d_four.png"]),
                &mut assets,
                &mut report,
            )
            .unwrap_err();

        assert!(matches!(
            err,
            MigrateError::Destination(StoreError::Unauthorized { .. })
        ));
        assert_eq!(
            assets.keys().collect::<Vec<_>>(),
            vec!["a_one.png", "b_two.png"]
        );
        assert_eq!(store.records("ASSET").len(), 2);
        assert_eq!(report.assets.created, 2);
    }

    #[test]
    fn test_missing_attachment_id_is_failure() {
        let store = InMemoryStore::new().without_attachment_ids();
        let config = AirtableConfig::default();
        let host = host();
        let uploader = AssetUploader::new(&store, &config, &host)
            .with_reachability_check(|_| true);
        let mut report = RunReport::new();

        let assets = uploader.upload(&names(&["a.png"]), &mut report).unwrap();

        assert!(assets.is_empty());
        assert_eq!(report.assets.failed, 1);
        assert!(report.failures[0].reason.contains("without an attachment id"));
    }

    #[test]
    fn test_unreachable_host_warns_and_continues() {
        let store = InMemoryStore::new();
        let config = AirtableConfig::default();
        let host = host();
        let uploader = AssetUploader::new(&store, &config, &host)
            .with_reachability_check(|_| false);
        let mut report = RunReport::new();

        let mut assets = AssetMap::new();
        uploader
            .upload_all(&names(&["a.png"]), &mut assets, &mut report)
            .unwrap();

        assert_eq!(assets.len(), 1);
        assert_eq!(report.warnings, vec![HOST_UNREACHABLE.to_string()]);
    }

    #[test]
    fn test_asset_map_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("asset_map.json");
        let store = InMemoryStore::new();
        let config = AirtableConfig::default();
        let host = host();
        let uploader = AssetUploader::new(&store, &config, &host)
            .with_reachability_check(|_| true);
        let assets = uploader
            .upload(&names(&["abc_logo.png"]), &mut RunReport::new())
            .unwrap();

        save_asset_map(&path, &assets).unwrap();
        assert_eq!(load_asset_map(&path).unwrap(), assets);
    }

    #[test]
    fn test_missing_asset_map_is_input_not_found() {
        let temp = TempDir::new().unwrap();
        let err = load_asset_map(&temp.path().join("asset_map.json")).unwrap_err();
        assert!(err.downcast_ref::<MigrateError>().is_some());
    }

    #[test]
    fn test_caption_for() {
        assert_eq!(caption_for("281fc271_Screen Shot 2024.png"), "Screen Shot 2024");
        assert_eq!(caption_for("plain.jpg"), "plain");
    }
}
