//! Export directory layout and JSON file helpers.
//!
//! The export directory is the contract between stages:
//!
//! ```text
//! <export>/
//!   content.json        documents (tree form)
//!   content.csv         documents (table form)
//!   projects.json       sorted project labels
//!   images.json         copied image filenames
//!   broken_images.txt   references whose file was missing (only if any)
//!   images/             <prefix>_<name> image files
//!   asset_map.json      filename -> uploaded asset (written by `images`)
//! ```

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::MigrateError;

pub const CONTENT_JSON: &str = "content.json";
pub const CONTENT_CSV: &str = "content.csv";
pub const PROJECTS_JSON: &str = "projects.json";
pub const IMAGES_JSON: &str = "images.json";
pub const BROKEN_IMAGES: &str = "broken_images.txt";
pub const IMAGES_DIR: &str = "images";
pub const ASSET_MAP: &str = "asset_map.json";

/// Paths inside one export directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportLayout {
    root: PathBuf,
}

impl ExportLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout of an existing export; fails when the directory is missing.
    pub fn existing(root: impl Into<PathBuf>) -> Result<Self, MigrateError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(MigrateError::input_not_found(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn content_json(&self) -> PathBuf {
        self.root.join(CONTENT_JSON)
    }

    pub fn content_csv(&self) -> PathBuf {
        self.root.join(CONTENT_CSV)
    }

    pub fn projects_json(&self) -> PathBuf {
        self.root.join(PROJECTS_JSON)
    }

    pub fn images_json(&self) -> PathBuf {
        self.root.join(IMAGES_JSON)
    }

    pub fn broken_images(&self) -> PathBuf {
        self.root.join(BROKEN_IMAGES)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn asset_map(&self) -> PathBuf {
        self.root.join(ASSET_MAP)
    }
}

/// Write pretty JSON atomically (temp file, then rename).
pub fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data).context("Failed to serialize data")?;

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, json)
        .with_context(|| format!("Failed to write temporary file: {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temporary file to {}", path.display()))?;

    Ok(())
}

/// Read a JSON file, reporting a missing file as [`MigrateError::InputNotFound`].
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Err(MigrateError::input_not_found(path).into());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse JSON: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("projects.json");
        write_json(&path, &vec!["Forefront", "Inbox"]).unwrap();

        let loaded: Vec<String> = read_json(&path).unwrap();
        assert_eq!(loaded, vec!["Forefront", "Inbox"]);
        assert!(!temp.path().join("projects.json.tmp").exists());
    }

    #[test]
    fn test_read_missing_is_input_not_found() {
        let temp = TempDir::new().unwrap();
        let err = read_json::<Vec<String>>(&temp.path().join("content.json")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MigrateError>(),
            Some(MigrateError::InputNotFound { .. })
        ));
    }

    #[test]
    fn test_existing_layout_requires_directory() {
        let temp = TempDir::new().unwrap();
        assert!(ExportLayout::existing(temp.path()).is_ok());
        assert!(ExportLayout::existing(temp.path().join("nope")).is_err());
        let layout = ExportLayout::new(temp.path());
        assert_eq!(layout.asset_map(), temp.path().join("asset_map.json"));
    }
}
