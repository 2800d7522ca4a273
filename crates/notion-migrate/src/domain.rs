//! Core domain types for the migration.
//!
//! `Document` is the normalized intermediate form written by the export stage
//! and read back by the upload stage. `Asset` is one uploaded image.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::document::SourceId;

/// A normalized page from the export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Title with the Notion id stripped
    pub title: String,
    /// Markdown body, including image references
    #[serde(alias = "body")]
    pub content: String,
    /// Raw status from the page properties
    #[serde(default)]
    pub status: Option<String>,
    /// Notion page id, when the filename carried one
    #[serde(default)]
    pub notion_id: Option<SourceId>,
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub tags: BTreeSet<String>,
    /// Publish date, `YYYY-MM-DD` when it could be normalized
    #[serde(default)]
    pub publish_date: Option<String>,
    /// Project label derived from the folder path (never empty)
    pub project: String,
    /// Path relative to the export root
    #[serde(default)]
    pub source_file: String,
    /// Raw text of every image reference found in the body
    #[serde(default)]
    pub images: Vec<String>,
}

impl Document {
    /// Identifier used in reports: the Notion id, or the source path when the
    /// page has none.
    pub fn key(&self) -> String {
        match &self.notion_id {
            Some(id) => id.to_string(),
            None => self.source_file.clone(),
        }
    }

    /// Catalog prefix of images exported for this document.
    pub fn image_prefix(&self) -> Option<&str> {
        self.notion_id.as_ref().map(|id| id.prefix())
    }
}

/// Tags were historically written as a single comma separated string.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Tags {
        List(Vec<String>),
        Text(String),
        None,
    }

    Ok(match Tags::deserialize(deserializer)? {
        Tags::List(list) => list
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        Tags::Text(text) => split_tags(&text),
        Tags::None => BTreeSet::new(),
    })
}

/// Split a comma separated tag list, dropping empty entries.
pub fn split_tags(text: &str) -> BTreeSet<String> {
    text.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// An image uploaded to the destination store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Catalog filename, including its source prefix
    pub filename: String,
    /// Public URL the store fetched the image from
    pub url: String,
    pub caption: String,
    pub record_id: String,
    pub attachment_id: String,
}

impl Asset {
    /// Pointer syntax for this asset: `![caption](asset:rec:att)`.
    pub fn pointer(&self, caption: &str) -> String {
        format!(
            "![{}](asset:{}:{})",
            caption, self.record_id, self.attachment_id
        )
    }
}

/// Catalog filename to uploaded asset.
pub type AssetMap = BTreeMap<String, Asset>;

/// An image reference that could not be resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenReference {
    /// Owning document (see [`Document::key`])
    pub document: String,
    /// Raw reference text as written in the body
    pub reference: String,
}

/// A reference resolved by picking one of several candidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmbiguityNote {
    pub document: String,
    pub reference: String,
    pub chosen: String,
    pub alternatives: Vec<String>,
}
