//! Page metadata: the `Key: Value` property block Notion writes under the
//! title heading, and the rows of exported database CSV files.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use super::filename::{clean_value, strip_notion_id};
use crate::domain::split_tags;

const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// Metadata extracted for one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageMetadata {
    /// Text of the first `# ` heading
    pub heading: Option<String>,
    pub status: Option<String>,
    pub tags: BTreeSet<String>,
    pub publish_date: Option<String>,
}

impl PageMetadata {
    /// Fill fields that are still empty from `other`.
    pub fn merge_missing(&mut self, other: &PageMetadata) {
        if self.status.is_none() {
            self.status = other.status.clone();
        }
        if self.tags.is_empty() {
            self.tags = other.tags.clone();
        }
        if self.publish_date.is_none() {
            self.publish_date = other.publish_date.clone();
        }
    }

    fn apply(&mut self, key: &str, raw: &str) -> bool {
        let value = clean_value(raw);
        match key.trim().to_lowercase().as_str() {
            "status" => {
                if !value.is_empty() {
                    self.status = Some(value);
                }
                true
            }
            "tags" => {
                self.tags = split_tags(raw)
                    .iter()
                    .map(|tag| clean_value(tag))
                    .filter(|tag| !tag.is_empty())
                    .collect();
                true
            }
            "publish date" | "published" | "date" => {
                if !value.is_empty() {
                    self.publish_date = Some(normalize_date(&value));
                }
                true
            }
            _ => false,
        }
    }
}

/// Parse the heading and property block at the top of a page.
///
/// Properties are the `Key: Value` lines that directly follow the title
/// heading, up to the first blank line after at least one property. Unknown
/// keys inside the block are skipped.
pub fn parse_properties(content: &str) -> PageMetadata {
    let mut meta = PageMetadata::default();
    let mut lines = content.lines().skip_while(|l| l.trim().is_empty());

    let Some(first) = lines.next() else {
        return meta;
    };
    let Some(heading) = first.trim().strip_prefix("# ") else {
        return meta;
    };
    meta.heading = Some(heading.trim().to_string()).filter(|h| !h.is_empty());

    let mut in_block = false;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            if in_block {
                break;
            }
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            break;
        };
        // Property names are short labels, not sentences or URLs
        if key.is_empty() || key.len() > 40 || key.contains("http") {
            break;
        }
        meta.apply(key, value);
        in_block = true;
    }

    meta
}

/// Normalize a date to `YYYY-MM-DD`, returning the input unchanged when no
/// known format matches.
pub fn normalize_date(value: &str) -> String {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| value.to_string())
}

/// Page metadata from exported database CSV files, keyed by page title.
#[derive(Debug, Clone, Default)]
pub struct CsvMetadata {
    by_title: HashMap<String, PageMetadata>,
}

impl CsvMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read one database export. The first row for a title wins.
    pub fn load_file(&mut self, path: &Path) -> Result<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .with_context(|| format!("Failed to read CSV header: {}", path.display()))?
            .iter()
            // Notion writes a BOM in front of the first column name
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        let Some(title_col) = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case("name") || h.eq_ignore_ascii_case("title"))
        else {
            return Ok(0);
        };

        let mut added = 0;
        for record in reader.records() {
            let record =
                record.with_context(|| format!("Failed to read CSV row: {}", path.display()))?;
            let Some(title) = record.get(title_col).map(strip_notion_id) else {
                continue;
            };
            if title.is_empty() || self.by_title.contains_key(&title) {
                continue;
            }
            let mut meta = PageMetadata::default();
            for (idx, header) in headers.iter().enumerate() {
                if idx != title_col {
                    if let Some(value) = record.get(idx) {
                        meta.apply(header, value);
                    }
                }
            }
            self.by_title.insert(title, meta);
            added += 1;
        }
        Ok(added)
    }

    pub fn get(&self, title: &str) -> Option<&PageMetadata> {
        self.by_title.get(title)
    }

    pub fn len(&self) -> usize {
        self.by_title.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_title.is_empty()
    }
}
