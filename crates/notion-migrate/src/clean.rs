//! In-place cleanup of a `content.json` written by older exports.

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

use crate::document::clean_value;
use crate::files::{read_json, write_json};

/// Result of a cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CleanSummary {
    pub documents: usize,
    /// String values that changed
    pub changed: usize,
    /// Distinct statuses after cleaning
    pub statuses: BTreeSet<String>,
}

/// Strip whitespace and stray quotes from every string field of every
/// document in `path`, rewriting the file atomically.
pub fn clean_content(path: &Path) -> Result<CleanSummary> {
    let mut documents: Vec<Value> = read_json(path)?;
    let mut summary = CleanSummary {
        documents: documents.len(),
        ..Default::default()
    };

    for document in &mut documents {
        let Value::Object(fields) = document else {
            return Err(anyhow!(
                "Expected an array of objects in {}",
                path.display()
            ));
        };
        for value in fields.values_mut() {
            summary.changed += clean_strings(value);
        }
        if let Some(Value::String(status)) = fields.get("status") {
            if !status.is_empty() {
                summary.statuses.insert(status.clone());
            }
        }
    }

    write_json(path, &documents)?;
    info!(
        path = %path.display(),
        documents = summary.documents,
        changed = summary.changed,
        "content cleaned"
    );
    Ok(summary)
}

/// Clean strings in `value`, descending into arrays. Returns how many changed.
fn clean_strings(value: &mut Value) -> usize {
    match value {
        Value::String(text) => {
            let cleaned = clean_value(text);
            if cleaned == *text {
                0
            } else {
                *text = cleaned;
                1
            }
        }
        Value::Array(items) => items.iter_mut().map(clean_strings).sum(),
        _ => 0,
    }
}

impl CleanSummary {
    pub fn render(&self) -> String {
        let mut out = format!(
            "Cleaned {} documents ({} values changed)\n\nStatuses:\n",
            self.documents, self.changed
        );
        for status in &self.statuses {
            out.push_str(&format!("  {}\n", status));
        }
        out
    }
}
