//! End-of-run summary.
//!
//! Every per-item problem of a run lands here instead of aborting it: upload
//! and write failures, unresolved image references, ambiguous matches and
//! warnings. The report is printed once at the end, as text or inside the
//! JSON envelope.

use serde::Serialize;
use std::fmt;

use crate::domain::{AmbiguityNote, BrokenReference};

/// Warning recorded when the image host does not answer a reachability check.
pub const HOST_UNREACHABLE: &str = "host urls not accessible";

/// Stage an item failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Images,
    Documents,
    Attach,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Images => "images",
            Stage::Documents => "documents",
            Stage::Attach => "attach",
        };
        f.write_str(name)
    }
}

/// Success/skip/failure counts for one kind of record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} created, ", self.created)?;
        if self.updated > 0 {
            write!(f, "{} updated, ", self.updated)?;
        }
        write!(f, "{} skipped, {} failed", self.skipped, self.failed)
    }
}

/// One item that could not be written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub stage: Stage,
    pub item: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub assets: Counts,
    pub documents: Counts,
    /// Image references replaced by asset pointers
    pub substitutions: usize,
    pub failures: Vec<ItemFailure>,
    pub unresolved: Vec<BrokenReference>,
    pub ambiguities: Vec<AmbiguityNote>,
    /// Image prefixes no document record matched (attach mode)
    pub not_found: Vec<String>,
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, stage: Stage, item: impl Into<String>, reason: impl fmt::Display) {
        self.failures.push(ItemFailure {
            stage,
            item: item.into(),
            reason: reason.to_string(),
        });
    }

    /// Record a warning once.
    pub fn warn(&mut self, warning: impl Into<String>) {
        let warning = warning.into();
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
            && self.unresolved.is_empty()
            && self.not_found.is_empty()
            && self.warnings.is_empty()
    }

    /// Human-readable summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Assets:     {}\n", self.assets));
        out.push_str(&format!("Documents:  {}\n", self.documents));
        out.push_str(&format!("Image references rewritten: {}\n", self.substitutions));

        if !self.warnings.is_empty() {
            out.push_str("\nWarnings:\n");
            for warning in &self.warnings {
                out.push_str(&format!("  - {}\n", warning));
            }
        }

        if !self.failures.is_empty() {
            out.push_str(&format!("\nFailures ({}):\n", self.failures.len()));
            for failure in &self.failures {
                out.push_str(&format!(
                    "  - [{}] {}: {}\n",
                    failure.stage, failure.item, failure.reason
                ));
            }
        }

        if !self.unresolved.is_empty() {
            out.push_str(&format!(
                "\nUnresolved image references ({}):\n",
                self.unresolved.len()
            ));
            for broken in &self.unresolved {
                out.push_str(&format!("  - {}: {}\n", broken.document, broken.reference));
            }
        }

        if !self.not_found.is_empty() {
            out.push_str(&format!(
                "\nDocuments not found ({}): no record's source id starts with\n",
                self.not_found.len()
            ));
            for prefix in &self.not_found {
                out.push_str(&format!("  - {}\n", prefix));
            }
        }

        if !self.ambiguities.is_empty() {
            out.push_str(&format!("\nAmbiguous matches ({}):\n", self.ambiguities.len()));
            for note in &self.ambiguities {
                out.push_str(&format!(
                    "  - {}: {} -> {} (also: {})\n",
                    note.document,
                    note.reference,
                    note.chosen,
                    note.alternatives.join(", ")
                ));
            }
        }

        out
    }
}
