//! Project classification from folder structure.
//!
//! A document's project is decided by an ordered rule table. Each rule is a
//! sequence of folder patterns that must match the leading folders of the
//! document's path; the first matching rule in declaration order wins, so
//! more specific rules must be declared before shorter ones.
//!
//! ```
//! use notion_migrate::classify::ProjectClassifier;
//!
//! let classifier = ProjectClassifier::default();
//! assert_eq!(classifier.classify(&["Projekt (egna)", "Forefront"]), "Forefront");
//! assert_eq!(classifier.classify(&["Politik", "2024"]), "Politik");
//! let root: [&str; 0] = [];
//! assert_eq!(classifier.classify(&root), "Inbox");
//! ```

use anyhow::{anyhow, Result};
use std::fmt;
use std::path::Path;

use crate::document::strip_notion_id;

/// Sentinel project for documents outside any project folder.
pub const INBOX: &str = "Inbox";

/// One folder pattern inside a rule prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Folder name compared literally, special characters included
    Literal(String),
    /// `*`: any single folder
    Any,
}

impl Segment {
    pub fn parse(pattern: &str) -> Self {
        if pattern == "*" {
            Segment::Any
        } else {
            Segment::Literal(pattern.to_string())
        }
    }

    fn matches(&self, folder: &str) -> bool {
        match self {
            Segment::Literal(name) => name == folder,
            Segment::Any => true,
        }
    }
}

/// What a matching rule labels the document with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Fixed(String),
    /// Name of the folder matched at this prefix position (0-based)
    Capture(usize),
}

impl Label {
    /// Parse `"{n}"` as a capture and anything else as fixed text.
    pub fn parse(label: &str) -> Self {
        label
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
            .and_then(|index| index.parse().ok())
            .map(Label::Capture)
            .unwrap_or_else(|| Label::Fixed(label.to_string()))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Fixed(text) => f.write_str(text),
            Label::Capture(index) => write!(f, "{{{}}}", index),
        }
    }
}

/// A `(prefix pattern, label)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRule {
    pub prefix: Vec<Segment>,
    pub label: Label,
}

impl ProjectRule {
    /// Build a rule, rejecting captures that point outside the prefix.
    pub fn new(prefix: &[&str], label: &str) -> Result<Self> {
        let prefix: Vec<Segment> = prefix.iter().map(|p| Segment::parse(p)).collect();
        if prefix.is_empty() {
            return Err(anyhow!("Invalid project rule: prefix must not be empty"));
        }
        let label = Label::parse(label);
        if let Label::Capture(index) = label {
            if index >= prefix.len() {
                return Err(anyhow!(
                    "Invalid project rule: label {{{}}} refers past the end of a {}-folder prefix",
                    index,
                    prefix.len()
                ));
            }
        }
        if matches!(&label, Label::Fixed(text) if text.trim().is_empty()) {
            return Err(anyhow!("Invalid project rule: label must not be empty"));
        }
        Ok(Self { prefix, label })
    }

    /// Label for `folders` if this rule's prefix matches them.
    pub fn apply<S: AsRef<str>>(&self, folders: &[S]) -> Option<String> {
        if folders.len() < self.prefix.len() {
            return None;
        }
        let matched = self
            .prefix
            .iter()
            .zip(folders)
            .all(|(segment, folder)| segment.matches(folder.as_ref()));
        if !matched {
            return None;
        }
        let label = match &self.label {
            Label::Fixed(text) => text.clone(),
            Label::Capture(index) => folders[*index].as_ref().to_string(),
        };
        Some(label).filter(|l| !l.trim().is_empty())
    }
}

/// Ordered rule table mapping folder paths to project labels.
#[derive(Debug, Clone)]
pub struct ProjectClassifier {
    rules: Vec<ProjectRule>,
    strip_roots: Vec<String>,
    exclude: Vec<String>,
    inbox: String,
}

impl ProjectClassifier {
    pub fn new(rules: Vec<ProjectRule>) -> Self {
        Self {
            rules,
            strip_roots: Vec::new(),
            exclude: Vec::new(),
            inbox: INBOX.to_string(),
        }
    }

    /// Built-in rules for the workspace layout this tool was written for.
    pub fn default_rules() -> Vec<ProjectRule> {
        fn rule(prefix: &[&str], label: &str) -> ProjectRule {
            ProjectRule {
                prefix: prefix.iter().map(|p| Segment::parse(p)).collect(),
                label: Label::parse(label),
            }
        }

        vec![
            rule(&["Projekt (egna)", "*"], "{1}"),
            rule(&["Projekt (egna)"], "Projekt"),
            rule(&["Projekt", "*"], "{1}"),
            rule(&["Projekt"], "Projekt"),
        ]
    }

    /// Leading folders removed before matching (e.g. `Private & Shared`).
    pub fn with_strip_roots(mut self, roots: Vec<String>) -> Self {
        self.strip_roots = roots;
        self
    }

    /// Top-level folders that never become a project on their own.
    pub fn with_exclude(mut self, folders: Vec<String>) -> Self {
        self.exclude = folders;
        self
    }

    pub fn with_inbox_label(mut self, label: impl Into<String>) -> Self {
        self.inbox = label.into();
        self
    }

    pub fn rules(&self) -> &[ProjectRule] {
        &self.rules
    }

    pub fn inbox_label(&self) -> &str {
        &self.inbox
    }

    /// Project label for a document given the folders above it.
    ///
    /// Folder names are cleaned of Notion id suffixes first. Root-level
    /// documents land in the inbox; unmatched paths use their top-level
    /// folder unless it is excluded.
    pub fn classify<S: AsRef<str>>(&self, folders: &[S]) -> String {
        let mut cleaned: Vec<String> = folders
            .iter()
            .map(|f| strip_notion_id(f.as_ref()))
            .collect();

        if let Some(first) = cleaned.first() {
            if self.strip_roots.iter().any(|root| root == first) {
                cleaned.remove(0);
            }
        }

        let Some(top) = cleaned.first() else {
            return self.inbox.clone();
        };

        if let Some(label) = self.rules.iter().find_map(|rule| rule.apply(&cleaned)) {
            return label;
        }

        if self.exclude.iter().any(|ex| ex == top) || top.trim().is_empty() {
            self.inbox.clone()
        } else {
            top.clone()
        }
    }

    /// Classify a file by its path relative to the export root.
    pub fn classify_path(&self, relative: &Path) -> String {
        let folders: Vec<String> = relative
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect()
            })
            .unwrap_or_default();
        self.classify(&folders)
    }
}

impl Default for ProjectClassifier {
    fn default() -> Self {
        Self::new(Self::default_rules()).with_strip_roots(vec!["Private & Shared".to_string()])
    }
}
