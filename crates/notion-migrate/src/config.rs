//! Configuration file loading and parsing.
//!
//! The tool reads an optional `notion-migrate.toml` from the working directory
//! (or the file given with `--config`). Every setting is optional in the file;
//! [`MigrateConfig`] resolves them against built-in defaults and is passed
//! explicitly into each component.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::classify::{ProjectClassifier, ProjectRule, INBOX};
use crate::errors::MigrateError;

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "notion-migrate.toml";
/// Environment variable holding the Airtable personal access token.
pub const API_KEY_ENV: &str = "AIRTABLE_API_KEY";
/// Environment variable overriding `airtable.base_id`.
pub const BASE_ID_ENV: &str = "AIRTABLE_BASE_ID";

const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";

/// Root structure of the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    pub airtable: Option<AirtableSection>,
    pub host: Option<HostSection>,
    pub pacing: Option<PacingSection>,
    pub projects: Option<ProjectsSection>,
    /// Source status to destination status. Unlisted statuses are omitted.
    pub status_mapping: Option<BTreeMap<String, String>>,
}

/// `[airtable]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AirtableSection {
    pub base_id: Option<String>,
    pub api_url: Option<String>,
    pub document_table: Option<String>,
    pub asset_table: Option<String>,
    pub document_fields: Option<DocumentFieldsSection>,
    pub asset_fields: Option<AssetFieldsSection>,
}

/// `[airtable.document_fields]`. An empty string disables a field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentFieldsSection {
    pub title: Option<String>,
    pub content: Option<String>,
    pub status: Option<String>,
    pub source_id: Option<String>,
    pub tags: Option<String>,
    pub publish_date: Option<String>,
    pub project: Option<String>,
}

/// `[airtable.asset_fields]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AssetFieldsSection {
    pub caption: Option<String>,
    pub attachment: Option<String>,
    /// Static values written on every asset record (e.g. `Type = "Image"`).
    pub extra: Option<BTreeMap<String, String>>,
}

/// `[host]`: where the exported images are publicly reachable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostSection {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: Option<String>,
    pub image_path: Option<String>,
}

/// `[pacing]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PacingSection {
    pub delay_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub backoff_ms: Option<u64>,
    pub timeout_secs: Option<u64>,
}

/// `[projects]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectsSection {
    pub inbox_label: Option<String>,
    pub strip_roots: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
    /// Replaces the built-in rules when present. Order is significant.
    pub rules: Option<Vec<RuleSection>>,
}

/// `[[projects.rules]]`
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSection {
    pub prefix: Vec<String>,
    pub label: String,
}

impl ConfigFile {
    /// Load a config file. Returns an error if it is missing or malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

/// Destination table field names for documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFields {
    pub title: String,
    pub content: String,
    pub status: Option<String>,
    pub source_id: Option<String>,
    pub tags: Option<String>,
    pub publish_date: Option<String>,
    pub project: Option<String>,
}

impl Default for DocumentFields {
    fn default() -> Self {
        Self {
            title: "Title".to_string(),
            content: "Content".to_string(),
            status: Some("Status".to_string()),
            source_id: Some("Notion_ID".to_string()),
            tags: Some("Notion_Tag".to_string()),
            publish_date: Some("Publish_Date".to_string()),
            project: Some("Import_Project".to_string()),
        }
    }
}

/// Destination table field names for assets
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFields {
    pub caption: String,
    pub attachment: String,
    pub extra: BTreeMap<String, String>,
}

impl Default for AssetFields {
    fn default() -> Self {
        Self {
            caption: "Caption".to_string(),
            attachment: "Attachment".to_string(),
            extra: BTreeMap::new(),
        }
    }
}

/// Resolved `[airtable]` settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirtableConfig {
    /// Base id from the file; the CLI and environment may override it.
    pub base_id: Option<String>,
    pub api_url: String,
    pub document_table: String,
    pub asset_table: String,
    pub document_fields: DocumentFields,
    pub asset_fields: AssetFields,
}

impl Default for AirtableConfig {
    fn default() -> Self {
        Self {
            base_id: None,
            api_url: DEFAULT_API_URL.to_string(),
            document_table: "DOCUMENT".to_string(),
            asset_table: "ASSET".to_string(),
            document_fields: DocumentFields::default(),
            asset_fields: AssetFields::default(),
        }
    }
}

/// Resolved `[host]` settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch: String,
    pub image_path: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            owner: None,
            repo: None,
            branch: "main".to_string(),
            image_path: "notion_export/images".to_string(),
        }
    }
}

/// Resolved `[pacing]` settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    /// Fixed delay after every remote call
    pub delay: Duration,
    /// Attempts per call when rate limited, including the first
    pub max_attempts: u32,
    /// Base backoff, doubled on every retry
    pub backoff: Duration,
    pub timeout: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(250),
            max_attempts: 5,
            backoff: Duration::from_millis(1000),
            timeout: Duration::from_secs(30),
        }
    }
}

impl PacingConfig {
    /// No delays at all, for tests and in-memory stores.
    pub fn immediate() -> Self {
        Self {
            delay: Duration::ZERO,
            backoff: Duration::ZERO,
            ..Self::default()
        }
    }
}

/// Maps source statuses to destination statuses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMapping(BTreeMap<String, String>);

impl StatusMapping {
    pub fn new(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }

    /// Destination status, or `None` when the status should be omitted.
    pub fn map(&self, status: &str) -> Option<&str> {
        self.0
            .get(status)
            .map(String::as_str)
            .filter(|mapped| !mapped.is_empty())
    }
}

impl Default for StatusMapping {
    fn default() -> Self {
        let pairs = [
            ("Published", "Published"),
            ("Inbox", "Inbox"),
            ("Imported", "Inbox"),
            ("#reference", "Inbox"),
            ("#idea", "Inbox"),
        ];
        Self(
            pairs
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        )
    }
}

/// Effective configuration handed to every stage
#[derive(Debug, Clone)]
pub struct MigrateConfig {
    pub airtable: AirtableConfig,
    pub host: HostConfig,
    pub pacing: PacingConfig,
    pub status_mapping: StatusMapping,
    pub classifier: ProjectClassifier,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            airtable: AirtableConfig::default(),
            host: HostConfig::default(),
            pacing: PacingConfig::default(),
            status_mapping: StatusMapping::default(),
            classifier: ProjectClassifier::default(),
        }
    }
}

impl MigrateConfig {
    /// Load the effective configuration.
    ///
    /// An explicit path must exist. Without one, `notion-migrate.toml` in
    /// `working_dir` is used when present, otherwise the defaults.
    pub fn load(explicit: Option<&Path>, working_dir: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(ConfigFile::load(path)?),
            None => {
                let path = working_dir.join(CONFIG_FILE);
                if path.exists() {
                    Self::from_file(ConfigFile::load(&path)?)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content).context("Failed to parse config")?;
        Self::from_file(file)
    }

    /// Resolve every section of `file` against the defaults.
    pub fn from_file(file: ConfigFile) -> Result<Self> {
        let defaults = Self::default();

        let airtable = match file.airtable {
            Some(section) => resolve_airtable(section),
            None => defaults.airtable,
        };

        let host = match file.host {
            Some(section) => HostConfig {
                owner: non_empty(section.owner),
                repo: non_empty(section.repo),
                branch: section.branch.unwrap_or(defaults.host.branch),
                image_path: section
                    .image_path
                    .map(|p| p.trim_matches('/').to_string())
                    .unwrap_or(defaults.host.image_path),
            },
            None => defaults.host,
        };

        let pacing = match file.pacing {
            Some(section) => {
                let base = defaults.pacing;
                let max_attempts = section.max_attempts.unwrap_or(base.max_attempts);
                if max_attempts == 0 {
                    return Err(anyhow!("Invalid pacing.max_attempts: must be at least 1"));
                }
                PacingConfig {
                    delay: section
                        .delay_ms
                        .map(Duration::from_millis)
                        .unwrap_or(base.delay),
                    max_attempts,
                    backoff: section
                        .backoff_ms
                        .map(Duration::from_millis)
                        .unwrap_or(base.backoff),
                    timeout: section
                        .timeout_secs
                        .map(Duration::from_secs)
                        .unwrap_or(base.timeout),
                }
            }
            None => defaults.pacing,
        };

        let status_mapping = file
            .status_mapping
            .map(StatusMapping::new)
            .unwrap_or(defaults.status_mapping);

        let classifier = match file.projects {
            Some(section) => resolve_projects(section)?,
            None => defaults.classifier,
        };

        Ok(Self {
            airtable,
            host,
            pacing,
            status_mapping,
            classifier,
        })
    }

    /// Base id by priority: command line, `AIRTABLE_BASE_ID`, config file.
    pub fn base_id(
        &self,
        cli: Option<&str>,
        env: Option<String>,
    ) -> std::result::Result<String, MigrateError> {
        cli.map(str::to_string)
            .or(env)
            .or_else(|| self.airtable.base_id.clone())
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| MigrateError::MissingSetting {
                setting: format!("airtable.base_id (or {})", BASE_ID_ENV),
            })
    }
}

fn resolve_airtable(section: AirtableSection) -> AirtableConfig {
    let defaults = AirtableConfig::default();

    let document_fields = match section.document_fields {
        Some(fields) => {
            let base = DocumentFields::default();
            DocumentFields {
                title: fields.title.unwrap_or(base.title),
                content: fields.content.unwrap_or(base.content),
                status: optional_field(fields.status, base.status),
                source_id: optional_field(fields.source_id, base.source_id),
                tags: optional_field(fields.tags, base.tags),
                publish_date: optional_field(fields.publish_date, base.publish_date),
                project: optional_field(fields.project, base.project),
            }
        }
        None => defaults.document_fields,
    };

    let asset_fields = match section.asset_fields {
        Some(fields) => {
            let base = AssetFields::default();
            AssetFields {
                caption: fields.caption.unwrap_or(base.caption),
                attachment: fields.attachment.unwrap_or(base.attachment),
                extra: fields.extra.unwrap_or_default(),
            }
        }
        None => defaults.asset_fields,
    };

    AirtableConfig {
        base_id: non_empty(section.base_id),
        api_url: section
            .api_url
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.api_url),
        document_table: section.document_table.unwrap_or(defaults.document_table),
        asset_table: section.asset_table.unwrap_or(defaults.asset_table),
        document_fields,
        asset_fields,
    }
}

fn resolve_projects(section: ProjectsSection) -> Result<ProjectClassifier> {
    let rules = match section.rules {
        Some(rules) => rules
            .iter()
            .map(|rule| {
                let prefix: Vec<&str> = rule.prefix.iter().map(String::as_str).collect();
                ProjectRule::new(&prefix, &rule.label)
            })
            .collect::<Result<Vec<_>>>()
            .context("Invalid [[projects.rules]] entry")?,
        None => ProjectClassifier::default_rules(),
    };

    Ok(ProjectClassifier::new(rules)
        .with_strip_roots(
            section
                .strip_roots
                .unwrap_or_else(|| vec!["Private & Shared".to_string()]),
        )
        .with_exclude(section.exclude.unwrap_or_default())
        .with_inbox_label(non_empty(section.inbox_label).unwrap_or_else(|| INBOX.to_string())))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// A configured field name; an explicit empty string disables the field.
fn optional_field(configured: Option<String>, default: Option<String>) -> Option<String> {
    match configured {
        Some(name) if name.trim().is_empty() => None,
        Some(name) => Some(name),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        let config = MigrateConfig::load(None, temp.path()).unwrap();
        assert_eq!(config.airtable.document_table, "DOCUMENT");
        assert_eq!(config.airtable.asset_table, "ASSET");
        assert_eq!(config.airtable.document_fields.project.as_deref(), Some("Import_Project"));
        assert_eq!(config.pacing.delay, Duration::from_millis(250));
        assert_eq!(config.classifier.rules().len(), 4);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(MigrateConfig::load(Some(&missing), temp.path()).is_err());
    }

    #[test]
    fn test_load_from_working_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE),
            "[airtable]\nbase_id = \"appTEST\"\n",
        )
        .unwrap();
        let config = MigrateConfig::load(None, temp.path()).unwrap();
        assert_eq!(config.airtable.base_id.as_deref(), Some("appTEST"));
    }

    #[test]
    fn test_parse_full_config() {
        let config = MigrateConfig::from_toml(
            r#"
[airtable]
base_id = "appXYZ"
api_url = "http://localhost:9999/v0/"
document_table = "Docs"

[airtable.document_fields]
tags = ""
project = "Project"

[airtable.asset_fields]
caption = "Name"

[airtable.asset_fields.extra]
Type = "Image"

[host]
owner = "acme"
repo = "export"
image_path = "/export/images/"

[pacing]
delay_ms = 0
max_attempts = 2

[status_mapping]
Done = "Published"

[projects]
inbox_label = "Unsorted"
exclude = ["Archive"]

[[projects.rules]]
prefix = ["Clients", "*"]
label = "{1}"

[[projects.rules]]
prefix = ["Clients"]
label = "Clients"
"#,
        )
        .unwrap();

        assert_eq!(config.airtable.api_url, "http://localhost:9999/v0");
        assert_eq!(config.airtable.document_table, "Docs");
        assert_eq!(config.airtable.asset_table, "ASSET");
        assert_eq!(config.airtable.document_fields.tags, None);
        assert_eq!(config.airtable.document_fields.project.as_deref(), Some("Project"));
        assert_eq!(config.airtable.asset_fields.caption, "Name");
        assert_eq!(config.airtable.asset_fields.extra.get("Type").unwrap(), "Image");
        assert_eq!(config.host.owner.as_deref(), Some("acme"));
        assert_eq!(config.host.branch, "main");
        assert_eq!(config.host.image_path, "export/images");
        assert_eq!(config.pacing.delay, Duration::ZERO);
        assert_eq!(config.pacing.max_attempts, 2);
        assert_eq!(config.status_mapping.map("Done"), Some("Published"));
        assert_eq!(config.status_mapping.map("Published"), None);

        let classifier = &config.classifier;
        assert_eq!(classifier.rules().len(), 2);
        assert_eq!(classifier.classify(&["Clients", "Acme"]), "Acme");
        assert_eq!(classifier.classify(&["Archive", "x"]), "Unsorted");
    }

    #[test]
    fn test_invalid_rule_is_rejected() {
        let result = MigrateConfig::from_toml(
            r#"
[[projects.rules]]
prefix = ["Clients"]
label = "{3}"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_attempts_is_rejected() {
        assert!(MigrateConfig::from_toml("[pacing]\nmax_attempts = 0\n").is_err());
    }

    #[test]
    fn test_default_status_mapping() {
        let mapping = StatusMapping::default();
        assert_eq!(mapping.map("Imported"), Some("Inbox"));
        assert_eq!(mapping.map("#idea"), Some("Inbox"));
        assert_eq!(mapping.map("Published"), Some("Published"));
        assert_eq!(mapping.map("Something else"), None);
    }

    #[test]
    fn test_base_id_priority() {
        let mut config = MigrateConfig::default();
        config.airtable.base_id = Some("appFILE".to_string());

        assert_eq!(config.base_id(Some("appCLI"), Some("appENV".into())).unwrap(), "appCLI");
        assert_eq!(config.base_id(None, Some("appENV".into())).unwrap(), "appENV");
        assert_eq!(config.base_id(None, None).unwrap(), "appFILE");

        config.airtable.base_id = None;
        let err = config.base_id(None, None).unwrap_err();
        assert!(err.to_string().contains("airtable.base_id"));
    }
}
