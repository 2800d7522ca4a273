//! Fatal run errors and actionable error formatting.
//!
//! Per-item problems (one image failing to upload, one unresolved reference)
//! are collected into the run report. The errors here stop a run: they mean
//! the configuration is wrong and every following call would fail the same
//! way. Each one renders as an [`ActionableError`] naming the setting to fix.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::config::{API_KEY_ENV, CONFIG_FILE};
use crate::output::ExitCode;
use crate::store::StoreError;

/// An error with diagnostic context and remediation steps.
///
/// # Example
///
/// ```
/// use notion_migrate::errors::ActionableError;
///
/// let error = ActionableError::new("Table ASSET not found")
///     .with_cause("The base id may point at another base")
///     .with_remedy("Set [airtable] asset_table in notion-migrate.toml");
///
/// eprintln!("{}", error);
/// ```
#[derive(Debug, Clone)]
pub struct ActionableError {
    error: String,
    causes: Vec<String>,
    remediation: Vec<String>,
}

impl ActionableError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            causes: Vec::new(),
            remediation: Vec::new(),
        }
    }

    /// Add a possible cause (diagnostic hint).
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Add a remediation step.
    pub fn with_remedy(mut self, remedy: impl Into<String>) -> Self {
        self.remediation.push(remedy.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.error
    }

    pub fn remedies(&self) -> &[String] {
        &self.remediation
    }

    /// Convert to a formatted error message suitable for display.
    pub fn to_error_message(&self) -> String {
        let mut msg = format!("Error: {}\n", self.error);

        if !self.causes.is_empty() {
            msg.push_str("\nPossible causes:\n");
            for cause in &self.causes {
                msg.push_str(&format!("  • {}\n", cause));
            }
        }

        if !self.remediation.is_empty() {
            msg.push_str("\nTo fix:\n");
            for remedy in &self.remediation {
                msg.push_str(&format!("  • {}\n", remedy));
            }
        }

        msg
    }
}

impl fmt::Display for ActionableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_error_message())
    }
}

impl std::error::Error for ActionableError {}

/// Errors that abort a whole run
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error("{var} is not set")]
    MissingCredential { var: String },

    #[error("missing required setting {setting}")]
    MissingSetting { setting: String },

    #[error("input not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    /// A store error that would repeat for every item
    #[error("destination rejected the request: {0}")]
    Destination(#[from] StoreError),
}

impl MigrateError {
    pub fn missing_credential() -> Self {
        MigrateError::MissingCredential {
            var: API_KEY_ENV.to_string(),
        }
    }

    pub fn input_not_found(path: impl Into<PathBuf>) -> Self {
        MigrateError::InputNotFound { path: path.into() }
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            MigrateError::MissingCredential { .. } | MigrateError::MissingSetting { .. } => {
                ExitCode::ConfigError
            }
            MigrateError::InputNotFound { .. } => ExitCode::NotFound,
            MigrateError::Destination(StoreError::Transport(_)) => ExitCode::ExternalError,
            MigrateError::Destination(_) => ExitCode::ConfigError,
        }
    }

    /// Operator-facing rendering with causes and remedies.
    pub fn to_actionable(&self) -> ActionableError {
        match self {
            MigrateError::MissingCredential { var } => {
                ActionableError::new(format!("{} is not set", var))
                    .with_cause("The Airtable personal access token is read from the environment only")
                    .with_remedy(format!("Export the token: export {}=<token>", var))
            }
            MigrateError::MissingSetting { setting } => {
                ActionableError::new(format!("Missing required setting {}", setting))
                    .with_remedy(format!("Set it in {} or pass it on the command line", CONFIG_FILE))
            }
            MigrateError::InputNotFound { path } => {
                ActionableError::new(format!("Input not found: {}", path.display()))
                    .with_cause("The path may be misspelled")
                    .with_cause("The export step may not have been run yet")
                    .with_remedy("Create the export first: notion-migrate export <SOURCE> <OUTPUT>")
            }
            MigrateError::Destination(err) => store_error(err),
        }
    }
}

/// Actionable rendering of a fatal store error.
pub fn store_error(err: &StoreError) -> ActionableError {
    match err {
        StoreError::ComputedField { field } => computed_field(field),
        StoreError::UnknownField { field } => ActionableError::new(format!(
            "Unknown field name: {}",
            field
        ))
        .with_cause("The destination table has no field with this name")
        .with_remedy(format!(
            "Rename the field in the table or map it under [airtable.document_fields] / [airtable.asset_fields] in {}",
            CONFIG_FILE
        )),
        StoreError::Unauthorized { message } => {
            ActionableError::new(format!("Airtable refused the credential: {}", message))
                .with_cause("The token may be expired or revoked")
                .with_cause("The token may lack access to this base")
                .with_remedy(format!("Create a token with data.records:write scope and export {}", API_KEY_ENV))
        }
        StoreError::NotFound { message } => {
            ActionableError::new(format!("Base or table not found: {}", message))
                .with_cause("The base id may be wrong")
                .with_cause("The table name may differ from the configured one")
                .with_remedy(format!(
                    "Check airtable.base_id, document_table and asset_table in {}",
                    CONFIG_FILE
                ))
        }
        other => ActionableError::new(other.to_string())
            .with_remedy("Check network access to the Airtable API and retry"),
    }
}

/// A write was rejected because the target field is computed.
pub fn computed_field(field: &str) -> ActionableError {
    ActionableError::new(format!(
        "Field {} is computed and cannot be written",
        field
    ))
    .with_cause("Formula, lookup, rollup and created-time fields are derived by Airtable")
    .with_remedy(format!(
        "Map the value to a writable field in {} or disable it with an empty name",
        CONFIG_FILE
    ))
}
