//! Notion Export to Airtable Migrator Library
//!
//! Flattens a Notion workspace export, uploads its images as asset records
//! and imports every page as a document record whose image references point
//! at those assets. The binary is a thin layer over this library.

pub mod attach;
pub mod classify;
pub mod clean;
pub mod cli;
pub mod config;
pub mod document;
pub mod domain;
pub mod errors;
pub mod export;
pub mod files;
pub mod host;
pub mod import;
pub mod output;
pub mod report;
pub mod store;
pub mod upload;

// Re-export commonly used types
pub use classify::ProjectClassifier;
pub use config::MigrateConfig;
pub use domain::{Asset, AssetMap, Document};
pub use errors::{ActionableError, MigrateError};
pub use output::{Envelope, ExitCode, OutputContext};
pub use report::RunReport;
pub use store::{AirtableStore, InMemoryStore, PacedStore, RecordStore};
