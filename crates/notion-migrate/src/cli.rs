//! Command-line interface definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::output::ExitCode;

/// Notion export to Airtable migrator
///
/// Flattens a Notion workspace export into a tree file, uploads its images as
/// Airtable asset records and imports every page as a document record whose
/// image references point at those assets.
///
/// The Airtable token is read from AIRTABLE_API_KEY. The base id comes from
/// the BASE_ID argument, then AIRTABLE_BASE_ID, then notion-migrate.toml.
#[derive(Parser)]
#[command(name = "notion-migrate", version)]
#[command(about = "Migrate a Notion export into Airtable", long_about = None)]
#[command(after_help = ExitCode::help_table())]
pub struct Cli {
    /// Config file (default: ./notion-migrate.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print one JSON envelope instead of human-readable output
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress non-essential output (for scripting)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log debug detail (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Flatten a Notion export into content.json, content.csv and images/
    Export {
        /// Unpacked Notion export directory
        source: PathBuf,

        /// Output directory (created if missing)
        output: PathBuf,
    },

    /// Upload exported images as asset records and write asset_map.json
    Images(RemoteArgs),

    /// Import documents, rewriting image references with asset_map.json
    Documents(RemoteArgs),

    /// Upload images, then import documents
    Run(RemoteArgs),

    /// Attach images to documents that were imported without them
    ///
    /// Images are grouped by their 8-character prefix, matched to the document
    /// whose source id starts with it, and appended to its content.
    Attach(RemoteArgs),

    /// Strip stray whitespace and quotes from a content.json in place
    Clean {
        /// Path to content.json
        content: PathBuf,
    },
}

impl Commands {
    /// Subcommand name as used in JSON envelopes
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Export { .. } => "export",
            Commands::Images(_) => "images",
            Commands::Documents(_) => "documents",
            Commands::Run(_) => "run",
            Commands::Attach(_) => "attach",
            Commands::Clean { .. } => "clean",
        }
    }
}

/// Arguments shared by the commands that talk to Airtable
#[derive(Args, Debug, Clone)]
pub struct RemoteArgs {
    /// Directory written by `export`
    pub export_dir: PathBuf,

    /// Airtable base id (overrides AIRTABLE_BASE_ID and the config file)
    pub base_id: Option<String>,
}
