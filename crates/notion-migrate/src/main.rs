//! Notion Export to Airtable Migrator
//!
//! Command-line entry point. Stages:
//!
//! - `export`: flatten an unpacked Notion export into content.json and images/
//! - `images`: upload the images as asset records
//! - `documents`: import pages with their image references rewritten
//! - `run`: `images` followed by `documents`
//! - `attach`: append images to documents imported without them
//! - `clean`: tidy the string values of an existing content.json

use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use tracing_subscriber::EnvFilter;

use notion_migrate::attach::Attacher;
use notion_migrate::clean::clean_content;
use notion_migrate::cli::{Cli, Commands, RemoteArgs};
use notion_migrate::config::{MigrateConfig, API_KEY_ENV, BASE_ID_ENV};
use notion_migrate::domain::{AssetMap, Document};
use notion_migrate::errors::MigrateError;
use notion_migrate::export::Exporter;
use notion_migrate::files::{read_json, ExportLayout};
use notion_migrate::host::ImageHost;
use notion_migrate::import::DocumentImporter;
use notion_migrate::output::{ExitCode, OutputContext};
use notion_migrate::report::RunReport;
use notion_migrate::store::{AirtableStore, PacedStore, RecordStore};
use notion_migrate::upload::{list_images, load_asset_map, save_asset_map, AssetUploader};

/// Determine the exit code for a failed run
fn error_to_exit_code(error: &anyhow::Error) -> ExitCode {
    if let Some(err) = migrate_error(error) {
        return err.exit_code();
    }

    for cause in error.chain() {
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            return match io_error.kind() {
                std::io::ErrorKind::NotFound => ExitCode::NotFound,
                _ => ExitCode::GenericError,
            };
        }
    }

    ExitCode::GenericError
}

fn migrate_error(error: &anyhow::Error) -> Option<&MigrateError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<MigrateError>())
}

fn init_tracing(cli: &Cli) {
    let level = if cli.verbose {
        "debug"
    } else if cli.quiet || cli.json {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,notion_migrate={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli);

    let output = OutputContext::new(cli.quiet, cli.json);
    let command = cli.command.name();

    let exit_code = match run(cli, &output) {
        Ok(()) => ExitCode::Success,
        Err(e) => {
            let code = error_to_exit_code(&e);
            print_error(&e, code, &output, command);
            code
        }
    };

    if exit_code != ExitCode::Success {
        std::process::exit(exit_code.code());
    }
}

fn print_error(error: &anyhow::Error, code: ExitCode, output: &OutputContext, command: &str) {
    let actionable = migrate_error(error).map(MigrateError::to_actionable);
    let suggestions = actionable
        .as_ref()
        .map(|a| a.remedies().to_vec())
        .unwrap_or_default();
    let text = match &actionable {
        Some(actionable) => actionable.to_string(),
        None => format!("Error: {:#}\n", error),
    };

    if output
        .failure(command, code, &format!("{:#}", error), &suggestions, &text)
        .is_err()
    {
        eprintln!("Error: {:#}", error);
    }
}

fn run(cli: Cli, output: &OutputContext) -> Result<()> {
    let current_dir = env::current_dir().context("Failed to read working directory")?;
    let config = MigrateConfig::load(cli.config.as_deref(), &current_dir)?;

    match &cli.command {
        Commands::Export {
            source,
            output: target,
        } => {
            output.progress(format_args!(
                "Exporting {} into {}",
                source.display(),
                target.display()
            ))?;
            let summary = Exporter::new(&config.classifier).export(source, target)?;
            output.summary("export", &summary, &summary.render())?;
            for broken in &summary.broken {
                output.warning(format_args!(
                    "missing image in {}: {}",
                    broken.document, broken.reference
                ))?;
            }
        }

        Commands::Images(args) => {
            let layout = ExportLayout::existing(&args.export_dir)?;
            let store = connect(&config, args)?;
            let host = ImageHost::from_config(&config.host)?;
            let images = list_images(&layout.images_dir())?;

            let mut report = RunReport::new();
            upload_images(output, &store, &config, &host, &layout, &images, &mut report)?;
            output.summary("images", &report, &report.render())?;
        }

        Commands::Documents(args) => {
            let layout = ExportLayout::existing(&args.export_dir)?;
            let store = connect(&config, args)?;
            let documents: Vec<Document> = read_json(&layout.content_json())?;
            let assets = load_asset_map(&layout.asset_map())?;

            output.progress(format_args!("Importing {} documents", documents.len()))?;
            let mut report = RunReport::new();
            DocumentImporter::new(&store, &config).import(&documents, &assets, &mut report)?;
            output.summary("documents", &report, &report.render())?;
        }

        Commands::Run(args) => {
            let layout = ExportLayout::existing(&args.export_dir)?;
            let store = connect(&config, args)?;
            let host = ImageHost::from_config(&config.host)?;
            let documents: Vec<Document> = read_json(&layout.content_json())?;
            let images = list_images(&layout.images_dir())?;

            let mut report = RunReport::new();
            let assets =
                upload_images(output, &store, &config, &host, &layout, &images, &mut report)?;
            output.progress(format_args!("Importing {} documents", documents.len()))?;
            DocumentImporter::new(&store, &config).import(&documents, &assets, &mut report)?;
            output.summary("run", &report, &report.render())?;
        }

        Commands::Attach(args) => {
            let layout = ExportLayout::existing(&args.export_dir)?;
            let store = connect(&config, args)?;
            let host = ImageHost::from_config(&config.host)?;
            let images = list_images(&layout.images_dir())?;

            output.progress(format_args!("Attaching {} images", images.len()))?;
            let mut report = RunReport::new();
            let uploader = AssetUploader::new(&store, &config.airtable, &host);
            Attacher::new(&store, &config, uploader).attach(&images, &mut report)?;
            output.summary("attach", &report, &report.render())?;
        }

        Commands::Clean { content } => {
            let summary = clean_content(content)?;
            output.summary("clean", &summary, &summary.render())?;
        }
    }

    Ok(())
}

/// Upload `images` and write the asset map, also when a fatal store error
/// stopped the batch part way.
fn upload_images<S: RecordStore>(
    output: &OutputContext,
    store: &S,
    config: &MigrateConfig,
    host: &ImageHost,
    layout: &ExportLayout,
    images: &[String],
    report: &mut RunReport,
) -> Result<AssetMap> {
    output.progress(format_args!("Uploading {} images", images.len()))?;

    let mut assets = AssetMap::new();
    let uploaded = AssetUploader::new(store, &config.airtable, host).upload_all(
        images,
        &mut assets,
        report,
    );
    save_asset_map(&layout.asset_map(), &assets)?;
    output.progress(format_args!(
        "Asset map with {} entries written to {}",
        assets.len(),
        layout.asset_map().display()
    ))?;

    uploaded?;
    Ok(assets)
}

/// Airtable store for a remote stage. The token comes from the environment
/// only.
fn connect(config: &MigrateConfig, args: &RemoteArgs) -> Result<PacedStore<AirtableStore>> {
    let api_key = env::var(API_KEY_ENV)
        .ok()
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty())
        .ok_or_else(MigrateError::missing_credential)?;
    let base_id = config.base_id(args.base_id.as_deref(), env::var(BASE_ID_ENV).ok())?;

    let store = AirtableStore::new(
        &config.airtable.api_url,
        &base_id,
        &api_key,
        config.pacing.timeout,
    );
    Ok(PacedStore::new(store, config.pacing))
}
