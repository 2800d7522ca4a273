//! Export stage: flatten an unpacked Notion export into the intermediate form.
//!
//! Walks the source tree, turns every Markdown page into a [`Document`],
//! copies the images it references into `<out>/images/<prefix>_<name>` and
//! points the page body at the copies. Two different files wanting the same
//! name get `-2`, `-3`, ... appended to the later one's stem.
//!
//! References are kept as written and listed in `broken_images.txt` when the
//! file does not exist, lies outside the export directory or cannot be copied.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::classify::ProjectClassifier;
use crate::document::{
    file_stem, parse_properties, scan_references, title_from_filename, CsvMetadata,
    PrefixedFilename, SourceId,
};
use crate::domain::{BrokenReference, Document};
use crate::errors::MigrateError;
use crate::files::{write_json, ExportLayout};

/// Directories macOS adds to zipped exports
const SKIPPED_DIR: &str = "__MACOSX";

/// What an export produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub documents: usize,
    /// Distinct image files copied into the images directory
    pub images: usize,
    /// Document count per project label
    pub projects: BTreeMap<String, usize>,
    pub broken: Vec<BrokenReference>,
    /// Pages that could not be read
    pub skipped: Vec<String>,
}

impl ExportSummary {
    pub fn render(&self) -> String {
        let mut out = format!(
            "Exported {} documents and {} images\n\nProjects:\n",
            self.documents, self.images
        );
        for (project, count) in &self.projects {
            out.push_str(&format!("  {:<30} {}\n", project, count));
        }
        if !self.broken.is_empty() {
            out.push_str(&format!("\nBroken image references: {}\n", self.broken.len()));
        }
        if !self.skipped.is_empty() {
            out.push_str(&format!("Unreadable pages skipped: {}\n", self.skipped.len()));
        }
        out
    }
}

/// One row of `content.csv`
#[derive(Serialize)]
struct CsvRow<'a> {
    title: &'a str,
    content: &'a str,
    notion_id: &'a str,
    project: &'a str,
    source_file: &'a str,
    status: &'a str,
    tags: String,
    publish_date: &'a str,
}

pub struct Exporter<'a> {
    classifier: &'a ProjectClassifier,
}

impl<'a> Exporter<'a> {
    pub fn new(classifier: &'a ProjectClassifier) -> Self {
        Self { classifier }
    }

    /// Export `source` into `output`, writing every output file.
    pub fn export(&self, source: &Path, output: &Path) -> Result<ExportSummary> {
        if !source.is_dir() {
            return Err(MigrateError::input_not_found(source).into());
        }
        let layout = ExportLayout::new(output);
        fs::create_dir_all(layout.images_dir()).with_context(|| {
            format!("Failed to create output directory: {}", output.display())
        })?;

        let (pages, tables) = collect_files(source);
        info!(pages = pages.len(), tables = tables.len(), "scanning export");

        let mut csv = CsvMetadata::new();
        for table in &tables {
            match csv.load_file(&source.join(table)) {
                Ok(rows) => debug!(file = %table, rows, "loaded database metadata"),
                Err(e) => warn!(file = %table, error = %e, "skipping unreadable CSV"),
            }
        }

        let mut summary = ExportSummary::default();
        let mut documents = Vec::new();
        let mut copies = ImageCopies::new(source, layout.images_dir())?;

        for relative in &pages {
            let path = source.join(relative);
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(file = %relative, error = %e, "skipping unreadable page");
                    summary.skipped.push(relative.clone());
                    continue;
                }
            };
            let content = String::from_utf8_lossy(&bytes).into_owned();
            let document = self.build_document(
                relative,
                &path,
                content,
                &csv,
                &mut copies,
                &mut summary.broken,
            );
            *summary.projects.entry(document.project.clone()).or_default() += 1;
            documents.push(document);
        }

        summary.documents = documents.len();
        summary.images = copies.len();
        write_outputs(&layout, &documents, &copies.names(), &summary.broken)?;
        info!(
            documents = summary.documents,
            images = summary.images,
            broken = summary.broken.len(),
            "export complete"
        );
        Ok(summary)
    }

    fn build_document(
        &self,
        relative: &str,
        path: &Path,
        content: String,
        csv: &CsvMetadata,
        copies: &mut ImageCopies,
        broken: &mut Vec<BrokenReference>,
    ) -> Document {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let notion_id = SourceId::from_filename(&filename);

        let mut meta = parse_properties(&content);
        let mut title = title_from_filename(path);
        // Untitled pages are exported as the bare id
        let bare_id = notion_id.as_ref().is_some_and(|id| id.as_str() == title);
        if title.is_empty() || bare_id {
            title = meta.heading.clone().unwrap_or_default();
        }
        if let Some(row) = csv.get(&title) {
            meta.merge_missing(row);
        }

        let project = self.classifier.classify_path(Path::new(relative));
        let key = notion_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_else(|| relative.to_string());
        let prefix = notion_id.as_ref().map(|id| id.prefix().to_string());
        let doc_dir = path.parent().unwrap_or(Path::new(""));

        let mut body = String::with_capacity(content.len());
        let mut images = Vec::new();
        let mut cursor = 0;
        for reference in scan_references(&content) {
            body.push_str(&content[cursor..reference.span.start]);
            cursor = reference.span.end;
            images.push(reference.raw.clone());

            let image_path = doc_dir.join(&reference.path);
            let wanted = match &prefix {
                Some(prefix) => PrefixedFilename::new(prefix.as_str(), reference.filename.as_str()),
                None => PrefixedFilename::unprefixed(reference.filename.as_str()),
            };
            let placed = if image_path.is_file() {
                copies.place(&image_path, &wanted)
            } else {
                debug!(document = %key, reference = %reference.raw, "image file missing");
                None
            };
            let Some(target) = placed else {
                broken.push(BrokenReference {
                    document: key.clone(),
                    reference: reference.raw.clone(),
                });
                body.push_str(&reference.raw);
                continue;
            };

            let caption = reference
                .caption
                .clone()
                .unwrap_or_else(|| file_stem(&reference.filename).to_string());
            body.push_str(&format!("![{}]({})", caption, urlencoding::encode(&target)));
        }
        body.push_str(&content[cursor..]);

        Document {
            title,
            content: body,
            status: meta.status,
            notion_id,
            tags: meta.tags,
            publish_date: meta.publish_date,
            project,
            source_file: relative.to_string(),
            images,
        }
    }
}

/// Images copied into the output so far, keyed by output name.
struct ImageCopies {
    /// Canonical export directory; nothing outside it is copied
    root: PathBuf,
    dir: PathBuf,
    sources: BTreeMap<String, PathBuf>,
}

impl ImageCopies {
    fn new(source: &Path, dir: PathBuf) -> Result<Self> {
        let root = source
            .canonicalize()
            .with_context(|| format!("Failed to resolve export directory: {}", source.display()))?;
        Ok(Self {
            root,
            dir,
            sources: BTreeMap::new(),
        })
    }

    /// Copy `path` into the images directory and return its output name.
    ///
    /// The name is `wanted` unless a different file already holds it. `None`
    /// when the file lies outside the export or the copy fails.
    fn place(&mut self, path: &Path, wanted: &PrefixedFilename) -> Option<String> {
        let real = match path.canonicalize() {
            Ok(real) => real,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot resolve image");
                return None;
            }
        };
        if !real.starts_with(&self.root) {
            warn!(path = %path.display(), "image lies outside the export; not copied");
            return None;
        }

        let mut candidate = wanted.clone();
        let mut n = 1;
        loop {
            let name = candidate.to_string();
            match self.sources.get(&name) {
                Some(existing) if *existing == real => return Some(name),
                Some(_) => {
                    n += 1;
                    candidate = wanted.numbered(n);
                }
                None => {
                    if let Err(e) = fs::copy(&real, self.dir.join(&name)) {
                        warn!(path = %real.display(), error = %e, "failed to copy image");
                        return None;
                    }
                    if n > 1 {
                        debug!(wanted = %wanted, name = %name, "image name taken; renamed copy");
                    }
                    self.sources.insert(name.clone(), real);
                    return Some(name);
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.sources.len()
    }

    fn names(&self) -> Vec<&str> {
        self.sources.keys().map(String::as_str).collect()
    }
}

/// Markdown pages and CSV tables under `source`, as sorted `/`-separated
/// relative paths.
fn collect_files(source: &Path) -> (Vec<String>, Vec<String>) {
    let mut pages = Vec::new();
    let mut tables = Vec::new();

    let walker = WalkDir::new(source)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != SKIPPED_DIR);

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable path");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let relative = to_slash_path(relative);
        let extension = entry
            .path()
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        match extension.as_deref() {
            Some("md") => pages.push(relative),
            Some("csv") => tables.push(relative),
            _ => {}
        }
    }

    (pages, tables)
}

fn to_slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn write_outputs(
    layout: &ExportLayout,
    documents: &[Document],
    images: &[&str],
    broken: &[BrokenReference],
) -> Result<()> {
    write_json(&layout.content_json(), documents)?;

    let mut writer = csv::Writer::from_path(layout.content_csv())
        .with_context(|| format!("Failed to create {}", layout.content_csv().display()))?;
    for doc in documents {
        writer
            .serialize(CsvRow {
                title: &doc.title,
                content: &doc.content,
                notion_id: doc.notion_id.as_ref().map(|id| id.as_str()).unwrap_or(""),
                project: &doc.project,
                source_file: &doc.source_file,
                status: doc.status.as_deref().unwrap_or(""),
                tags: doc.tags.iter().cloned().collect::<Vec<_>>().join(", "),
                publish_date: doc.publish_date.as_deref().unwrap_or(""),
            })
            .context("Failed to write CSV row")?;
    }
    writer.flush().context("Failed to flush content.csv")?;

    let projects: BTreeSet<&str> = documents.iter().map(|d| d.project.as_str()).collect();
    write_json(&layout.projects_json(), &projects)?;
    write_json(&layout.images_json(), images)?;

    let broken_path = layout.broken_images();
    if broken.is_empty() {
        if broken_path.exists() {
            fs::remove_file(&broken_path).with_context(|| {
                format!("Failed to remove stale {}", broken_path.display())
            })?;
        }
    } else {
        let lines: String = broken
            .iter()
            .map(|b| format!("{}\t{}\n", b.document, b.reference))
            .collect();
        fs::write(&broken_path, lines)
            .with_context(|| format!("Failed to write {}", broken_path.display()))?;
    }

    Ok(())
}
