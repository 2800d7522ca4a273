//! Export, upload and import a small workspace against the in-memory store.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use notion_migrate::domain::Document;
use notion_migrate::export::Exporter;
use notion_migrate::files::{read_json, ExportLayout};
use notion_migrate::host::ImageHost;
use notion_migrate::import::DocumentImporter;
use notion_migrate::upload::{list_images, load_asset_map, save_asset_map, AssetUploader};
use notion_migrate::{AssetMap, InMemoryStore, MigrateConfig, RunReport};

const X_ID: &str = "281fc2711b808049b837d239a4b31baf";
const Y_ID: &str = "9a0b1c2d3e4f50617283940a1b2c3d4e";

fn write(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn workspace() -> TempDir {
    let source = TempDir::new().unwrap();
    write(
        source.path(),
        &format!("Projekt/Forefront/x {}.md", X_ID),
        b"# x\n\nStatus: Published\n\nRoadmap ![](x/shot.png) done.\n",
    );
    write(source.path(), "Projekt/Forefront/x/shot.png", b"\x89PNG");
    write(
        source.path(),
        &format!("Politik/y {}.md", Y_ID),
        b"# y\n\nSee ![[missing.png]]\n",
    );
    write(source.path(), "z.md", b"# z\n\nLoose note\n");
    source
}

#[test]
fn test_full_migration() {
    let source = workspace();
    let out = TempDir::new().unwrap();
    let config = MigrateConfig::default();

    let summary = Exporter::new(&config.classifier)
        .export(source.path(), out.path())
        .unwrap();
    assert_eq!(summary.documents, 3);
    assert_eq!(summary.images, 1);
    assert_eq!(summary.broken.len(), 1);

    let layout = ExportLayout::existing(out.path()).unwrap();
    let broken = fs::read_to_string(layout.broken_images()).unwrap();
    assert_eq!(broken.lines().count(), 1);
    assert!(broken.contains("![[missing.png]]"));

    let store = InMemoryStore::new();
    let host = ImageHost::with_base("https://img.example.com");
    let mut report = RunReport::new();

    let images = list_images(&layout.images_dir()).unwrap();
    assert_eq!(images, vec!["281fc271_shot.png".to_string()]);
    let mut assets = AssetMap::new();
    AssetUploader::new(&store, &config.airtable, &host)
        .with_reachability_check(|_| true)
        .upload_all(&images, &mut assets, &mut report)
        .unwrap();
    save_asset_map(&layout.asset_map(), &assets).unwrap();
    assert_eq!(store.records("ASSET").len(), 1);
    assert_eq!(report.assets.created, 1);

    let documents: Vec<Document> = read_json(&layout.content_json()).unwrap();
    let assets = load_asset_map(&layout.asset_map()).unwrap();
    DocumentImporter::new(&store, &config)
        .import(&documents, &assets, &mut report)
        .unwrap();

    let records = store.records("DOCUMENT");
    assert_eq!(records.len(), 3);
    assert_eq!(report.documents.created, 3);
    assert_eq!(report.substitutions, 1);
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].document, Y_ID);

    let projects: BTreeSet<&str> = records
        .iter()
        .filter_map(|r| r.text("Import_Project"))
        .collect();
    assert_eq!(
        projects,
        ["Forefront", "Inbox", "Politik"].into_iter().collect()
    );

    let x = records
        .iter()
        .find(|r| r.text("Title") == Some("x"))
        .unwrap();
    let content = x.text("Content").unwrap();
    assert!(content.contains("\nRoadmap ![shot](asset:rec"));
    assert!(content.ends_with(" done."));
    assert_eq!(x.text("Status"), Some("Published"));
    assert_eq!(x.text("Notion_ID"), Some(X_ID));
}

#[test]
fn test_reexport_clears_stale_broken_list() {
    let source = workspace();
    let out = TempDir::new().unwrap();
    let config = MigrateConfig::default();
    let exporter = Exporter::new(&config.classifier);

    exporter.export(source.path(), out.path()).unwrap();
    assert!(out.path().join("broken_images.txt").exists());

    write(source.path(), "Politik/missing.png", b"\x89PNG");
    let summary = exporter.export(source.path(), out.path()).unwrap();
    assert!(summary.broken.is_empty());
    assert_eq!(summary.images, 2);
    assert!(!out.path().join("broken_images.txt").exists());
}
