//! Image reference scanning
//!
//! Recognizes the three image syntaxes found in Notion and Obsidian flavoured
//! exports. This is not a Markdown parser: anything that does not look like
//! one of these three forms is plain text.
//!
//! # Supported Syntax
//!
//! - Embeds: `![[name]]`
//! - Embeds with caption: `![[name|caption]]`
//! - Standard images: `![alt](path/name.ext)`
//!
//! # Excluded
//!
//! - Remote targets: `![x](https://example.com/image.png)`, `data:` URIs
//! - Already rewritten pointers: `![x](asset:rec123:att456)`

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::sync::LazyLock;

use super::filename::file_component;

static EMBED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[\[([^\]|\n]+)(?:\|([^\]\n]*))?\]\]").expect("valid embed pattern")
});

// Allows one level of balanced parentheses in the target, e.g. `Untitled%20(1).png`.
static STANDARD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[([^\]\n]*)\]\(((?:[^()\n]|\([^()\n]*\))+)\)").expect("valid image pattern")
});

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg"];

/// Which syntax a reference was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceSyntax {
    /// `![[name]]`
    Embed,
    /// `![[name|caption]]`
    EmbedWithCaption,
    /// `![alt](path)`
    Markdown,
}

/// One image reference found in a document body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Byte range of the raw text in the body
    pub span: Range<usize>,
    /// The matched text, exactly as written
    pub raw: String,
    /// Referenced path (percent-decoded for the standard form)
    pub path: String,
    /// Filename component of `path`
    pub filename: String,
    /// Caption or alt text, if one was given
    pub caption: Option<String>,
    pub syntax: ReferenceSyntax,
}

/// Find all image references in `body`, ordered by position.
///
/// Embeds are scanned first; a standard-form match overlapping an embed span
/// is discarded, so the returned spans never overlap.
///
/// ```
/// use notion_migrate::document::scan_references;
///
/// let refs = scan_references("intro ![[a.png|Chart]] and ![Logo](img/logo.png)");
/// assert_eq!(refs.len(), 2);
/// assert_eq!(refs[0].filename, "a.png");
/// assert_eq!(refs[0].caption.as_deref(), Some("Chart"));
/// assert_eq!(refs[1].filename, "logo.png");
/// ```
pub fn scan_references(body: &str) -> Vec<ImageReference> {
    let mut references: Vec<ImageReference> = Vec::new();

    for caps in EMBED.captures_iter(body) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let path = name.as_str().trim();
        if path.is_empty() {
            continue;
        }
        let caption = caps
            .get(2)
            .map(|c| c.as_str().trim())
            .filter(|c| !c.is_empty())
            .map(String::from);
        let syntax = if caps.get(2).is_some() {
            ReferenceSyntax::EmbedWithCaption
        } else {
            ReferenceSyntax::Embed
        };
        references.push(ImageReference {
            span: whole.range(),
            raw: whole.as_str().to_string(),
            path: path.to_string(),
            filename: file_component(path).to_string(),
            caption,
            syntax,
        });
    }

    for caps in STANDARD.captures_iter(body) {
        let (Some(whole), Some(alt), Some(target)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        let span = whole.range();
        if references.iter().any(|r| overlaps(&r.span, &span)) {
            continue;
        }
        let Some(path) = parse_target(target.as_str()) else {
            continue;
        };
        let filename = file_component(&path).to_string();
        if filename.is_empty() {
            continue;
        }
        references.push(ImageReference {
            span,
            raw: whole.as_str().to_string(),
            caption: meaningful_alt(alt.as_str()),
            filename,
            path,
            syntax: ReferenceSyntax::Markdown,
        });
    }

    references.sort_by_key(|r| r.span.start);
    references
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Extract the local path from a standard-form target, or `None` for targets
/// that do not point at a local file.
fn parse_target(target: &str) -> Option<String> {
    let target = target.trim();
    let path = if let Some(inner) = target.strip_prefix('<') {
        inner.split('>').next().unwrap_or(inner)
    } else {
        // Drop an optional title: path "title"
        match target.find(" \"") {
            Some(idx) => &target[..idx],
            None => target,
        }
    }
    .trim();

    if path.is_empty() || is_external(path) {
        return None;
    }

    let decoded = urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string());
    Some(decoded)
}

fn is_external(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.contains("://")
        || ["asset:", "data:", "mailto:"]
            .iter()
            .any(|scheme| lower.starts_with(scheme))
}

/// Alt text worth keeping as a caption. Exporters often repeat the filename
/// as alt text; that is treated as no caption.
fn meaningful_alt(alt: &str) -> Option<String> {
    let alt = alt.trim();
    if alt.is_empty() || looks_like_image_file(alt) {
        None
    } else {
        Some(alt.to_string())
    }
}

fn looks_like_image_file(text: &str) -> bool {
    text.rsplit_once('.')
        .map(|(_, ext)| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
