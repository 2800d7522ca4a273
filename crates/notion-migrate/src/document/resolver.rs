//! Resolution of image references against the image catalog, and the body
//! rewrite that replaces resolved references with asset pointers.

use serde::Serialize;

use super::filename::{file_stem, PrefixedFilename, PREFIX_LEN};
use super::references::{scan_references, ImageReference};
use crate::domain::{AmbiguityNote, AssetMap, BrokenReference};

/// How a reference was matched to a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Filename equals the catalog filename
    Exact,
    /// Filename equals the catalog filename with its prefix stripped
    PrefixStripped,
    /// Normalized names contain one another
    Fuzzy,
}

/// A successful catalog lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMatch {
    pub filename: String,
    pub kind: MatchKind,
    /// Other entries that qualified at the same step
    pub alternatives: Vec<String>,
}

impl CatalogMatch {
    pub fn is_ambiguous(&self) -> bool {
        !self.alternatives.is_empty()
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    filename: String,
    parsed: PrefixedFilename,
    normalized: String,
}

/// The set of image filenames references are resolved against.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new<I, S>(filenames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entries: Vec<CatalogEntry> = filenames
            .into_iter()
            .map(|name| {
                let filename = name.into();
                let parsed = PrefixedFilename::parse(&filename);
                let normalized = normalize(parsed.stem());
                CatalogEntry {
                    filename,
                    parsed,
                    normalized,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.filename.cmp(&b.filename));
        entries.dedup_by(|a, b| a.filename == b.filename);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a referenced filename.
    ///
    /// Tries, in order: exact match, match against prefix-stripped names, and
    /// a fuzzy containment match on normalized stems. `owner_prefix` breaks
    /// ties at the prefix-stripped step in favour of the owning document's
    /// own images. A reference carrying an exported page prefix only matches
    /// fuzzily among images with that same prefix.
    ///
    /// ```
    /// use notion_migrate::document::{Catalog, MatchKind};
    ///
    /// let catalog = Catalog::new(["abc123_photo-final.png"]);
    /// let found = catalog.resolve("photo-final.png", None).unwrap();
    /// assert_eq!(found.filename, "abc123_photo-final.png");
    /// assert_eq!(found.kind, MatchKind::PrefixStripped);
    /// ```
    pub fn resolve(&self, filename: &str, owner_prefix: Option<&str>) -> Option<CatalogMatch> {
        let filename = filename.trim();

        if let Some(entry) = self.entries.iter().find(|e| e.filename == filename) {
            return Some(CatalogMatch {
                filename: entry.filename.clone(),
                kind: MatchKind::Exact,
                alternatives: Vec::new(),
            });
        }

        let stripped: Vec<&CatalogEntry> = self
            .entries
            .iter()
            .filter(|e| e.parsed.name() == filename)
            .collect();
        if !stripped.is_empty() {
            if let Some(own) = owner_prefix.and_then(|prefix| {
                stripped
                    .iter()
                    .find(|e| e.parsed.prefix() == Some(prefix))
            }) {
                return Some(CatalogMatch {
                    filename: own.filename.clone(),
                    kind: MatchKind::PrefixStripped,
                    alternatives: Vec::new(),
                });
            }
            // Near names that would have matched fuzzily count as alternatives
            let mut found = pick_shortest(stripped, MatchKind::PrefixStripped);
            for near in self.fuzzy_candidates(filename) {
                if near.filename != found.filename && !found.alternatives.contains(&near.filename)
                {
                    found.alternatives.push(near.filename.clone());
                }
            }
            return Some(found);
        }

        let fuzzy = self.fuzzy_candidates(filename);
        if fuzzy.is_empty() {
            None
        } else {
            Some(pick_shortest(fuzzy, MatchKind::Fuzzy))
        }
    }

    fn fuzzy_candidates(&self, filename: &str) -> Vec<&CatalogEntry> {
        let (prefix, name) = match exported_prefix(filename) {
            Some((prefix, name)) => (Some(prefix), name),
            None => (None, filename),
        };
        let wanted = normalize(file_stem(name));
        if wanted.is_empty() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|e| prefix.is_none_or(|p| e.parsed.prefix() == Some(p)))
            .filter(|e| {
                !e.normalized.is_empty()
                    && (e.normalized.contains(&wanted) || wanted.contains(&e.normalized))
            })
            .collect()
    }
}

/// Split off the page prefix the export step puts on image names: exactly
/// [`PREFIX_LEN`] lowercase hex digits and an underscore.
fn exported_prefix(filename: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = filename.split_once('_')?;
    let is_page_prefix = prefix.len() == PREFIX_LEN
        && prefix
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
    (is_page_prefix && !rest.is_empty()).then_some((prefix, rest))
}

// TODO: consult an explicit reference -> filename override file before this
// heuristic once operators need to pin specific matches.
fn pick_shortest(mut candidates: Vec<&CatalogEntry>, kind: MatchKind) -> CatalogMatch {
    candidates.sort_by(|a, b| {
        a.filename
            .chars()
            .count()
            .cmp(&b.filename.chars().count())
            .then_with(|| a.filename.cmp(&b.filename))
    });
    let chosen = candidates[0].filename.clone();
    let alternatives = candidates[1..]
        .iter()
        .map(|e| e.filename.clone())
        .collect();
    CatalogMatch {
        filename: chosen,
        kind,
        alternatives,
    }
}

/// Case-fold and drop everything that is not alphanumeric.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Result of rewriting one document body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub body: String,
    /// Number of references replaced by pointers
    pub substitutions: usize,
    pub unresolved: Vec<BrokenReference>,
    pub ambiguities: Vec<AmbiguityNote>,
}

/// Rewrites document bodies against a set of uploaded assets.
pub struct ImageResolver<'a> {
    catalog: Catalog,
    assets: &'a AssetMap,
}

impl<'a> ImageResolver<'a> {
    pub fn new(assets: &'a AssetMap) -> Self {
        Self {
            catalog: Catalog::new(assets.keys().cloned()),
            assets,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Replace every resolvable image reference in `body` with its pointer.
    ///
    /// Unresolved references are left untouched and reported against
    /// `document`. Text outside reference spans is copied byte for byte.
    pub fn rewrite(&self, document: &str, owner_prefix: Option<&str>, body: &str) -> RewriteOutcome {
        let mut outcome = RewriteOutcome {
            body: String::with_capacity(body.len()),
            ..Default::default()
        };
        let mut cursor = 0;

        for reference in scan_references(body) {
            outcome.body.push_str(&body[cursor..reference.span.start]);
            cursor = reference.span.end;

            match self.pointer_for(&reference, owner_prefix) {
                Some((pointer, found)) => {
                    if found.is_ambiguous() {
                        tracing::debug!(
                            document,
                            reference = %reference.raw,
                            chosen = %found.filename,
                            "ambiguous image reference"
                        );
                        outcome.ambiguities.push(AmbiguityNote {
                            document: document.to_string(),
                            reference: reference.raw.clone(),
                            chosen: found.filename.clone(),
                            alternatives: found.alternatives.clone(),
                        });
                    }
                    outcome.body.push_str(&pointer);
                    outcome.substitutions += 1;
                }
                None => {
                    outcome.body.push_str(&reference.raw);
                    outcome.unresolved.push(BrokenReference {
                        document: document.to_string(),
                        reference: reference.raw.clone(),
                    });
                }
            }
        }

        outcome.body.push_str(&body[cursor..]);
        outcome
    }

    fn pointer_for(
        &self,
        reference: &ImageReference,
        owner_prefix: Option<&str>,
    ) -> Option<(String, CatalogMatch)> {
        let found = self.catalog.resolve(&reference.filename, owner_prefix)?;
        let asset = self.assets.get(&found.filename)?;
        let caption = reference
            .caption
            .clone()
            .unwrap_or_else(|| file_stem(&reference.filename).to_string());
        Some((asset.pointer(&caption), found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Asset;

    fn asset_map(entries: &[(&str, &str, &str)]) -> AssetMap {
        entries
            .iter()
            .map(|(filename, rec, att)| {
                (
                    filename.to_string(),
                    Asset {
                        filename: filename.to_string(),
                        url: format!("https://host/{}", filename),
                        caption: file_stem(filename).to_string(),
                        record_id: rec.to_string(),
                        attachment_id: att.to_string(),
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_exact_match_wins() {
        let catalog = Catalog::new(["logo.png", "abc_logo.png"]);
        let found = catalog.resolve("logo.png", None).unwrap();
        assert_eq!(found.filename, "logo.png");
        assert_eq!(found.kind, MatchKind::Exact);
    }

    #[test]
    fn test_exact_match_is_case_sensitive() {
        let catalog = Catalog::new(["abc_Logo.png"]);
        let found = catalog.resolve("logo.png", None).unwrap();
        assert_eq!(found.kind, MatchKind::Fuzzy);
    }

    #[test]
    fn test_prefix_stripped_match() {
        let catalog = Catalog::new(["abc123_photo-final.png", "zzz_other.png"]);
        let found = catalog.resolve("photo-final.png", None).unwrap();
        assert_eq!(found.filename, "abc123_photo-final.png");
        assert_eq!(found.kind, MatchKind::PrefixStripped);
        assert!(!found.is_ambiguous());
    }

    #[test]
    fn test_shortest_match_for_logo() {
        let catalog = Catalog::new(["abc_logo-small.png", "abc_logo.png"]);
        let found = catalog.resolve("logo.png", None).unwrap();
        assert_eq!(found.filename, "abc_logo.png");
        assert_eq!(found.kind, MatchKind::PrefixStripped);
        assert_eq!(found.alternatives, vec!["abc_logo-small.png".to_string()]);
    }

    #[test]
    fn test_fuzzy_ambiguity_picks_shortest_candidate() {
        let catalog = Catalog::new(["abc_logo-small.png", "abc_logo.png"]);
        let found = catalog.resolve("Logo.PNG", None).unwrap();
        assert_eq!(found.kind, MatchKind::Fuzzy);
        assert_eq!(found.filename, "abc_logo.png");
        assert_eq!(found.alternatives, vec!["abc_logo-small.png".to_string()]);
    }

    #[test]
    fn test_fuzzy_containment_in_both_directions() {
        let catalog = Catalog::new(["a1_Screenshot 2024-01-05.png"]);
        assert!(catalog.resolve("screenshot_20240105 copy.png", None).is_some());
        assert!(catalog.resolve("Screenshot.png", None).is_some());
    }

    #[test]
    fn test_fuzzy_match_stays_within_page_prefix() {
        let catalog = Catalog::new(["9a0b1c2d_image.png"]);
        assert_eq!(catalog.resolve("281fc271_image.png", Some("281fc271")), None);

        let catalog = Catalog::new(["9a0b1c2d_image.png", "281fc271_image-final.png"]);
        let found = catalog.resolve("281fc271_image.png", Some("281fc271")).unwrap();
        assert_eq!(found.filename, "281fc271_image-final.png");
        assert_eq!(found.kind, MatchKind::Fuzzy);
        assert!(!found.is_ambiguous());
    }

    #[test]
    fn test_exported_prefix_requires_hex_page_prefix() {
        assert_eq!(
            exported_prefix("281fc271_image.png"),
            Some(("281fc271", "image.png"))
        );
        assert_eq!(exported_prefix("screenshot_20240105 copy.png"), None);
        assert_eq!(exported_prefix("ABCDEF12_image.png"), None);
        assert_eq!(exported_prefix("281fc271_"), None);
    }

    #[test]
    fn test_duplicate_stripped_names_prefer_owner() {
        let catalog = Catalog::new(["bbbbbbbb_image.png", "aaaaaaaa_image.png"]);

        let owned = catalog.resolve("image.png", Some("bbbbbbbb")).unwrap();
        assert_eq!(owned.filename, "bbbbbbbb_image.png");
        assert!(!owned.is_ambiguous());

        let unowned = catalog.resolve("image.png", Some("cccccccc")).unwrap();
        assert_eq!(unowned.filename, "aaaaaaaa_image.png");
        assert_eq!(unowned.alternatives, vec!["bbbbbbbb_image.png".to_string()]);
    }

    #[test]
    fn test_no_match() {
        let catalog = Catalog::new(["abc_logo.png"]);
        assert!(catalog.resolve("missing.png", None).is_none());
        // Names without alphanumerics never fuzzy match
        assert!(catalog.resolve("--.png", None).is_none());
    }

    #[test]
    fn test_rewrite_replaces_all_references() {
        let assets = asset_map(&[
            ("abc_chart.png", "rec1", "att1"),
            ("abc_team.jpg", "rec2", "att2"),
        ]);
        let resolver = ImageResolver::new(&assets);

        let body = "# Notes\n\n![[chart.png]]\ntext ![[chart.png|Q3 chart]] and ![Team](imgs/team.jpg)\nend";
        let outcome = resolver.rewrite("doc-1", None, body);

        assert_eq!(outcome.substitutions, 3);
        assert!(outcome.unresolved.is_empty());
        assert_eq!(
            outcome.body,
            "# Notes\n\n![chart](asset:rec1:att1)\ntext ![Q3 chart](asset:rec1:att1) and ![Team](asset:rec2:att2)\nend"
        );
    }

    #[test]
    fn test_rewrite_leaves_unresolved_reference_literal() {
        let assets = asset_map(&[("abc_chart.png", "rec1", "att1")]);
        let resolver = ImageResolver::new(&assets);

        let body = "before ![[missing.png]] after";
        let outcome = resolver.rewrite("doc-7", None, body);

        assert_eq!(outcome.body, body);
        assert_eq!(outcome.substitutions, 0);
        assert_eq!(
            outcome.unresolved,
            vec![BrokenReference {
                document: "doc-7".to_string(),
                reference: "![[missing.png]]".to_string(),
            }]
        );
    }

    #[test]
    fn test_rewrite_records_ambiguity() {
        let assets = asset_map(&[
            ("abc_logo.png", "rec1", "att1"),
            ("abc_logo-small.png", "rec2", "att2"),
        ]);
        let resolver = ImageResolver::new(&assets);

        let outcome = resolver.rewrite("doc-1", None, "![[LOGO.png]]");
        assert_eq!(outcome.body, "![LOGO](asset:rec1:att1)");
        assert_eq!(outcome.ambiguities.len(), 1);
        assert_eq!(outcome.ambiguities[0].chosen, "abc_logo.png");
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let assets = asset_map(&[("abc_chart.png", "rec1", "att1")]);
        let resolver = ImageResolver::new(&assets);

        let first = resolver.rewrite("doc-1", None, "x ![[chart.png]] y");
        let second = resolver.rewrite("doc-1", None, &first.body);

        assert_eq!(second.body, first.body);
        assert_eq!(second.substitutions, 0);
        assert!(second.unresolved.is_empty());
    }

    #[test]
    fn test_rewrite_with_empty_catalog_reports_everything() {
        let assets = AssetMap::new();
        let resolver = ImageResolver::new(&assets);
        let outcome = resolver.rewrite("doc-1", None, "![[a.png]] ![b](b.png)");
        assert_eq!(outcome.unresolved.len(), 2);
        assert!(resolver.catalog().is_empty());
    }
}
