//! Filename conventions of the Notion export and of the image catalog.
//!
//! Notion appends a 32 character hex id to every page and folder name
//! (`"Roadmap 281fc2711b808049b837d239a4b31baf.md"`). Exported images are
//! stored as `<prefix>_<name>` where the prefix is derived from the owning
//! page's id, so two pages can both carry an `image.png`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Number of id characters used as catalog filename prefix.
pub const PREFIX_LEN: usize = 8;

static NOTION_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-f0-9]{32})").expect("valid notion id pattern"));

static NOTION_ID_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+[a-f0-9]{32}$").expect("valid notion id suffix pattern"));

/// Stable identifier of a page in the source system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Extract the 32-hex Notion id from a file or folder name.
    ///
    /// ```
    /// use notion_migrate::document::SourceId;
    ///
    /// let id = SourceId::from_filename("Roadmap 281fc2711b808049b837d239a4b31baf.md").unwrap();
    /// assert_eq!(id.as_str(), "281fc2711b808049b837d239a4b31baf");
    /// assert_eq!(id.prefix(), "281fc271");
    /// ```
    pub fn from_filename(filename: &str) -> Option<Self> {
        NOTION_ID
            .captures(filename)
            .and_then(|caps| caps.get(1))
            .map(|m| Self(m.as_str().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix used to tag catalog filenames belonging to this page.
    pub fn prefix(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(PREFIX_LEN)
            .map(|(idx, _)| idx)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A catalog filename of the form `<prefix>_<name>`.
///
/// The prefix is a run of ASCII alphanumerics before the first underscore.
/// Names without such a prefix parse with `prefix() == None`.
///
/// ```
/// use notion_migrate::document::PrefixedFilename;
///
/// let file = PrefixedFilename::parse("abc123_photo-final.png");
/// assert_eq!(file.prefix(), Some("abc123"));
/// assert_eq!(file.name(), "photo-final.png");
/// assert_eq!(file.to_string(), "abc123_photo-final.png");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrefixedFilename {
    prefix: Option<String>,
    name: String,
}

impl PrefixedFilename {
    pub fn new(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            name: name.into(),
        }
    }

    pub fn unprefixed(name: impl Into<String>) -> Self {
        Self {
            prefix: None,
            name: name.into(),
        }
    }

    pub fn parse(filename: &str) -> Self {
        if let Some((prefix, rest)) = filename.split_once('_') {
            let is_prefix =
                !prefix.is_empty() && prefix.chars().all(|c| c.is_ascii_alphanumeric());
            if is_prefix && !rest.is_empty() {
                return Self::new(prefix, rest);
            }
        }
        Self::unprefixed(filename)
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// The original filename with the prefix stripped.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stripped name without its extension.
    pub fn stem(&self) -> &str {
        file_stem(&self.name)
    }

    /// The same file with `-<n>` appended to its stem: `a_chart.png`
    /// becomes `a_chart-2.png`.
    pub fn numbered(&self, n: usize) -> Self {
        let stem = self.stem();
        let extension = &self.name[stem.len()..];
        Self {
            prefix: self.prefix.clone(),
            name: format!("{}-{}{}", stem, n, extension),
        }
    }
}

impl fmt::Display for PrefixedFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(prefix) => write!(f, "{}_{}", prefix, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Remove a trailing Notion id (and the `.md` extension) from a name.
///
/// `"My Document 281fc2711b808049b837d239a4b31baf.md"` becomes `"My Document"`.
pub fn strip_notion_id(name: &str) -> String {
    let name = name.strip_suffix(".md").unwrap_or(name);
    NOTION_ID_SUFFIX.replace(name, "").trim().to_string()
}

/// Document title derived from its filename.
pub fn title_from_filename(path: &Path) -> String {
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    strip_notion_id(&filename)
}

/// Filename component of a `/`-separated path.
pub fn file_component(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Name without its final extension; names without a dot are returned whole.
pub fn file_stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// Strip surrounding whitespace and stray quote characters.
pub fn clean_value(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim()
        .to_string()
}
