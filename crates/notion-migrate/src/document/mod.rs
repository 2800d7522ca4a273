//! Document text handling
//!
//! Everything that reads or rewrites the contents of an exported page:
//! filename conventions, metadata extraction, image reference scanning and
//! the reference resolver that turns references into asset pointers.

mod filename;
mod metadata;
mod references;
mod resolver;

#[cfg(test)]
mod resolver_proptests;

pub use filename::{
    clean_value, file_component, file_stem, strip_notion_id, title_from_filename,
    PrefixedFilename, SourceId, PREFIX_LEN,
};
pub use metadata::{normalize_date, parse_properties, CsvMetadata, PageMetadata};
pub use references::{scan_references, ImageReference, ReferenceSyntax};
pub use resolver::{Catalog, CatalogMatch, ImageResolver, MatchKind, RewriteOutcome};
