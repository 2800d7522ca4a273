//! Property-based tests for body rewriting
//!
//! Bodies are assembled from plain text fragments and references to known
//! catalog files, so the expected output can be built alongside the input.

use super::*;
use crate::domain::{Asset, AssetMap};
use proptest::prelude::*;

const CATALOG: &[&str] = &["a.png", "chart one.png", "281fc271_diagram.jpg"];

fn assets() -> AssetMap {
    CATALOG
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            (
                name.to_string(),
                Asset {
                    filename: name.to_string(),
                    url: format!("https://img.example.com/{}", name),
                    caption: file_stem(name).to_string(),
                    record_id: format!("rec{}", idx),
                    attachment_id: format!("att{}", idx),
                },
            )
        })
        .collect()
}

// Text that can never form an image reference
fn text_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,:\n-]{0,24}"
}

fn piece_strategy() -> impl Strategy<Value = (String, usize)> {
    (text_strategy(), 0..CATALOG.len())
}

proptest! {
    // Property 1: bodies without references come back unchanged
    #[test]
    fn prop_reference_free_body_is_identity(body in text_strategy()) {
        let assets = assets();
        let outcome = ImageResolver::new(&assets).rewrite("doc", None, &body);
        prop_assert_eq!(outcome.body, body);
        prop_assert_eq!(outcome.substitutions, 0);
        prop_assert!(outcome.unresolved.is_empty());
    }

    // Property 2: N resolvable references give N substitutions and every
    // byte outside them is preserved
    #[test]
    fn prop_resolvable_references_all_substituted(
        pieces in prop::collection::vec(piece_strategy(), 0..8),
        tail in text_strategy()
    ) {
        let assets = assets();
        let mut body = String::new();
        let mut expected = String::new();
        for (text, idx) in &pieces {
            let name = CATALOG[*idx];
            body.push_str(text);
            body.push_str(&format!("![[{}]]", name));
            expected.push_str(text);
            expected.push_str(&assets[name].pointer(file_stem(name)));
        }
        body.push_str(&tail);
        expected.push_str(&tail);

        let outcome = ImageResolver::new(&assets).rewrite("doc", None, &body);
        prop_assert_eq!(outcome.substitutions, pieces.len());
        prop_assert_eq!(outcome.body, expected);
        prop_assert!(outcome.unresolved.is_empty());
    }

    // Property 3: rewriting an already rewritten body changes nothing
    #[test]
    fn prop_rewrite_is_idempotent(
        pieces in prop::collection::vec(piece_strategy(), 0..8),
    ) {
        let assets = assets();
        let body: String = pieces
            .iter()
            .map(|(text, idx)| format!("{}![[{}]]", text, CATALOG[*idx]))
            .collect();

        let resolver = ImageResolver::new(&assets);
        let first = resolver.rewrite("doc", None, &body);
        let second = resolver.rewrite("doc", None, &first.body);
        prop_assert_eq!(&second.body, &first.body);
        prop_assert_eq!(second.substitutions, 0);
    }
}
