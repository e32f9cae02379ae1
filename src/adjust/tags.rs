//! Hierarchical tag matching.
//! Tags are `/`-delimited paths; a filter prefix matches any tag that starts
//! with it, so `"ops/manual"` is matched by `"ops"` and by `"ops/manual"`,
//! not only by exact equality.

use std::collections::BTreeSet;

/// True iff at least one tag starts with `prefix`.
/// An empty prefix or an empty tag set never matches.
pub fn tag_matches_prefix(tags: &BTreeSet<String>, prefix: &str) -> bool {
    if prefix.is_empty() {
        return false;
    }
    tags.iter().any(|tag| tag.starts_with(prefix))
}

/// True iff at least one tag in `tags` starts with at least one prefix in
/// `prefixes`. Either side empty never matches.
pub fn tag_matches(tags: &BTreeSet<String>, prefixes: &BTreeSet<String>) -> bool {
    prefixes.iter().any(|prefix| tag_matches_prefix(tags, prefix))
}
