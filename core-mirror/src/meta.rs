//! Tag and category derivation from tree-relative paths.
//!
//! Documents inherit organizational metadata from where they sit in the
//! mirrored tree: every path segment becomes a tag, and one configurable
//! segment becomes the category. Paths are the slash-joined relative
//! strings the resolver produces; the tree root is `"."`.

/// Splits a relative path into its segments.
///
/// The root marker `"."` and the empty string yield no segments.
fn segments(rel_path: &str) -> Vec<String> {
    if rel_path.is_empty() || rel_path == "." {
        return Vec::new();
    }
    rel_path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(str::to_string)
        .collect()
}

/// Derives tags from a relative path: one per segment, outermost first.
///
/// `"a/b/c"` yields `["a", "b", "c"]`; the root yields none.
pub fn tags_from_path(rel_path: &str) -> Vec<String> {
    segments(rel_path)
}

/// Picks the category segment from a relative path.
///
/// `level` selects which segment: positive counts from the outermost
/// (1-based, so `1` is the top-level folder), negative from the innermost
/// (`-1` is the immediate parent). Magnitudes beyond the path depth clamp
/// to the nearest end. `level == 0` or a root/empty path yields `None`;
/// the caller substitutes its configured default label.
pub fn category_from_path(rel_path: &str, level: i32) -> Option<String> {
    let segs = segments(rel_path);
    if segs.is_empty() || level == 0 {
        return None;
    }

    let index = if level > 0 {
        (level as usize - 1).min(segs.len() - 1)
    } else {
        segs.len().saturating_sub(level.unsigned_abs() as usize)
    };

    Some(segs[index].clone())
}
