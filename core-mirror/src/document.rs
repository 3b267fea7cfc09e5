//! Markdown artifact assembly: frontmatter, content hashing, skip logic.
//!
//! A mirrored document is the store's rendered body prefixed with YAML
//! frontmatter carrying title, timestamps, categories, tags and the store
//! id. Re-runs hash the fully rendered artifact against the file already on
//! disk and skip the write when nothing changed.

use std::path::Path;

use chrono::{DateTime, Local, SecondsFormat, TimeZone};
use sha2::{Digest, Sha256};
use store_traits::DocumentMeta;
use tokio::fs;

/// Characters that force a YAML scalar into quotes.
const YAML_SPECIAL: &str = ":#{}[],&*?|<>=!%@\"'`\\";

/// Quotes a YAML scalar when it would otherwise be misparsed.
///
/// Safe values pass through untouched; anything containing YAML
/// punctuation, leading/trailing whitespace or a leading dash is wrapped
/// in double quotes with backslash and quote escaped.
pub fn escape_yaml(value: &str) -> String {
    let needs_quoting = value.is_empty()
        || value.starts_with('-')
        || value.trim() != value
        || value.chars().any(|c| YAML_SPECIAL.contains(c));

    if !needs_quoting {
        return value.to_string();
    }

    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

fn format_timestamp(epoch_secs: Option<i64>) -> String {
    let dt: DateTime<Local> = epoch_secs
        .and_then(|secs| Local.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Local::now);
    dt.to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Renders the complete Markdown artifact for a document.
///
/// # Arguments
///
/// * `meta` - Store metadata (title, timestamps)
/// * `doc_id` - Store identifier, recorded in the frontmatter
/// * `body` - Rendered Markdown body, links already rewritten
/// * `tags` - Path-derived tags, outermost first
/// * `category` - Path-derived category; `default_category` fills in when
///   absent
pub fn render_document(
    meta: &DocumentMeta,
    doc_id: &str,
    body: &str,
    tags: &[String],
    category: Option<&str>,
    default_category: &str,
) -> String {
    let mut out = String::with_capacity(body.len() + 256);

    out.push_str("---\n");
    out.push_str(&format!("title: {}\n", escape_yaml(&meta.title)));
    out.push_str(&format!("date: {}\n", format_timestamp(meta.created_at)));
    out.push_str(&format!("updated: {}\n", format_timestamp(meta.updated_at)));

    out.push_str("categories:\n");
    out.push_str(&format!(
        "  - {}\n",
        escape_yaml(category.unwrap_or(default_category))
    ));

    if !tags.is_empty() {
        out.push_str("tags:\n");
        for tag in tags {
            out.push_str(&format!("  - {}\n", escape_yaml(tag)));
        }
    }

    out.push_str(&format!("id: {}\n", escape_yaml(doc_id)));
    out.push_str("---\n\n");
    out.push_str(body);

    out
}

/// Sha-256 hex digest of rendered content.
pub fn content_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Whether writing `rendered` to `path` can be skipped.
///
/// True only when skipping is enabled, not overridden by `force`, and the
/// file already on disk hashes identically to the rendered artifact. A
/// missing or unreadable file never skips.
pub async fn should_skip(path: &Path, rendered: &str, skip_unchanged: bool, force: bool) -> bool {
    if force || !skip_unchanged {
        return false;
    }
    match fs::read(path).await {
        Ok(existing) => content_hash(&existing) == content_hash(rendered.as_bytes()),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn meta(title: &str) -> DocumentMeta {
        DocumentMeta {
            title: title.to_string(),
            created_at: Some(1_700_000_000),
            updated_at: Some(1_700_000_100),
        }
    }

    #[test]
    fn test_escape_plain_value_untouched() {
        assert_eq!(escape_yaml("Getting Started"), "Getting Started");
    }

    #[test]
    fn test_escape_special_values_quoted() {
        assert_eq!(escape_yaml("a: b"), "\"a: b\"");
        assert_eq!(escape_yaml("-leading"), "\"-leading\"");
        assert_eq!(escape_yaml(""), "\"\"");
        assert_eq!(escape_yaml("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(escape_yaml("back\\slash"), "\"back\\\\slash\"");
    }

    #[test]
    fn test_render_document_layout() {
        let tags = vec!["guides".to_string(), "setup".to_string()];
        let out = render_document(
            &meta("Install"),
            "doc123",
            "# Install\n",
            &tags,
            Some("guides"),
            "uncategorized",
        );

        assert!(out.starts_with("---\ntitle: Install\n"));
        assert!(out.contains("categories:\n  - guides\n"));
        assert!(out.contains("tags:\n  - guides\n  - setup\n"));
        assert!(out.contains("id: doc123\n"));
        assert!(out.ends_with("---\n\n# Install\n"));
    }

    #[test]
    fn test_render_without_tags_omits_block() {
        let out = render_document(&meta("Root"), "doc1", "body", &[], None, "uncategorized");
        assert!(!out.contains("tags:"));
        assert!(out.contains("categories:\n  - uncategorized\n"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let tags = vec!["a".to_string()];
        let first = render_document(&meta("T"), "d", "body", &tags, Some("a"), "x");
        let second = render_document(&meta("T"), "d", "body", &tags, Some("a"), "x");
        assert_eq!(content_hash(first.as_bytes()), content_hash(second.as_bytes()));
    }

    #[test]
    fn test_content_hash_distinguishes() {
        assert_ne!(content_hash(b"a"), content_hash(b"b"));
        assert_eq!(content_hash(b"a").len(), 64);
    }

    fn scratch_file() -> PathBuf {
        std::env::temp_dir().join(format!("core-mirror-doc-{}.md", Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_skip_when_identical() {
        let path = scratch_file();
        fs::write(&path, "same content").await.unwrap();

        assert!(should_skip(&path, "same content", true, false).await);
        assert!(!should_skip(&path, "same content", true, true).await);
        assert!(!should_skip(&path, "same content", false, false).await);
        assert!(!should_skip(&path, "different", true, false).await);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_no_skip_for_missing_file() {
        let path = scratch_file();
        assert!(!should_skip(&path, "anything", true, false).await);
    }
}
