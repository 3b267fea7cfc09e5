//! # Tree Resolver
//!
//! Discovers the full remote space and derives local paths for it.
//!
//! ## Overview
//!
//! Resolution runs in two phases. Discovery walks a worklist from the root,
//! listing each node's children exactly once through limiter-gated,
//! cursor-paginated calls, and collects every node it sees. Only once the
//! node set is complete are relative paths derived top-down, so concurrent
//! document work later never observes a partially built tree.
//!
//! Titles become directory names through a sanitizer that substitutes
//! filesystem-hostile characters with visually similar safe ones instead of
//! dropping them. Two siblings sanitizing to the same name silently share a
//! path; the last one processed wins.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use store_traits::{RemoteNode, SpaceStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::error::{MirrorError, Result};
use crate::limiter::ApiRateLimiter;

/// The complete discovered space.
///
/// `paths` maps every node id (root included) to a slash-joined path
/// relative to the mirror root; the root itself maps to `"."`. Read-only
/// once built.
#[derive(Debug, Clone)]
pub struct ResolvedTree {
    /// Every discovered node, in discovery order.
    pub nodes: Vec<RemoteNode>,
    /// Node id to relative path.
    pub paths: HashMap<String, String>,
}

/// Replaces filesystem-special characters so any title becomes a usable
/// file or directory name. Nothing is dropped; substitutes stay visually
/// close to the original.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '|' => '-',
            '*' => '★',
            '?' => '？',
            '"' => '\'',
            '<' => '《',
            '>' => '》',
            other => other,
        })
        .collect();

    let trimmed = replaced.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Walks the remote space and derives the local directory layout.
pub struct TreeResolver {
    store: Arc<dyn SpaceStore>,
    limiter: Arc<ApiRateLimiter>,
}

impl TreeResolver {
    pub fn new(store: Arc<dyn SpaceStore>, limiter: Arc<ApiRateLimiter>) -> Self {
        Self { store, limiter }
    }

    /// Discovers every node under `root_id` and derives relative paths.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::InvalidInput` for an empty root id before any
    /// remote call, `MirrorError::Cancelled` if cancelled mid-listing, and
    /// propagates the first store failure; a partially discovered tree is
    /// never returned.
    #[instrument(skip(self, cancel), fields(root_id = %root_id))]
    pub async fn resolve_all(
        &self,
        root_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ResolvedTree> {
        if root_id.trim().is_empty() {
            return Err(MirrorError::invalid_input(
                "root_id",
                "root node id cannot be empty",
            ));
        }

        // Phase 1: discovery. Each parent is listed exactly once.
        let mut nodes: Vec<RemoteNode> = Vec::new();
        let mut pending: VecDeque<String> = VecDeque::from([root_id.to_string()]);

        while let Some(parent_id) = pending.pop_front() {
            let children = self.list_all_children(&parent_id, cancel).await?;
            for child in children {
                if child.has_children {
                    pending.push_back(child.id.clone());
                }
                nodes.push(child);
            }
        }

        debug!(nodes = nodes.len(), "space discovery complete");

        // Phase 2: paths, top-down over the complete node set.
        let mut children_of: HashMap<&str, Vec<&RemoteNode>> = HashMap::new();
        for node in &nodes {
            children_of.entry(node.parent_id.as_str()).or_default().push(node);
        }

        let mut paths: HashMap<String, String> = HashMap::with_capacity(nodes.len() + 1);
        paths.insert(root_id.to_string(), ".".to_string());

        let mut stack: Vec<(&str, String)> = vec![(root_id, ".".to_string())];
        while let Some((parent_id, parent_path)) = stack.pop() {
            let Some(children) = children_of.get(parent_id) else {
                continue;
            };
            for child in children {
                let name = sanitize_file_name(&child.title);
                let child_path = if parent_path == "." {
                    name
                } else {
                    format!("{}/{}", parent_path, name)
                };
                paths.insert(child.id.clone(), child_path.clone());
                stack.push((child.id.as_str(), child_path));
            }
        }

        Ok(ResolvedTree { nodes, paths })
    }

    /// Drains every page of one node's child listing.
    async fn list_all_children(
        &self,
        parent_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<RemoteNode>> {
        let mut children = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            self.limiter.wait(cancel).await?;
            let page = self.store.list_children(parent_id, cursor.as_deref()).await?;
            children.extend(page.nodes);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use store_traits::{
        AssetPayload, DocumentContent, DocumentMeta, NodeKind, NodePage, Result as StoreResult,
        StoreError,
    };

    const PAGE_SIZE: usize = 2;

    struct MockStore {
        children: HashMap<String, Vec<RemoteNode>>,
        list_calls: AtomicUsize,
        fail_for: Option<String>,
    }

    impl MockStore {
        fn new(children: HashMap<String, Vec<RemoteNode>>) -> Self {
            Self {
                children,
                list_calls: AtomicUsize::new(0),
                fail_for: None,
            }
        }
    }

    fn node(id: &str, parent: &str, title: &str, kind: NodeKind, has_children: bool) -> RemoteNode {
        RemoteNode {
            id: id.to_string(),
            parent_id: parent.to_string(),
            title: title.to_string(),
            kind,
            has_children,
        }
    }

    #[async_trait]
    impl SpaceStore for MockStore {
        async fn list_children(
            &self,
            parent_id: &str,
            cursor: Option<&str>,
        ) -> StoreResult<NodePage> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);

            if self.fail_for.as_deref() == Some(parent_id) {
                return Err(StoreError::Api {
                    status: 500,
                    message: "listing failed".to_string(),
                });
            }

            let all = self.children.get(parent_id).cloned().unwrap_or_default();
            let start: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
            let end = (start + PAGE_SIZE).min(all.len());
            let next_cursor = (end < all.len()).then(|| end.to_string());

            Ok(NodePage {
                nodes: all[start..end].to_vec(),
                next_cursor,
            })
        }

        async fn fetch_meta(&self, node_id: &str) -> StoreResult<DocumentMeta> {
            Err(StoreError::NotFound(node_id.to_string()))
        }

        async fn fetch_content(&self, node_id: &str) -> StoreResult<DocumentContent> {
            Err(StoreError::NotFound(node_id.to_string()))
        }

        async fn fetch_asset(&self, token: &str) -> StoreResult<AssetPayload> {
            Err(StoreError::NotFound(token.to_string()))
        }
    }

    fn resolver(store: MockStore) -> TreeResolver {
        TreeResolver::new(Arc::new(store), Arc::new(ApiRateLimiter::default()))
    }

    fn sample_tree() -> HashMap<String, Vec<RemoteNode>> {
        let mut children = HashMap::new();
        children.insert(
            "root".to_string(),
            vec![
                node("guides", "root", "Guides", NodeKind::Container, true),
                node("readme", "root", "Read Me", NodeKind::Document, false),
            ],
        );
        children.insert(
            "guides".to_string(),
            vec![
                node("install", "guides", "Install", NodeKind::Document, false),
                node("faq", "guides", "FAQ: basics?", NodeKind::Document, false),
                node("misc", "guides", "Misc", NodeKind::Other, false),
            ],
        );
        children
    }

    #[tokio::test]
    async fn test_resolves_nested_tree_with_pagination() {
        let store = MockStore::new(sample_tree());
        let tree = resolver(store)
            .resolve_all("root", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(tree.nodes.len(), 5);
        assert_eq!(tree.paths["root"], ".");
        assert_eq!(tree.paths["guides"], "Guides");
        assert_eq!(tree.paths["readme"], "Read Me");
        assert_eq!(tree.paths["install"], "Guides/Install");
        assert_eq!(tree.paths["faq"], "Guides/FAQ- basics？");
        // Every node gets a path, renderable or not.
        assert_eq!(tree.paths.len(), 6);
    }

    #[tokio::test]
    async fn test_each_parent_listed_once() {
        let children = sample_tree();
        let store = MockStore::new(children);
        let calls = Arc::new(store);
        let resolver = TreeResolver::new(calls.clone(), Arc::new(ApiRateLimiter::default()));

        resolver
            .resolve_all("root", &CancellationToken::new())
            .await
            .unwrap();

        // root: 2 children = 1 page, guides: 3 children = 2 pages.
        // Leaves are never listed.
        assert_eq!(calls.list_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_root_rejected_before_any_call() {
        let store = MockStore::new(HashMap::new());
        let calls = Arc::new(store);
        let resolver = TreeResolver::new(calls.clone(), Arc::new(ApiRateLimiter::default()));

        let result = resolver.resolve_all("  ", &CancellationToken::new()).await;
        assert!(matches!(result, Err(MirrorError::InvalidInput { .. })));
        assert_eq!(calls.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_resolution() {
        let mut store = MockStore::new(sample_tree());
        store.fail_for = Some("guides".to_string());

        let result = resolver(store)
            .resolve_all("root", &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(MirrorError::Store(_))));
    }

    #[tokio::test]
    async fn test_cancelled_resolution() {
        let store = MockStore::new(sample_tree());
        let cancel = CancellationToken::new();
        cancel.cancel();

        // A cancelled token surfaces at the limiter gate before the first
        // page fetch.
        let resolver = TreeResolver::new(Arc::new(store), Arc::new(ApiRateLimiter::default()));
        let result = resolver.resolve_all("root", &cancel).await;
        assert!(matches!(result, Err(MirrorError::Cancelled)));
    }

    #[test]
    fn test_sanitize_substitutions() {
        assert_eq!(sanitize_file_name("a/b\\c:d|e"), "a-b-c-d-e");
        assert_eq!(sanitize_file_name("star*"), "star★");
        assert_eq!(sanitize_file_name("what?"), "what？");
        assert_eq!(sanitize_file_name("\"quoted\""), "'quoted'");
        assert_eq!(sanitize_file_name("<tag>"), "《tag》");
    }

    #[test]
    fn test_sanitize_degenerate_names() {
        assert_eq!(sanitize_file_name(""), "untitled");
        assert_eq!(sanitize_file_name("   "), "untitled");
        assert_eq!(sanitize_file_name("."), "untitled");
        assert_eq!(sanitize_file_name(".."), "untitled");
        assert_eq!(sanitize_file_name("  padded  "), "padded");
    }
}
