//! Remote Document Store Abstraction
//!
//! Defines the contract between the mirror engine and a concrete remote
//! document store ("space"). A space is a tree of nodes; containers hold
//! children, documents carry renderable content. Implementations wrap the
//! store's wire protocol and return already-rendered Markdown bodies plus
//! the image tokens referenced by them.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What a node in the space is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Holds children; never has renderable content of its own.
    Container,
    /// A leaf with renderable content.
    Document,
    /// Anything the store exposes that the mirror does not render
    /// (spreadsheets, boards, ...). Traversed but not synced.
    Other,
}

/// One node of the remote space tree, as discovered.
///
/// Immutable after discovery; the resolver collects these before any
/// per-document work starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Store-assigned opaque identifier, unique within the space.
    pub id: String,
    /// Identifier of the parent node. The space root's own id is never
    /// reported here; listing is always child-of-parent.
    pub parent_id: String,
    /// Human-readable title, unsanitized.
    pub title: String,
    pub kind: NodeKind,
    /// Whether the store reports children under this node.
    pub has_children: bool,
}

/// One page of a child listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodePage {
    pub nodes: Vec<RemoteNode>,
    /// Continuation cursor for the next page, `None` when exhausted.
    pub next_cursor: Option<String>,
}

/// Document metadata, fetched per leaf.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub title: String,
    /// Creation time, epoch seconds. Missing when the store does not
    /// report one.
    pub created_at: Option<i64>,
    /// Last modification time, epoch seconds.
    pub updated_at: Option<i64>,
}

/// Rendered document content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentContent {
    /// Markdown body with image references still carrying store tokens.
    pub body: String,
    /// Image tokens referenced by the body, in order of appearance.
    /// May contain duplicates.
    pub image_tokens: Vec<String>,
}

/// A downloaded binary asset.
#[derive(Debug, Clone)]
pub struct AssetPayload {
    pub data: Bytes,
    /// File name suggested by the store, extension included.
    /// Missing when the store reports none.
    pub file_name: Option<String>,
}

/// Capability trait for the remote document store.
///
/// All methods are remote calls; the engine rate-limits every invocation,
/// implementations should not add their own throttling.
///
/// # Example
///
/// ```ignore
/// use store_traits::{SpaceStore, NodePage};
///
/// async fn first_page(store: &dyn SpaceStore, root: &str) -> store_traits::Result<NodePage> {
///     store.list_children(root, None).await
/// }
/// ```
#[async_trait]
pub trait SpaceStore: Send + Sync {
    /// List one page of a node's direct children.
    ///
    /// # Arguments
    ///
    /// * `parent_id` - Node whose children to list
    /// * `cursor` - Continuation cursor from the previous page, `None` for
    ///   the first page
    async fn list_children(&self, parent_id: &str, cursor: Option<&str>) -> Result<NodePage>;

    /// Fetch a document's metadata.
    async fn fetch_meta(&self, node_id: &str) -> Result<DocumentMeta>;

    /// Fetch a document's rendered content.
    async fn fetch_content(&self, node_id: &str) -> Result<DocumentContent>;

    /// Download the binary asset behind an image token.
    async fn fetch_asset(&self, token: &str) -> Result<AssetPayload>;
}
