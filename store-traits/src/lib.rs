//! # Store Capability Traits
//!
//! Contract between the mirror engine and the remote services it talks to.
//!
//! ## Overview
//!
//! The engine never speaks a wire protocol itself. Everything remote is
//! consumed through two capability traits defined here:
//!
//! - [`SpaceStore`](store::SpaceStore) - the hierarchical document store:
//!   child listing with cursor pagination, document metadata and rendered
//!   content, binary asset download
//! - [`AssetHost`](assets::AssetHost) - optional image hosting target:
//!   upload and prefix lookup
//!
//! Concrete adapters implement these per store/host and are injected as
//! `Arc<dyn ...>`.
//!
//! ## Error Handling
//!
//! All trait methods return [`StoreError`](error::StoreError). Adapters
//! should:
//!
//! - Map protocol-level failures to the closest variant
//! - Use `PermissionDenied` for missing capability grants so the engine can
//!   surface an actionable hint instead of retrying
//! - Provide messages with enough context to act on
//!
//! ## Thread Safety
//!
//! All traits require `Send + Sync`; the engine calls them from many tasks
//! concurrently.

pub mod assets;
pub mod error;
pub mod store;

pub use error::{Result, StoreError};

// Re-export commonly used types
pub use assets::AssetHost;
pub use store::{
    AssetPayload, DocumentContent, DocumentMeta, NodeKind, NodePage, RemoteNode, SpaceStore,
};
