//! Remote Asset Host Abstraction
//!
//! Optional upload target for downloaded images. When a host is configured
//! the engine replaces local image links with host URLs and deletes the
//! local copies after a successful upload.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Capability trait for an image hosting service.
///
/// Implementations wrap a concrete host (object storage, an image-bed
/// service, ...). Uploaded file names embed the store's asset token, which
/// is what makes [`find_by_token_prefix`](AssetHost::find_by_token_prefix)
/// able to recognize previously uploaded assets.
#[async_trait]
pub trait AssetHost: Send + Sync {
    /// Upload one file and return its public URL.
    ///
    /// # Arguments
    ///
    /// * `data` - File contents
    /// * `file_name` - Name to store under, `<token>.<ext>`
    async fn upload(&self, data: Bytes, file_name: &str) -> Result<String>;

    /// Look up an already-hosted file whose name starts with `token`.
    ///
    /// Returns `Ok(None)` when the host has no matching file. Hosts that
    /// cannot enumerate their contents may always return `None`; the engine
    /// then falls back to download-and-upload.
    async fn find_by_token_prefix(&self, token: &str) -> Result<Option<String>>;

    /// Human-readable host name, for logs and the final report.
    fn name(&self) -> &str;
}
