//! # Asset Pipeline
//!
//! Resolves a document's image tokens into final links.
//!
//! ## Overview
//!
//! Each unique token is resolved exactly once per document, through layers
//! ordered cheapest first:
//!
//! 1. the durable upload cache (token already hosted)
//! 2. an existing local file named `<token>.*` in the image directory
//! 3. a host prefix probe, when an asset host is configured (hosted on a
//!    previous run by someone else; the hit is written back to the cache)
//! 4. a limiter-gated download from the store
//!
//! Downloaded PNGs are re-encoded losslessly at best compression; any codec
//! failure falls back to the raw bytes. When a host is configured, local
//! files are then uploaded in a batch under their own concurrency bound,
//! each success is recorded in the durable cache, the local copy deleted,
//! and an emptied image directory removed. Without a host, links point at
//! the local relative path.
//!
//! A single asset failing is logged and its token left unresolved in the
//! body; it never fails the document.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::ImageFormat;
use store_traits::{AssetHost, SpaceStore};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::cache::UploadCache;
use crate::error::Result;
use crate::limiter::ApiRateLimiter;

/// Parallel downloads per document. Downloads are limiter-gated anyway, so
/// this only caps in-flight buffers.
const DOWNLOAD_CONCURRENCY: usize = 20;

/// Result of resolving one document's tokens.
#[derive(Debug, Default)]
pub struct AssetOutcome {
    /// Token to final link, for every token that resolved.
    pub links: HashMap<String, String>,
    /// Unique tokens encountered.
    pub unique_tokens: usize,
    /// Tokens that required a fresh download.
    pub downloaded: usize,
    /// Tokens served by a cache layer.
    pub cached: usize,
    /// Tokens that failed to resolve.
    pub failed: usize,
}

/// How one token resolved internally.
enum Resolution {
    /// Already hosted; final link known.
    Hosted(String),
    /// On local disk, uploadable when a host is configured.
    Local {
        file_name: String,
        path: PathBuf,
        fresh: bool,
    },
    Failed,
}

/// Resolves image tokens for documents. One shared instance per run.
pub struct AssetPipeline {
    store: Arc<dyn SpaceStore>,
    host: Option<Arc<dyn AssetHost>>,
    cache: Arc<dyn UploadCache>,
    limiter: Arc<ApiRateLimiter>,
    upload_concurrency: usize,
}

impl AssetPipeline {
    pub fn new(
        store: Arc<dyn SpaceStore>,
        host: Option<Arc<dyn AssetHost>>,
        cache: Arc<dyn UploadCache>,
        limiter: Arc<ApiRateLimiter>,
        upload_concurrency: usize,
    ) -> Self {
        Self {
            store,
            host,
            cache,
            limiter,
            upload_concurrency,
        }
    }

    /// Resolves every token of one document.
    ///
    /// # Arguments
    ///
    /// * `tokens` - Tokens in body order, duplicates allowed
    /// * `doc_dir` - Directory the document file lives in
    /// * `image_dir` - Image subdirectory name under `doc_dir`
    #[instrument(skip_all, fields(tokens = tokens.len()))]
    pub async fn resolve(
        &self,
        tokens: &[String],
        doc_dir: &Path,
        image_dir: &str,
        cancel: &CancellationToken,
    ) -> AssetOutcome {
        let unique = dedup_preserving_order(tokens);
        let mut outcome = AssetOutcome {
            unique_tokens: unique.len(),
            ..AssetOutcome::default()
        };
        if unique.is_empty() {
            return outcome;
        }

        let image_path = doc_dir.join(image_dir);

        let resolutions: Vec<(String, Resolution)> = stream::iter(unique)
            .map(|token| {
                let image_path = image_path.clone();
                async move {
                    let resolution = self.resolve_one(&token, &image_path, cancel).await;
                    (token, resolution)
                }
            })
            .buffer_unordered(DOWNLOAD_CONCURRENCY)
            .collect()
            .await;

        let mut local: Vec<(String, String, PathBuf)> = Vec::new();
        for (token, resolution) in resolutions {
            match resolution {
                Resolution::Hosted(url) => {
                    outcome.cached += 1;
                    outcome.links.insert(token, url);
                }
                Resolution::Local {
                    file_name,
                    path,
                    fresh,
                } => {
                    if fresh {
                        outcome.downloaded += 1;
                    } else {
                        outcome.cached += 1;
                    }
                    local.push((token, file_name, path));
                }
                Resolution::Failed => outcome.failed += 1,
            }
        }

        match &self.host {
            Some(host) => {
                let uploaded = self
                    .upload_batch(Arc::clone(host), local, image_dir, &mut outcome)
                    .await;
                if uploaded {
                    remove_dir_if_empty(&image_path).await;
                }
            }
            None => {
                for (token, file_name, _) in local {
                    outcome
                        .links
                        .insert(token, format!("./{}/{}", image_dir, file_name));
                }
            }
        }

        outcome
    }

    /// Resolution layers for one token, cheapest first.
    async fn resolve_one(
        &self,
        token: &str,
        image_path: &Path,
        cancel: &CancellationToken,
    ) -> Resolution {
        if let Some(url) = self.cache.get(token).await {
            return Resolution::Hosted(url);
        }

        if let Some(file_name) = find_local_file(image_path, token).await {
            let path = image_path.join(&file_name);
            return Resolution::Local {
                file_name,
                path,
                fresh: false,
            };
        }

        if let Some(host) = &self.host {
            match host.find_by_token_prefix(token).await {
                Ok(Some(url)) => {
                    self.cache.put(token, &url).await;
                    return Resolution::Hosted(url);
                }
                Ok(None) => {}
                Err(err) => {
                    debug!(token, error = %err, "host prefix probe failed, will download");
                }
            }
        }

        match self.download(token, image_path, cancel).await {
            Ok((file_name, path)) => Resolution::Local {
                file_name,
                path,
                fresh: true,
            },
            Err(err) => {
                warn!(token, error = %err.detail(), "asset download failed, leaving token unresolved");
                Resolution::Failed
            }
        }
    }

    async fn download(
        &self,
        token: &str,
        image_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(String, PathBuf)> {
        self.limiter.wait(cancel).await?;
        let payload = self.store.fetch_asset(token).await?;

        let ext = payload
            .file_name
            .as_deref()
            .and_then(|name| name.rsplit('.').next())
            .map(str::to_lowercase)
            .filter(|ext| !ext.is_empty())
            .unwrap_or_else(|| "png".to_string());
        let file_name = format!("{}.{}", token, ext);

        let data = if ext == "png" {
            recompress_png(&payload.data).unwrap_or_else(|| payload.data.to_vec())
        } else {
            payload.data.to_vec()
        };

        fs::create_dir_all(image_path).await?;
        let path = image_path.join(&file_name);
        if fs::write(&path, &data).await.is_err() {
            // Sibling documents share this directory; their post-upload
            // cleanup can remove it between our create and write.
            fs::create_dir_all(image_path).await?;
            fs::write(&path, &data).await?;
        }

        Ok((file_name, path))
    }

    /// Uploads local files, records each success in the durable cache and
    /// deletes the local copy. Failed uploads keep the local link.
    /// Returns whether any upload succeeded.
    async fn upload_batch(
        &self,
        host: Arc<dyn AssetHost>,
        local: Vec<(String, String, PathBuf)>,
        image_dir: &str,
        outcome: &mut AssetOutcome,
    ) -> bool {
        let results: Vec<(String, String, PathBuf, Option<String>)> = stream::iter(local)
            .map(|(token, file_name, path)| {
                let host = Arc::clone(&host);
                async move {
                    let url = match fs::read(&path).await {
                        Ok(data) => match host.upload(data.into(), &file_name).await {
                            Ok(url) => Some(url),
                            Err(err) => {
                                warn!(file = %file_name, host = host.name(), error = %err, "upload failed, keeping local copy");
                                None
                            }
                        },
                        Err(err) => {
                            warn!(file = %file_name, error = %err, "local read for upload failed");
                            None
                        }
                    };
                    (token, file_name, path, url)
                }
            })
            .buffer_unordered(self.upload_concurrency.max(1))
            .collect()
            .await;

        let mut any_uploaded = false;
        for (token, file_name, path, url) in results {
            match url {
                Some(url) => {
                    self.cache.put(&token, &url).await;
                    if let Err(err) = fs::remove_file(&path).await {
                        debug!(path = %path.display(), error = %err, "uploaded file not deleted");
                    }
                    outcome.links.insert(token, url);
                    any_uploaded = true;
                }
                None => {
                    outcome
                        .links
                        .insert(token, format!("./{}/{}", image_dir, file_name));
                }
            }
        }
        any_uploaded
    }
}

/// Replaces each token occurrence in the body with its resolved link.
/// Unresolved tokens are left exactly as they were.
pub fn rewrite_links(body: &str, links: &HashMap<String, String>) -> String {
    let mut out = body.to_string();
    for (token, link) in links {
        out = out.replace(token.as_str(), link.as_str());
    }
    out
}

fn dedup_preserving_order(tokens: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokens
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}

/// Looks for an existing `<token>.*` file in the image directory.
async fn find_local_file(image_path: &Path, token: &str) -> Option<String> {
    let prefix = format!("{}.", token);
    let mut entries = fs::read_dir(image_path).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with(&prefix) {
            return Some(name);
        }
    }
    None
}

/// Lossless re-encode at best compression. `None` on any codec failure.
fn recompress_png(data: &[u8]) -> Option<Vec<u8>> {
    let img = image::load_from_memory_with_format(data, ImageFormat::Png).ok()?;
    let mut out = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
    img.write_with_encoder(encoder).ok()?;
    Some(out)
}

async fn remove_dir_if_empty(path: &Path) {
    let Ok(mut entries) = fs::read_dir(path).await else {
        return;
    };
    if let Ok(None) = entries.next_entry().await {
        drop(entries);
        if let Err(err) = fs::remove_dir(path).await {
            debug!(path = %path.display(), error = %err, "empty image dir not removed");
        }
    }
}
