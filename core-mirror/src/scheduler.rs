//! # Sync Scheduler
//!
//! Fans the resolved tree out into bounded concurrent document tasks.
//!
//! ## Overview
//!
//! The scheduler turns every renderable node of a [`ResolvedTree`] into one
//! task: create the parent directory, fetch metadata and content through
//! the shared limiter, resolve assets, render the artifact, and write it
//! unless the on-disk copy already matches. Tasks run under a semaphore
//! bound and report failures through an unbounded channel; one document
//! failing never cancels its siblings. After every task has finished the
//! first captured error (in no particular order) is returned.
//!
//! A document's file is written into its *parent's* directory: a container
//! that is itself renderable gets a directory for its children and a file
//! alongside, in the directory of its own parent. Tags and category derive
//! from that parent-relative path.
//!
//! ## Usage
//!
//! ```ignore
//! use core_mirror::{MirrorConfig, SyncScheduler};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = MirrorConfig::builder().output_dir("./mirror").build()?;
//! let scheduler = SyncScheduler::new(config, store, None).await;
//! scheduler.mirror("space-root", &CancellationToken::new()).await?;
//! println!("{}", scheduler.render_report(started.elapsed()));
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use store_traits::{AssetHost, NodeKind, SpaceStore};
use tokio::fs;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::assets::{rewrite_links, AssetPipeline};
use crate::cache::{JsonFileCache, UploadCache};
use crate::config::MirrorConfig;
use crate::document::{render_document, should_skip};
use crate::error::{MirrorError, Result};
use crate::limiter::ApiRateLimiter;
use crate::meta::{category_from_path, tags_from_path};
use crate::resolver::{sanitize_file_name, ResolvedTree, TreeResolver};
use crate::stats::{DocOutcome, DocRecord, ReportCollector, SyncStats, Totals};

/// One document to sync. Built from the resolved tree, consumed once.
#[derive(Debug, Clone)]
struct SyncTask {
    node_id: String,
    /// Absolute directory the document file is written into.
    doc_dir: PathBuf,
    /// Output-root-relative directory, `"."` at the root.
    rel_dir: String,
    tags: Vec<String>,
    category: Option<String>,
}

impl SyncTask {
    /// Path used in reports when the task fails before the real file name
    /// is known.
    fn fallback_rel_path(&self) -> String {
        if self.rel_dir == "." {
            format!("{}.md", self.node_id)
        } else {
            format!("{}/{}.md", self.rel_dir, self.node_id)
        }
    }
}

/// Orchestrates one mirror run.
pub struct SyncScheduler {
    config: MirrorConfig,
    store: Arc<dyn SpaceStore>,
    limiter: Arc<ApiRateLimiter>,
    pipeline: Arc<AssetPipeline>,
    cache: Arc<dyn UploadCache>,
    stats: Arc<SyncStats>,
    report: Arc<ReportCollector>,
}

impl SyncScheduler {
    /// Creates a scheduler with the durable file-backed upload cache under
    /// the configured cache directory.
    pub async fn new(
        config: MirrorConfig,
        store: Arc<dyn SpaceStore>,
        host: Option<Arc<dyn AssetHost>>,
    ) -> Self {
        let cache: Arc<dyn UploadCache> = Arc::new(JsonFileCache::open(&config.cache_dir).await);
        Self::with_cache(config, store, host, cache)
    }

    /// Creates a scheduler with an injected upload cache.
    pub fn with_cache(
        config: MirrorConfig,
        store: Arc<dyn SpaceStore>,
        host: Option<Arc<dyn AssetHost>>,
        cache: Arc<dyn UploadCache>,
    ) -> Self {
        let limiter = Arc::new(ApiRateLimiter::new(config.rate_limits));
        let pipeline = Arc::new(AssetPipeline::new(
            Arc::clone(&store),
            host,
            Arc::clone(&cache),
            Arc::clone(&limiter),
            config.max_concurrent_uploads,
        ));

        Self {
            config,
            store,
            limiter,
            pipeline,
            cache,
            stats: Arc::new(SyncStats::new()),
            report: Arc::new(ReportCollector::new()),
        }
    }

    /// The limiter shared by every remote call of this run.
    pub fn limiter(&self) -> Arc<ApiRateLimiter> {
        Arc::clone(&self.limiter)
    }

    /// Snapshot of the aggregate counters.
    pub fn totals(&self) -> Totals {
        self.stats.snapshot()
    }

    /// Final human-readable report, sorted by document path.
    pub fn render_report(&self, elapsed: Duration) -> String {
        self.report.render(self.stats.snapshot(), elapsed)
    }

    /// Resolves the space under `root_id` and syncs it.
    #[instrument(skip(self, cancel), fields(root_id = %root_id))]
    pub async fn mirror(&self, root_id: &str, cancel: &CancellationToken) -> Result<()> {
        let resolver = TreeResolver::new(Arc::clone(&self.store), Arc::clone(&self.limiter));
        let tree = resolver.resolve_all(root_id, cancel).await?;
        self.run(&tree, cancel).await
    }

    /// Syncs every renderable node of an already-resolved tree.
    ///
    /// # Errors
    ///
    /// Returns the first document-level error captured, after all tasks
    /// have finished. Asset-level failures never surface here.
    #[instrument(skip_all)]
    pub async fn run(&self, tree: &ResolvedTree, cancel: &CancellationToken) -> Result<()> {
        let tasks = self.build_tasks(tree);
        self.stats.set_total_docs(tasks.len());
        info!(docs = tasks.len(), "sync starting");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_documents));
        let (tx, mut rx) = mpsc::unbounded_channel::<MirrorError>();
        let mut join_set = JoinSet::new();

        for task in tasks {
            let scheduler = self.clone_for_task();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let tx = tx.clone();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                if let Err(err) = scheduler.sync_document(&task, &cancel).await {
                    warn!(node_id = %task.node_id, error = %err.detail(), "document sync failed");
                    scheduler.report.add(DocRecord {
                        rel_path: task.fallback_rel_path(),
                        outcome: DocOutcome::Failed(err.detail()),
                        images_new: 0,
                        images_cached: 0,
                    });
                    let _ = tx.send(err);
                }
            });
        }
        drop(tx);

        let mut first_error: Option<MirrorError> = None;
        while let Some(joined) = join_set.join_next().await {
            if let Err(join_err) = joined {
                error!(error = %join_err, "document task panicked");
                first_error.get_or_insert(MirrorError::TaskPanic(join_err.to_string()));
            }
        }
        while let Ok(err) = rx.try_recv() {
            first_error.get_or_insert(err);
        }

        // Fire-and-forget cache writes must land before the process exits.
        if let Err(err) = self.cache.flush().await {
            warn!(error = %err, "upload cache flush failed");
        }

        let totals = self.stats.snapshot();
        info!(
            docs = totals.total_docs,
            new_docs = totals.new_docs,
            images = totals.total_images,
            new_images = totals.new_images,
            "sync finished"
        );

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// One task per renderable node. The file lands in the parent's
    /// directory, so tags and category come from the parent's path.
    fn build_tasks(&self, tree: &ResolvedTree) -> Vec<SyncTask> {
        let mut tasks = Vec::new();
        for node in &tree.nodes {
            if node.kind != NodeKind::Document {
                continue;
            }
            let Some(rel_dir) = tree.paths.get(&node.parent_id) else {
                warn!(node_id = %node.id, parent_id = %node.parent_id, "parent has no resolved path, skipping");
                continue;
            };

            let doc_dir = if rel_dir == "." {
                self.config.output_dir.clone()
            } else {
                self.config.output_dir.join(rel_dir)
            };

            tasks.push(SyncTask {
                node_id: node.id.clone(),
                doc_dir,
                rel_dir: rel_dir.clone(),
                tags: tags_from_path(rel_dir),
                category: category_from_path(rel_dir, self.config.category_level),
            });
        }
        tasks
    }

    #[instrument(skip(self, cancel), fields(node_id = %task.node_id))]
    async fn sync_document(&self, task: &SyncTask, cancel: &CancellationToken) -> Result<()> {
        fs::create_dir_all(&task.doc_dir).await?;

        self.limiter.wait(cancel).await?;
        let meta = self.store.fetch_meta(&task.node_id).await?;

        self.limiter.wait(cancel).await?;
        let content = self.store.fetch_content(&task.node_id).await?;

        let file_stem = if self.config.title_as_filename {
            sanitize_file_name(&meta.title)
        } else {
            task.node_id.clone()
        };
        let file_name = format!("{}.md", file_stem);
        let out_path = task.doc_dir.join(&file_name);
        let rel_path = if task.rel_dir == "." {
            file_name.clone()
        } else {
            format!("{}/{}", task.rel_dir, file_name)
        };

        let mut body = content.body;
        let mut images_new = 0;
        let mut images_cached = 0;
        if !self.config.skip_images && !content.image_tokens.is_empty() {
            let outcome = self
                .pipeline
                .resolve(
                    &content.image_tokens,
                    &task.doc_dir,
                    &self.config.image_dir,
                    cancel,
                )
                .await;
            self.stats
                .record_images(outcome.unique_tokens, outcome.downloaded);
            images_new = outcome.downloaded;
            images_cached = outcome.cached;
            body = rewrite_links(&body, &outcome.links);
        }

        let rendered = render_document(
            &meta,
            &task.node_id,
            &body,
            &task.tags,
            task.category.as_deref(),
            &self.config.default_category,
        );

        if should_skip(
            &out_path,
            &rendered,
            self.config.skip_unchanged,
            self.config.force,
        )
        .await
        {
            debug!(path = %rel_path, "unchanged, skipping write");
            self.report.add(DocRecord {
                rel_path,
                outcome: DocOutcome::Unchanged,
                images_new,
                images_cached,
            });
            return Ok(());
        }

        fs::write(&out_path, rendered).await?;
        self.stats.record_new_doc();
        debug!(path = %rel_path, "document written");
        self.report.add(DocRecord {
            rel_path,
            outcome: DocOutcome::New,
            images_new,
            images_cached,
        });
        Ok(())
    }

    /// Cheap handle for spawned tasks: shared state stays shared.
    fn clone_for_task(&self) -> Self {
        Self {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            limiter: Arc::clone(&self.limiter),
            pipeline: Arc::clone(&self.pipeline),
            cache: Arc::clone(&self.cache),
            stats: Arc::clone(&self.stats),
            report: Arc::clone(&self.report),
        }
    }
}
