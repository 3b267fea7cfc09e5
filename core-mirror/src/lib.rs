//! # Core Mirror Engine
//!
//! Mirrors a hierarchical remote document space onto a local Markdown tree.
//!
//! ## Overview
//!
//! A mirror run has two phases. The [`TreeResolver`](resolver::TreeResolver)
//! discovers every node of the space through limiter-gated, paginated
//! listing calls and derives a relative path for each. The
//! [`SyncScheduler`](scheduler::SyncScheduler) then fans the renderable
//! nodes out into bounded concurrent tasks that fetch, render and persist
//! each document, resolving image tokens through the
//! [`AssetPipeline`](assets::AssetPipeline) with its layered caches along
//! the way. Content-addressed skip logic makes re-runs against an unchanged
//! space perform zero writes.
//!
//! Remote services are consumed through the `store-traits` capability
//! traits; this crate never speaks a wire protocol.
//!
//! ## Usage
//!
//! ```ignore
//! use core_mirror::{MirrorConfig, SyncScheduler};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = MirrorConfig::builder()
//!     .output_dir("./mirror")
//!     .build()?;
//!
//! let scheduler = SyncScheduler::new(config, Arc::new(my_store), None).await;
//! scheduler.mirror("space-root-id", &CancellationToken::new()).await?;
//! ```

pub mod assets;
pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod meta;
pub mod resolver;
pub mod scheduler;
pub mod stats;

pub use config::{MirrorConfig, MirrorConfigBuilder, RateLimits};
pub use error::{MirrorError, Result};
pub use limiter::ApiRateLimiter;
pub use resolver::{sanitize_file_name, ResolvedTree, TreeResolver};
pub use scheduler::SyncScheduler;
pub use stats::{DocOutcome, DocRecord, Totals};
