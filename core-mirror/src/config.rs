//! # Mirror Configuration Module
//!
//! Provides configuration management for the mirror engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! `MirrorConfig` instance holding every knob the engine reads. It enforces
//! fail-fast validation so that misconfiguration surfaces before any remote
//! call is made. Configuration is threaded explicitly through the engine;
//! there is no process-global state.
//!
//! ## Usage
//!
//! ```ignore
//! use core_mirror::config::MirrorConfig;
//!
//! let config = MirrorConfig::builder()
//!     .output_dir("/path/to/mirror")
//!     .force(false)
//!     .build()?;
//! ```

use std::path::PathBuf;

use crate::error::{MirrorError, Result};

/// Token-bucket ceilings applied to every remote call.
///
/// Two buckets are consulted together: a short window smoothing sustained
/// throughput and a long window capping aggregate volume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimits {
    /// Short-window refill rate, tokens per second
    pub per_second: f64,
    /// Short-window burst capacity
    pub second_burst: u32,
    /// Long-window refill rate, tokens per minute
    pub per_minute: f64,
    /// Long-window burst capacity
    pub minute_burst: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_second: 5.0,
            second_burst: 5,
            per_minute: 100.0,
            minute_burst: 10,
        }
    }
}

/// Configuration for one mirror run.
///
/// Use [`MirrorConfig::builder`] to construct instances.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Root directory the space is mirrored into (required)
    pub output_dir: PathBuf,

    /// Per-document image subdirectory name
    pub image_dir: String,

    /// Directory holding durable engine state (the upload cache)
    pub cache_dir: PathBuf,

    /// Name document files after their sanitized title; when false the
    /// document id is used instead
    pub title_as_filename: bool,

    /// Skip writing documents whose rendered output matches the file
    /// already on disk
    pub skip_unchanged: bool,

    /// Rewrite everything regardless of on-disk state
    pub force: bool,

    /// Leave image tokens untouched and perform no asset work
    pub skip_images: bool,

    /// Which path segment names the category: positive counts from the
    /// outermost (1-based), negative from the innermost, 0 disables
    /// path-derived categories
    pub category_level: i32,

    /// Category label used when no path segment supplies one
    pub default_category: String,

    /// Documents synced concurrently
    pub max_concurrent_documents: usize,

    /// Asset uploads in flight concurrently
    pub max_concurrent_uploads: usize,

    /// Remote-call rate limits
    pub rate_limits: RateLimits,
}

impl MirrorConfig {
    /// Creates a new builder with defaults applied.
    pub fn builder() -> MirrorConfigBuilder {
        MirrorConfigBuilder::new()
    }
}

/// Builder for [`MirrorConfig`] with fail-fast validation.
#[derive(Debug, Clone)]
pub struct MirrorConfigBuilder {
    output_dir: Option<PathBuf>,
    image_dir: String,
    cache_dir: PathBuf,
    title_as_filename: bool,
    skip_unchanged: bool,
    force: bool,
    skip_images: bool,
    category_level: i32,
    default_category: String,
    max_concurrent_documents: usize,
    max_concurrent_uploads: usize,
    rate_limits: RateLimits,
}

impl Default for MirrorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MirrorConfigBuilder {
    pub fn new() -> Self {
        Self {
            output_dir: None,
            image_dir: "img".to_string(),
            cache_dir: PathBuf::from(".spacemirror"),
            title_as_filename: true,
            skip_unchanged: true,
            force: false,
            skip_images: false,
            category_level: 1,
            default_category: "uncategorized".to_string(),
            max_concurrent_documents: 20,
            max_concurrent_uploads: 20,
            rate_limits: RateLimits::default(),
        }
    }

    /// Sets the output directory (required).
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Sets the per-document image subdirectory name.
    pub fn image_dir(mut self, name: impl Into<String>) -> Self {
        self.image_dir = name.into();
        self
    }

    /// Sets the durable state directory.
    pub fn cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = path.into();
        self
    }

    /// Name files after sanitized titles instead of document ids.
    pub fn title_as_filename(mut self, enabled: bool) -> Self {
        self.title_as_filename = enabled;
        self
    }

    /// Skip unchanged documents on re-runs.
    pub fn skip_unchanged(mut self, enabled: bool) -> Self {
        self.skip_unchanged = enabled;
        self
    }

    /// Rewrite everything regardless of on-disk state.
    pub fn force(mut self, enabled: bool) -> Self {
        self.force = enabled;
        self
    }

    /// Skip all asset work.
    pub fn skip_images(mut self, enabled: bool) -> Self {
        self.skip_images = enabled;
        self
    }

    /// Sets which path segment names the category.
    pub fn category_level(mut self, level: i32) -> Self {
        self.category_level = level;
        self
    }

    /// Sets the fallback category label.
    pub fn default_category(mut self, label: impl Into<String>) -> Self {
        self.default_category = label.into();
        self
    }

    /// Sets the document concurrency bound.
    pub fn max_concurrent_documents(mut self, n: usize) -> Self {
        self.max_concurrent_documents = n;
        self
    }

    /// Sets the upload concurrency bound.
    pub fn max_concurrent_uploads(mut self, n: usize) -> Self {
        self.max_concurrent_uploads = n;
        self
    }

    /// Sets the remote-call rate limits.
    pub fn rate_limits(mut self, limits: RateLimits) -> Self {
        self.rate_limits = limits;
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns `MirrorError::Config` with an actionable message when a
    /// required field is missing or a value is out of range.
    pub fn build(self) -> Result<MirrorConfig> {
        let output_dir = self.output_dir.ok_or_else(|| {
            MirrorError::Config(
                "output_dir is required. Provide the directory the space should be mirrored into."
                    .to_string(),
            )
        })?;

        if output_dir.as_os_str().is_empty() {
            return Err(MirrorError::Config(
                "output_dir cannot be empty".to_string(),
            ));
        }

        if self.image_dir.is_empty() {
            return Err(MirrorError::Config("image_dir cannot be empty".to_string()));
        }

        if self.cache_dir.as_os_str().is_empty() {
            return Err(MirrorError::Config("cache_dir cannot be empty".to_string()));
        }

        if self.max_concurrent_documents == 0 {
            return Err(MirrorError::Config(
                "max_concurrent_documents must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_uploads == 0 {
            return Err(MirrorError::Config(
                "max_concurrent_uploads must be greater than 0".to_string(),
            ));
        }

        let limits = self.rate_limits;
        if limits.per_second <= 0.0 || limits.per_minute <= 0.0 {
            return Err(MirrorError::Config(
                "rate limits must be greater than 0".to_string(),
            ));
        }
        if limits.second_burst == 0 || limits.minute_burst == 0 {
            return Err(MirrorError::Config(
                "rate limit bursts must be greater than 0".to_string(),
            ));
        }

        Ok(MirrorConfig {
            output_dir,
            image_dir: self.image_dir,
            cache_dir: self.cache_dir,
            title_as_filename: self.title_as_filename,
            skip_unchanged: self.skip_unchanged,
            force: self.force,
            skip_images: self.skip_images,
            category_level: self.category_level,
            default_category: self.default_category,
            max_concurrent_documents: self.max_concurrent_documents,
            max_concurrent_uploads: self.max_concurrent_uploads,
            rate_limits: self.rate_limits,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_with_defaults() {
        let config = MirrorConfig::builder()
            .output_dir("/tmp/mirror")
            .build()
            .unwrap();

        assert_eq!(config.image_dir, "img");
        assert_eq!(config.cache_dir, PathBuf::from(".spacemirror"));
        assert!(config.title_as_filename);
        assert!(config.skip_unchanged);
        assert!(!config.force);
        assert!(!config.skip_images);
        assert_eq!(config.category_level, 1);
        assert_eq!(config.default_category, "uncategorized");
        assert_eq!(config.max_concurrent_documents, 20);
        assert_eq!(config.max_concurrent_uploads, 20);
        assert_eq!(config.rate_limits, RateLimits::default());
    }

    #[test]
    fn test_missing_output_dir_fails() {
        let result = MirrorConfig::builder().build();
        assert!(matches!(result, Err(MirrorError::Config(_))));
    }

    #[test]
    fn test_zero_concurrency_fails() {
        let result = MirrorConfig::builder()
            .output_dir("/tmp/mirror")
            .max_concurrent_documents(0)
            .build();
        assert!(matches!(result, Err(MirrorError::Config(_))));
    }

    #[test]
    fn test_zero_rate_fails() {
        let result = MirrorConfig::builder()
            .output_dir("/tmp/mirror")
            .rate_limits(RateLimits {
                per_second: 0.0,
                ..RateLimits::default()
            })
            .build();
        assert!(matches!(result, Err(MirrorError::Config(_))));
    }

    #[test]
    fn test_builder_overrides() {
        let config = MirrorConfig::builder()
            .output_dir("/tmp/mirror")
            .image_dir("assets")
            .cache_dir("/tmp/state")
            .title_as_filename(false)
            .force(true)
            .default_category("notes")
            .max_concurrent_documents(4)
            .build()
            .unwrap();

        assert_eq!(config.image_dir, "assets");
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/state"));
        assert!(!config.title_as_filename);
        assert!(config.force);
        assert_eq!(config.default_category, "notes");
        assert_eq!(config.max_concurrent_documents, 4);
    }
}
