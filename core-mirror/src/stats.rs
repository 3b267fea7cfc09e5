//! Run statistics and the final report.
//!
//! Counters are mutated from many document tasks at once, so everything
//! lives behind locks and is exposed through methods only. The report is a
//! per-document line listing sorted by path, followed by aggregate totals.

use std::fmt::Write as _;
use std::sync::Mutex;
use std::time::Duration;

/// Aggregate counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    /// Documents scheduled for sync
    pub total_docs: usize,
    /// Documents actually written
    pub new_docs: usize,
    /// Unique image tokens encountered
    pub total_images: usize,
    /// Images freshly downloaded
    pub new_images: usize,
}

/// Thread-safe counter set.
#[derive(Debug, Default)]
pub struct SyncStats {
    totals: Mutex<Totals>,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Totals> {
        match self.totals.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn set_total_docs(&self, n: usize) {
        self.lock().total_docs = n;
    }

    pub fn record_new_doc(&self) {
        self.lock().new_docs += 1;
    }

    /// Records one document's image work: unique tokens encountered and
    /// how many required a fresh download.
    pub fn record_images(&self, encountered: usize, fresh: usize) {
        let mut totals = self.lock();
        totals.total_images += encountered;
        totals.new_images += fresh;
    }

    pub fn snapshot(&self) -> Totals {
        *self.lock()
    }
}

/// How one document's sync ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocOutcome {
    /// Written (first sync or content changed)
    New,
    /// On-disk file already matched, nothing written
    Unchanged,
    /// Task failed; the reason is reported but siblings kept running
    Failed(String),
}

impl DocOutcome {
    fn label(&self) -> &str {
        match self {
            Self::New => "new",
            Self::Unchanged => "unchanged",
            Self::Failed(_) => "failed",
        }
    }
}

/// One line of the final report.
#[derive(Debug, Clone)]
pub struct DocRecord {
    /// Output-root-relative path of the document file
    pub rel_path: String,
    pub outcome: DocOutcome,
    /// Images freshly downloaded for this document
    pub images_new: usize,
    /// Images served from a cache layer
    pub images_cached: usize,
}

/// Collects per-document records across tasks.
#[derive(Debug, Default)]
pub struct ReportCollector {
    records: Mutex<Vec<DocRecord>>,
}

impl ReportCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, record: DocRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }

    /// Renders the human-readable report: one line per document sorted by
    /// path, then totals with elapsed time.
    pub fn render(&self, totals: Totals, elapsed: Duration) -> String {
        let mut records = match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        records.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));

        let mut out = String::new();
        for record in &records {
            let _ = write!(out, "  {:<10} {}", record.outcome.label(), record.rel_path);
            if record.images_new + record.images_cached > 0 {
                let _ = write!(
                    out,
                    " (+{} img, {} hit)",
                    record.images_new, record.images_cached
                );
            }
            if let DocOutcome::Failed(reason) = &record.outcome {
                let _ = write!(out, ": {}", reason);
            }
            out.push('\n');
        }

        let _ = write!(
            out,
            "Documents: {} total, {} new. Images: {} total, {} new. Elapsed: {:.1}s",
            totals.total_docs,
            totals.new_docs,
            totals.total_images,
            totals.new_images,
            elapsed.as_secs_f64()
        );
        out
    }
}
