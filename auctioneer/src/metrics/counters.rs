use std::sync::Arc;
use std::sync::atomic::AtomicU64;

/// Minimal in-process counters for operational visibility. No exporter is
/// wired in here; that's a deployment concern outside this crate.
#[derive(Clone, Default)]
pub struct Counters {
    pub batches_processed: Arc<AtomicU64>,

    pub starts_succeeded: Arc<AtomicU64>,
    pub starts_failed: Arc<AtomicU64>,
    pub stops_succeeded: Arc<AtomicU64>,
    pub stops_failed: Arc<AtomicU64>,

    pub cells_dropped_on_fetch: Arc<AtomicU64>,
    pub commits_with_failed_work: Arc<AtomicU64>,

    pub starts_resubmitted: Arc<AtomicU64>,
    pub stops_resubmitted: Arc<AtomicU64>,
}
