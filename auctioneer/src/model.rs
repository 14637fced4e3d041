//! Domain types shared across the auction pipeline: resource vectors, rootfs
//! providers, placement requests, and the cell-side view of the world.
//!
//! These are plain data; the behavior that interprets them (scoring, fit
//! checks, reservation) lives in [`crate::cell`].

use std::collections::HashSet;
use std::time::{Duration, Instant};

pub type CellId = String;
pub type ProcessGuid = String;

/// A cell's scheme → rootfs-support mapping.
///
/// `FixedSet` advertises a closed set of rootfs paths the cell can serve for
/// that scheme; `Arbitrary` means any path under the scheme is acceptable.
#[derive(Debug, Clone)]
pub enum RootFSProvider {
    FixedSet(HashSet<String>),
    Arbitrary,
}

impl RootFSProvider {
    pub fn fixed_set(paths: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::FixedSet(paths.into_iter().map(Into::into).collect())
    }

    fn supports(&self, path: &str) -> bool {
        match self {
            RootFSProvider::Arbitrary => true,
            RootFSProvider::FixedSet(set) => set.contains(path),
        }
    }
}

/// Splits a rootfs URL of the form `scheme:path` or `scheme://path` into its
/// scheme and path components.
pub fn split_rootfs(rootfs: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = rootfs.split_once(':')?;
    let path = rest.strip_prefix("//").unwrap_or(rest);
    if scheme.is_empty() || path.is_empty() {
        return None;
    }
    Some((scheme, path))
}

pub fn rootfs_supported(providers: &std::collections::HashMap<String, RootFSProvider>, rootfs: &str) -> bool {
    match split_rootfs(rootfs) {
        Some((scheme, path)) => providers.get(scheme).is_some_or(|p| p.supports(path)),
        None => false,
    }
}

/// The three scalar capacities every cell advertises.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resources {
    pub memory_mb: u64,
    pub disk_mb: u64,
    pub containers: u64,
}

/// A resident LRP instance as reported by a cell. `instance_id` distinguishes
/// replicas that share the same `(ProcessGuid, Index)` — the desired slot
/// number — during rebalancing, when more than one actual instance can
/// transiently occupy it.
#[derive(Debug, Clone)]
pub struct LrpInstance {
    pub process_guid: ProcessGuid,
    pub index: u32,
    pub instance_id: String,
    pub memory_mb: u64,
    pub disk_mb: u64,
}

/// A start/stop *request* identity `(ProcessGuid, Index)`, used for dedup and
/// retry bookkeeping. A single request can match zero, one, or many resident
/// `LrpInstance`s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LrpKey {
    pub process_guid: ProcessGuid,
    pub index: u32,
}

impl LrpKey {
    pub fn new(process_guid: impl Into<ProcessGuid>, index: u32) -> Self {
        Self {
            process_guid: process_guid.into(),
            index,
        }
    }
}

/// A single concrete resident instance targeted for termination. Unlike
/// `LrpKey`, this carries enough identity to single out one replica among
/// several sharing the same `(ProcessGuid, Index)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StopInstance {
    pub process_guid: ProcessGuid,
    pub index: u32,
    pub instance_id: String,
}

/// A request to start one LRP instance.
#[derive(Debug, Clone)]
pub struct LrpStartRequest {
    pub process_guid: ProcessGuid,
    pub index: u32,
    pub root_fs: String,
    pub memory_mb: u64,
    pub disk_mb: u64,
    pub queue_time: Instant,
    pub attempts: u32,
    pub winner: Option<CellId>,
    pub wait_duration: Duration,
}

impl LrpStartRequest {
    pub fn new(
        process_guid: impl Into<ProcessGuid>,
        index: u32,
        root_fs: impl Into<String>,
        memory_mb: u64,
        disk_mb: u64,
        queue_time: Instant,
    ) -> Self {
        Self {
            process_guid: process_guid.into(),
            index,
            root_fs: root_fs.into(),
            memory_mb,
            disk_mb,
            queue_time,
            attempts: 0,
            winner: None,
            wait_duration: Duration::ZERO,
        }
    }

    pub fn key(&self) -> LrpKey {
        LrpKey::new(self.process_guid.clone(), self.index)
    }
}

/// A request to stop surplus replicas of `(process_guid, index)`.
#[derive(Debug, Clone)]
pub struct LrpStopRequest {
    pub process_guid: ProcessGuid,
    pub index: u32,
    pub queue_time: Instant,
    pub attempts: u32,
    pub winner: Option<CellId>,
    pub wait_duration: Duration,
}

impl LrpStopRequest {
    pub fn new(process_guid: impl Into<ProcessGuid>, index: u32, queue_time: Instant) -> Self {
        Self {
            process_guid: process_guid.into(),
            index,
            queue_time,
            attempts: 0,
            winner: None,
            wait_duration: Duration::ZERO,
        }
    }

    pub fn key(&self) -> LrpKey {
        LrpKey::new(self.process_guid.clone(), self.index)
    }
}

/// A one-shot task placement request. Shares the scoring/reservation path
/// with starts but has no retry lifecycle in the core.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub task_guid: String,
    pub root_fs: String,
    pub memory_mb: u64,
    pub disk_mb: u64,
}

/// Snapshot of a cell's remote state, as returned by `CellClient::state`.
#[derive(Debug, Clone)]
pub struct CellState {
    pub zone: String,
    pub memory_mb: u64,
    pub disk_mb: u64,
    pub containers: u64,
    pub evacuating: bool,
    pub root_fs_providers: std::collections::HashMap<String, RootFSProvider>,
    pub resident_lrps: Vec<LrpInstance>,
}

/// Work staged for a single cell, handed to `CellClient::perform` at commit
/// time.
#[derive(Debug, Clone, Default)]
pub struct Work {
    pub start_lrps: Vec<LrpStartRequest>,
    pub start_tasks: Vec<TaskRequest>,
    pub stop_instances: Vec<StopInstance>,
}

impl Work {
    pub fn is_empty(&self) -> bool {
        self.start_lrps.is_empty() && self.start_tasks.is_empty() && self.stop_instances.is_empty()
    }
}

/// The subset of a `Work` bundle a cell refused at commit time.
#[derive(Debug, Clone, Default)]
pub struct FailedWork {
    pub starts: Vec<LrpStartRequest>,
    pub tasks: Vec<TaskRequest>,
}

/// Output of one scheduler pass over a batch.
#[derive(Debug, Clone, Default)]
pub struct AuctionResults {
    pub successful_starts: Vec<LrpStartRequest>,
    pub successful_stops: Vec<LrpStopRequest>,
    pub failed_starts: Vec<LrpStartRequest>,
    pub failed_stops: Vec<LrpStopRequest>,
}

impl AuctionResults {
    pub fn is_empty(&self) -> bool {
        self.successful_starts.is_empty()
            && self.successful_stops.is_empty()
            && self.failed_starts.is_empty()
            && self.failed_stops.is_empty()
    }
}
