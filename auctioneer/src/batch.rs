//! Accumulates incoming start/stop requests between scheduler passes.
//!
//! Starts are kept in arrival order and deduplicated by `(ProcessGuid,
//! Index)` on drain, keeping the first occurrence — two submissions for the
//! same identity before a drain describe one pending auction, not two.
//! Stops are keyed by `LrpKey` so that repeated stop requests for the same
//! instance collapse to the most recent one, matching this codebase's general
//! "last write wins" rule for idempotent re-submission.

use std::collections::HashMap;

use tokio::sync::mpsc;

use crate::model::{LrpKey, LrpStartRequest, LrpStopRequest};

/// Non-coalescing, capacity-1 wake signal: a `Batch` with work already
/// pending need not queue a second wake, since the Runner will drain
/// everything present the next time it looks. `try_send` here is
/// intentionally non-blocking — callers adding work to the batch must never
/// stall waiting on the Runner to catch up.
pub struct HasWork {
    tx: mpsc::Sender<()>,
}

impl HasWork {
    fn signal(&self) {
        let _ = self.tx.try_send(());
    }
}

pub struct Batch {
    starts: Vec<LrpStartRequest>,
    stops: HashMap<LrpKey, LrpStopRequest>,
    wake: HasWork,
}

impl Batch {
    /// Builds a batch alongside the receiver half of its wake channel, which
    /// the Runner selects on.
    pub fn new(wake_capacity: usize) -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(wake_capacity);
        (
            Self {
                starts: Vec::new(),
                stops: HashMap::new(),
                wake: HasWork { tx },
            },
            rx,
        )
    }

    pub fn add_lrp_start_auction(&mut self, req: LrpStartRequest) {
        self.starts.push(req);
        self.wake.signal();
    }

    pub fn add_lrp_stop_auction(&mut self, req: LrpStopRequest) {
        self.stops.insert(req.key(), req);
        self.wake.signal();
    }

    pub fn has_work(&self) -> bool {
        !self.starts.is_empty() || !self.stops.is_empty()
    }

    /// Atomically takes everything currently queued, leaving the batch
    /// empty. Called once per Runner iteration, under the same lock that
    /// guards the add methods.
    ///
    /// Starts are deduplicated by `(ProcessGuid, Index)`, keeping the first
    /// occurrence and preserving arrival order for the rest — a caller that
    /// submitted the same identity twice before a drain meant one auction,
    /// not two.
    pub fn dedupe_and_drain(&mut self) -> (Vec<LrpStartRequest>, Vec<LrpStopRequest>) {
        let raw_starts = std::mem::take(&mut self.starts);
        let mut seen = std::collections::HashSet::with_capacity(raw_starts.len());
        let starts = raw_starts
            .into_iter()
            .filter(|req| seen.insert(req.key()))
            .collect();
        let stops = std::mem::take(&mut self.stops).into_values().collect();
        (starts, stops)
    }

    /// Re-queues starts that failed but have retries remaining. Signals the
    /// wake channel so the Runner's next loop iteration picks this work back
    /// up, since by the time resubmission runs the wake channel has already
    /// been drained for this iteration.
    pub fn resubmit_start_auctions(&mut self, reqs: Vec<LrpStartRequest>) {
        if reqs.is_empty() {
            return;
        }
        self.starts.extend(reqs);
        self.wake.signal();
    }

    pub fn resubmit_stop_auctions(&mut self, reqs: Vec<LrpStopRequest>) {
        if reqs.is_empty() {
            return;
        }
        for req in reqs {
            self.stops.insert(req.key(), req);
        }
        self.wake.signal();
    }
}
