//! The per-batch scheduling algorithm (§4.2): stops before starts, a single
//! best-fit winner per request, a parallel commit phase, and bookkeeping of
//! attempts/wait-time on every outcome.

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;

use crate::cell::Cell;
use crate::clock::Clock;
use crate::error::CellError;
use crate::logger::warn_if_slow;
use crate::metrics::counters::Counters;
use crate::model::{AuctionResults, CellId, LrpKey, LrpStartRequest, LrpStopRequest, StopInstance};
use crate::worker_pool;

/// Runs one scheduling pass over `cells` for the given batch of requests,
/// consuming the fetched cell set (nothing downstream needs it once the
/// commit phase has run).
pub async fn schedule(
    mut cells: HashMap<CellId, Cell>,
    mut starts: Vec<LrpStartRequest>,
    stops: Vec<LrpStopRequest>,
    worker_pool_size: usize,
    slow_phase_threshold: Duration,
    clock: &dyn Clock,
    rng: &mut impl Rng,
    counters: &Counters,
) -> AuctionResults {
    if cells.is_empty() {
        let mut results = AuctionResults {
            failed_starts: starts,
            failed_stops: stops,
            ..Default::default()
        };
        mark_results(&mut results, clock);
        return results;
    }

    let mut results = AuctionResults::default();

    for stop in stops {
        results.successful_stops.push(schedule_stop_auction(&mut cells, stop));
    }

    // Largest requests placed first: a few big instances are far more likely
    // to find no fit at all once small ones have already packed every cell,
    // so giving them first pick avoids starving them on tie-break luck.
    starts.sort_by(|a, b| b.memory_mb.cmp(&a.memory_mb));

    let mut successful_starts: HashMap<LrpKey, LrpStartRequest> = HashMap::new();
    let mut start_lookup: HashMap<LrpKey, LrpStartRequest> = HashMap::new();

    for start in starts {
        let key = start.key();
        start_lookup.insert(key.clone(), start.clone());

        match schedule_start_auction(&mut cells, start, rng) {
            Ok(winning) => {
                successful_starts.insert(key, winning);
            }
            Err(_) => {
                results.failed_starts.push(start_lookup.get(&key).unwrap().clone());
            }
        }
    }

    let failed_works = commit_cells(cells, worker_pool_size, slow_phase_threshold).await;
    for failed_work in failed_works {
        if !failed_work.starts.is_empty() || !failed_work.tasks.is_empty() {
            counters.commits_with_failed_work.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        for failed_start in failed_work.starts {
            let key = failed_start.key();
            successful_starts.remove(&key);
            if let Some(original) = start_lookup.get(&key) {
                results.failed_starts.push(original.clone());
            }
        }
        // Task placement has no retry lifecycle in the core (§GLOSSARY); a
        // commit-time task rejection is visible only via the counter above.
    }

    results.successful_starts.extend(successful_starts.into_values());

    mark_results(&mut results, clock);
    results
}

fn schedule_start_auction(
    cells: &mut HashMap<CellId, Cell>,
    mut req: LrpStartRequest,
    rng: &mut impl Rng,
) -> Result<LrpStartRequest, CellError> {
    let mut winner_guids: Vec<CellId> = Vec::new();
    let mut winner_score = f64::MAX;

    for (guid, cell) in cells.iter() {
        let score = match cell.score_for_lrp_auction(&req) {
            Ok(score) => score,
            Err(_) => continue,
        };

        if score == winner_score {
            winner_guids.push(guid.clone());
        } else if score < winner_score {
            winner_score = score;
            winner_guids = vec![guid.clone()];
        }
    }

    let winner_guid = winner_guids
        .choose(rng)
        .cloned()
        .ok_or(CellError::InsufficientResources)?;

    req.winner = Some(winner_guid.clone());
    cells.get_mut(&winner_guid).expect("winner guid came from cells").reserve_lrp(req.clone())?;

    Ok(req)
}

fn schedule_stop_auction(cells: &mut HashMap<CellId, Cell>, mut req: LrpStopRequest) -> LrpStopRequest {
    let mut winner_guid: Option<CellId> = None;
    let mut winner_score = f64::MAX;
    let mut instances_to_stop: HashMap<CellId, Vec<StopInstance>> = HashMap::new();

    for (guid, cell) in cells.iter() {
        if let Some((score, instances)) = cell.score_for_stop_auction(&req) {
            instances_to_stop.insert(guid.clone(), instances);
            if score < winner_score {
                winner_score = score;
                winner_guid = Some(guid.clone());
            }
        }
    }

    // No cell reports this instance any more: nothing to do this round. If
    // it still exists out there, the next fetch will surface it again.
    let Some(winner_guid) = winner_guid else {
        return req;
    };

    req.winner = Some(winner_guid.clone());

    if let Some(winner_instances) = instances_to_stop.remove(&winner_guid) {
        for instance in winner_instances.into_iter().skip(1) {
            if let Some(cell) = cells.get_mut(&winner_guid) {
                cell.stage_stop(instance);
            }
        }
    }

    for (guid, instances) in instances_to_stop {
        if let Some(cell) = cells.get_mut(&guid) {
            for instance in instances {
                cell.stage_stop(instance);
            }
        }
    }

    req
}

async fn commit_cells(
    cells: HashMap<CellId, Cell>,
    worker_pool_size: usize,
    slow_phase_threshold: Duration,
) -> Vec<crate::model::FailedWork> {
    let items: Vec<Cell> = cells.into_values().collect();
    warn_if_slow("commit", slow_phase_threshold, async {
        worker_pool::run_bounded(items, worker_pool_size, |mut cell| async move { cell.commit().await }).await
    })
    .await
}

fn mark_results(results: &mut AuctionResults, clock: &dyn Clock) {
    let now = clock.now();

    for start in &mut results.failed_starts {
        start.attempts += 1;
    }
    for stop in &mut results.failed_stops {
        stop.attempts += 1;
    }
    for start in &mut results.successful_starts {
        start.attempts += 1;
        start.wait_duration = now.saturating_duration_since(start.queue_time);
    }
    for stop in &mut results.successful_stops {
        stop.attempts += 1;
        stop.wait_duration = now.saturating_duration_since(stop.queue_time);
    }
}
