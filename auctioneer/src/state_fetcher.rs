//! Parallel fan-out over every known cell client to build this batch's live
//! view of the fleet (§4.1, §4.4).
//!
//! A cell that errors on fetch, or reports itself as evacuating, is dropped
//! entirely for this batch rather than surfaced as a scheduling error — from
//! the scheduler's point of view an unreachable cell simply does not exist
//! this round.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cell::Cell;
use crate::delegate::CellClient;
use crate::logger::warn_if_slow;
use crate::metrics::counters::Counters;
use crate::model::CellId;
use crate::worker_pool;

pub async fn fetch_cells(
    clients: HashMap<CellId, Arc<dyn CellClient>>,
    worker_pool_size: usize,
    slow_phase_threshold: Duration,
    counters: &Counters,
) -> HashMap<CellId, Cell> {
    let items: Vec<(CellId, Arc<dyn CellClient>)> = clients.into_iter().collect();

    let fetched = warn_if_slow("state_fetch", slow_phase_threshold, async {
        worker_pool::run_bounded(items, worker_pool_size, |(id, client)| async move {
            let result = client.state().await;
            (id, client, result)
        })
        .await
    })
    .await;

    let mut cells = HashMap::with_capacity(fetched.len());
    for (id, client, result) in fetched {
        match result {
            Ok(state) if state.evacuating => {
                tracing::info!(cell_id = %id, "dropping evacuating cell from this batch");
                counters.cells_dropped_on_fetch.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            Ok(state) => {
                cells.insert(id.clone(), Cell::new(id, client, state));
            }
            Err(err) => {
                tracing::warn!(cell_id = %id, error = %err, "dropping unreachable cell from this batch");
                counters.cells_dropped_on_fetch.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }
    }
    cells
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CellState, FailedWork, Work};
    use async_trait::async_trait;
    use std::collections::HashMap as Map;

    struct FakeClient {
        evacuating: bool,
        fail: bool,
    }

    #[async_trait]
    impl CellClient for FakeClient {
        async fn state(&self) -> anyhow::Result<CellState> {
            if self.fail {
                anyhow::bail!("unreachable");
            }
            Ok(CellState {
                zone: "z1".to_string(),
                memory_mb: 1000,
                disk_mb: 1000,
                containers: 100,
                evacuating: self.evacuating,
                root_fs_providers: Map::new(),
                resident_lrps: Vec::new(),
            })
        }

        async fn perform(&self, _work: Work) -> anyhow::Result<FailedWork> {
            Ok(FailedWork::default())
        }
    }

    #[tokio::test]
    async fn drops_unreachable_and_evacuating_cells() {
        let mut clients: HashMap<CellId, Arc<dyn CellClient>> = HashMap::new();
        clients.insert("healthy".to_string(), Arc::new(FakeClient { evacuating: false, fail: false }));
        clients.insert("evacuating".to_string(), Arc::new(FakeClient { evacuating: true, fail: false }));
        clients.insert("unreachable".to_string(), Arc::new(FakeClient { evacuating: false, fail: true }));

        let counters = Counters::default();
        let cells = fetch_cells(clients, 8, std::time::Duration::from_millis(500), &counters).await;

        assert_eq!(cells.len(), 1);
        assert!(cells.contains_key("healthy"));
        assert_eq!(counters.cells_dropped_on_fetch.load(std::sync::atomic::Ordering::Relaxed), 2);
    }
}
