//! Bounded fan-out helper shared by the state-fetch and commit phases.
//!
//! Both phases need to run one future per cell without letting a fleet of a
//! few thousand cells spawn a few thousand unbounded tasks at once. This
//! wraps the `JoinSet` fan-in pattern this codebase already uses for bulk
//! concurrent work, gated by a semaphore permit per task.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Runs `make_future(item)` for every item in `items`, with at most
/// `capacity` futures in flight at once, and returns the outputs in
/// completion order (not input order — callers that need the original item
/// back should fold it into `T`).
pub async fn run_bounded<I, F, Fut, T>(items: Vec<I>, capacity: usize, make_future: F) -> Vec<T>
where
    I: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(capacity.max(1)));
    let make_future = Arc::new(make_future);
    let mut set = JoinSet::new();

    for item in items {
        let permit = Arc::clone(&semaphore);
        let make_future = Arc::clone(&make_future);
        set.spawn(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore never closed");
            make_future(item).await
        });
    }

    let mut out = Vec::with_capacity(set.len());
    while let Some(res) = set.join_next().await {
        out.push(res.expect("worker pool task panicked"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn runs_every_item_exactly_once() {
        let inputs: Vec<u32> = (0..50).collect();
        let results = run_bounded(inputs, 4, |n| async move { n * 2 }).await;
        let mut results = results;
        results.sort_unstable();
        assert_eq!(results, (0..50).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn never_exceeds_capacity() {
        let inflight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let cap = 3;

        let inflight_c = Arc::clone(&inflight);
        let peak_c = Arc::clone(&peak);
        run_bounded((0..30).collect(), cap, move |_| {
            let inflight = Arc::clone(&inflight_c);
            let peak = Arc::clone(&peak_c);
            async move {
                let now = inflight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                inflight.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= cap, "peak concurrency exceeded capacity");
    }
}
