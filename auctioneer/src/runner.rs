//! The long-lived driver loop (§4.6): wait for work, fetch the fleet, run a
//! scheduling pass, resubmit what can still be retried, and hand the batch's
//! outcome to the delegate without blocking the next iteration on it.

use std::sync::Arc;

use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;

use crate::batch::Batch;
use crate::clock::Clock;
use crate::config::AuctionConfig;
use crate::delegate::AuctionDelegate;
use crate::error::RunnerError;
use crate::logger;
use crate::metrics::counters::Counters;
use crate::model::{LrpStartRequest, LrpStopRequest};
use crate::resubmitter;
use crate::scheduler;
use crate::state_fetcher;

/// Thread-safe front door onto a running [`Runner`]'s batch. Cloning is
/// cheap; every clone shares the same underlying batch and wake channel.
#[derive(Clone)]
pub struct RunnerHandle {
    batch: Arc<Mutex<Batch>>,
}

impl RunnerHandle {
    pub fn add_lrp_start_auction(&self, req: LrpStartRequest) {
        self.batch.lock().add_lrp_start_auction(req);
    }

    pub fn add_lrp_stop_auction(&self, req: LrpStopRequest) {
        self.batch.lock().add_lrp_stop_auction(req);
    }
}

pub struct Runner {
    delegate: Arc<dyn AuctionDelegate>,
    batch: Arc<Mutex<Batch>>,
    wake_rx: mpsc::Receiver<()>,
    clock: Arc<dyn Clock>,
    config: AuctionConfig,
    counters: Counters,
    rng: StdRng,
}

enum IterationOutcome {
    Idle,
    RetryFetch,
    Processed,
}

impl Runner {
    pub fn new(
        delegate: Arc<dyn AuctionDelegate>,
        clock: Arc<dyn Clock>,
        config: AuctionConfig,
        counters: Counters,
    ) -> (Self, RunnerHandle) {
        let (batch, wake_rx) = Batch::new(crate::config::BATCH_WAKE_CAPACITY);
        let batch = Arc::new(Mutex::new(batch));
        let handle = RunnerHandle { batch: Arc::clone(&batch) };

        let seed = rand::random::<u64>();
        let runner = Self {
            delegate,
            batch,
            wake_rx,
            clock,
            config,
            counters,
            rng: StdRng::seed_from_u64(seed),
        };

        (runner, handle)
    }

    /// Runs until `shutdown` resolves. Each iteration waits for a wake
    /// signal, fetches the live fleet, drains the batch, runs one scheduling
    /// pass, resubmits retryable failures, and dispatches the batch's
    /// results to the delegate on a separate task so the loop can resume
    /// immediately.
    pub async fn run(mut self, shutdown: impl std::future::Future<Output = ()>) {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("runner shutting down");
                    return;
                }
                woken = self.wake_rx.recv() => {
                    if woken.is_none() {
                        tracing::warn!("wake channel closed, shutting down runner");
                        return;
                    }

                    // Keep retrying the fetch in place until it succeeds or
                    // shutdown fires. This never touches `self.wake_rx`: that
                    // channel is the batch's only wake signal, and callers on
                    // other tasks may already be `try_send`ing into it while
                    // we retry, so it must stay the live receiver throughout.
                    loop {
                        match self.run_one_iteration().await {
                            IterationOutcome::Idle | IterationOutcome::Processed => break,
                            IterationOutcome::RetryFetch => {
                                tokio::select! {
                                    _ = &mut shutdown => {
                                        tracing::info!("runner shutting down during fetch retry");
                                        return;
                                    }
                                    _ = tokio::time::sleep(self.config.fetch_retry_delay) => {}
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    async fn run_one_iteration(&mut self) -> IterationOutcome {
        let clients = match self.delegate.fetch_auction_rep_clients().await {
            Ok(clients) => clients,
            Err(err) => {
                let err = RunnerError::FetchClients(err);
                tracing::warn!(error = %err, "failed to fetch cell clients, will retry");
                return IterationOutcome::RetryFetch;
            }
        };

        let cells = state_fetcher::fetch_cells(
            clients,
            self.config.worker_pool_size,
            self.config.slow_phase_threshold,
            &self.counters,
        )
        .await;

        let (starts, stops) = self.batch.lock().dedupe_and_drain();
        if starts.is_empty() && stops.is_empty() {
            return IterationOutcome::Idle;
        }

        let trace_id = common::logger::TraceId::default();
        let span = logger::batch_span(&trace_id);
        let _entered = span.enter();
        logger::annotate_batch(trace_id.as_str(), starts.len(), stops.len());

        let results = scheduler::schedule(
            cells,
            starts,
            stops,
            self.config.worker_pool_size,
            self.config.slow_phase_threshold,
            self.clock.as_ref(),
            &mut self.rng,
            &self.counters,
        )
        .await;

        let results = {
            let mut batch = self.batch.lock();
            resubmitter::resubmit_failed_auctions(&mut batch, results, self.config.max_retries, &self.counters)
        };

        self.counters.batches_processed.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.counters
            .starts_succeeded
            .fetch_add(results.successful_starts.len() as u64, std::sync::atomic::Ordering::Relaxed);
        self.counters
            .starts_failed
            .fetch_add(results.failed_starts.len() as u64, std::sync::atomic::Ordering::Relaxed);
        self.counters
            .stops_succeeded
            .fetch_add(results.successful_stops.len() as u64, std::sync::atomic::Ordering::Relaxed);
        self.counters
            .stops_failed
            .fetch_add(results.failed_stops.len() as u64, std::sync::atomic::Ordering::Relaxed);

        let delegate = Arc::clone(&self.delegate);
        tokio::spawn(async move {
            delegate.distributed_batch(results).await;
        });

        IterationOutcome::Processed
    }
}
