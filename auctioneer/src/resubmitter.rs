//! Routes failed auction outcomes back into the batch for another attempt,
//! or lets them through as terminal failures once retries are exhausted
//! (§4.5).

use crate::batch::Batch;
use crate::metrics::counters::Counters;
use crate::model::AuctionResults;

/// Splits `results`' failed starts/stops by `attempts <= max_retries`:
/// retryable entries are pushed back onto `batch` and dropped from the
/// returned results; exhausted entries pass through untouched. Successful
/// entries always pass through untouched.
pub fn resubmit_failed_auctions(batch: &mut Batch, mut results: AuctionResults, max_retries: u32, counters: &Counters) -> AuctionResults {
    let (retry_starts, terminal_starts): (Vec<_>, Vec<_>) =
        results.failed_starts.drain(..).partition(|s| s.attempts <= max_retries);
    let (retry_stops, terminal_stops): (Vec<_>, Vec<_>) =
        results.failed_stops.drain(..).partition(|s| s.attempts <= max_retries);

    if !retry_starts.is_empty() {
        counters
            .starts_resubmitted
            .fetch_add(retry_starts.len() as u64, std::sync::atomic::Ordering::Relaxed);
        batch.resubmit_start_auctions(retry_starts);
    }
    if !retry_stops.is_empty() {
        counters
            .stops_resubmitted
            .fetch_add(retry_stops.len() as u64, std::sync::atomic::Ordering::Relaxed);
        batch.resubmit_stop_auctions(retry_stops);
    }

    results.failed_starts = terminal_starts;
    results.failed_stops = terminal_stops;
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LrpStartRequest, LrpStopRequest};
    use std::time::Instant;

    fn start(process_guid: &str, attempts: u32) -> LrpStartRequest {
        let mut req = LrpStartRequest::new(process_guid, 1, "preloaded:stack", 10, 10, Instant::now());
        req.attempts = attempts;
        req
    }

    fn stop(process_guid: &str, attempts: u32) -> LrpStopRequest {
        let mut req = LrpStopRequest::new(process_guid, 2, Instant::now());
        req.attempts = attempts;
        req
    }

    #[test]
    fn successful_work_passes_through_untouched() {
        let (mut batch, _rx) = Batch::new(1);
        let counters = Counters::default();
        let results = AuctionResults {
            successful_starts: vec![start("pg-1", 1)],
            successful_stops: vec![stop("pg-1", 1)],
            ..Default::default()
        };

        let out = resubmit_failed_auctions(&mut batch, results.clone(), 3, &counters);
        assert_eq!(out.successful_starts.len(), results.successful_starts.len());
        assert_eq!(out.successful_stops.len(), results.successful_stops.len());
    }

    #[test]
    fn does_not_signal_batch_when_nothing_is_resubmitted() {
        let (mut batch, mut rx) = Batch::new(1);
        let counters = Counters::default();
        resubmit_failed_auctions(&mut batch, AuctionResults::default(), 3, &counters);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn resubmits_retryable_and_returns_exhausted_as_terminal() {
        let max_retries = 3;
        let (mut batch, _rx) = Batch::new(1);
        let counters = Counters::default();

        let retryable_start = start("pg-1", max_retries);
        let exhausted_start = start("pg-2", max_retries + 1);
        let retryable_stop = stop("pg-1", max_retries);
        let exhausted_stop = stop("pg-2", max_retries + 1);

        let results = AuctionResults {
            failed_starts: vec![retryable_start.clone(), exhausted_start.clone()],
            failed_stops: vec![retryable_stop.clone(), exhausted_stop.clone()],
            ..Default::default()
        };

        let out = resubmit_failed_auctions(&mut batch, results, max_retries, &counters);

        assert_eq!(out.failed_starts.len(), 1);
        assert_eq!(out.failed_starts[0].process_guid, "pg-2");
        assert_eq!(out.failed_stops.len(), 1);
        assert_eq!(out.failed_stops[0].process_guid, "pg-2");

        let (resubmitted_starts, resubmitted_stops) = batch.dedupe_and_drain();
        assert_eq!(resubmitted_starts.len(), 1);
        assert_eq!(resubmitted_starts[0].process_guid, "pg-1");
        assert_eq!(resubmitted_stops.len(), 1);
        assert_eq!(resubmitted_stops[0].process_guid, "pg-1");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::model::{LrpStartRequest, LrpStopRequest};
    use proptest::prelude::*;
    use std::time::Instant;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// A results value with empty Failed* lists is a fixed point of
        /// resubmission: applying it twice yields the same successful
        /// entries both times, and never signals the batch (§8 universal
        /// invariant: "Resubmitter is idempotent w.r.t. successful entries").
        #[test]
        fn resubmit_is_idempotent_on_purely_successful_results(
            succeeded_start_count in 0..5usize,
            succeeded_stop_count in 0..5usize,
            max_retries in 0..5u32,
        ) {
            let successful_starts: Vec<_> = (0..succeeded_start_count)
                .map(|i| LrpStartRequest::new(format!("pg-{i}"), i as u32, "preloaded:stack", 10, 10, Instant::now()))
                .collect();
            let successful_stops: Vec<_> = (0..succeeded_stop_count)
                .map(|i| LrpStopRequest::new(format!("pg-{i}"), i as u32, Instant::now()))
                .collect();

            let results = AuctionResults {
                successful_starts,
                successful_stops,
                failed_starts: Vec::new(),
                failed_stops: Vec::new(),
            };

            let (mut batch_one, mut rx_one) = Batch::new(1);
            let counters_one = Counters::default();
            let once = resubmit_failed_auctions(&mut batch_one, results.clone(), max_retries, &counters_one);
            prop_assert!(rx_one.try_recv().is_err(), "resubmit must not signal the batch with nothing to retry");

            let (mut batch_twice, mut rx_twice) = Batch::new(1);
            let counters_twice = Counters::default();
            let twice = resubmit_failed_auctions(&mut batch_twice, once.clone(), max_retries, &counters_twice);
            prop_assert!(rx_twice.try_recv().is_err());

            prop_assert_eq!(once.successful_starts.len(), twice.successful_starts.len());
            prop_assert_eq!(once.successful_stops.len(), twice.successful_stops.len());
            prop_assert!(once.failed_starts.is_empty() && twice.failed_starts.is_empty());
            prop_assert!(once.failed_stops.is_empty() && twice.failed_stops.is_empty());
        }
    }
}
