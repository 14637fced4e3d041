use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use auctioneer::clock::SystemClock;
use auctioneer::config::AuctionConfig;
use auctioneer::delegate::{AuctionDelegate, CellClient};
use auctioneer::logger::init_tracing;
use auctioneer::metrics::counters::Counters;
use auctioneer::model::{AuctionResults, CellId};
use auctioneer::runner::Runner;

/// Stands in for the real cell-directory lookup until a transport is wired
/// in; returns an always-empty fleet, so every batch fails with
/// `InsufficientResources` rather than silently placing work nowhere.
struct NoCellsDelegate;

#[async_trait]
impl AuctionDelegate for NoCellsDelegate {
    async fn fetch_auction_rep_clients(&self) -> anyhow::Result<HashMap<CellId, Arc<dyn CellClient>>> {
        // TODO: replace with the real cell-directory client once the
        // transport for CellClient::state/perform is chosen.
        Ok(HashMap::new())
    }

    async fn distributed_batch(&self, results: AuctionResults) {
        tracing::info!(
            successful_starts = results.successful_starts.len(),
            successful_stops = results.successful_stops.len(),
            failed_starts = results.failed_starts.len(),
            failed_stops = results.failed_stops.len(),
            "batch distributed"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("starting auctioneer...");

    let config = AuctionConfig::from_env();
    let delegate = Arc::new(NoCellsDelegate);
    let clock = Arc::new(SystemClock);

    let (runner, _handle) = Runner::new(delegate, clock, config, Counters::default());

    tracing::info!("auctioneer started; waiting for shutdown signal");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received");
    };

    runner.run(shutdown).await;

    Ok(())
}
