//! External collaborator interfaces (§6). The core never implements these
//! itself — it is handed concrete implementations (a real transport client,
//! or a test fake) behind `Arc<dyn Trait>`, the same way this codebase
//! abstracts its own swap executor and session repository.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::model::{AuctionResults, CellId, CellState, FailedWork, Work};

/// One cell's remote agent.
#[async_trait]
pub trait CellClient: Send + Sync {
    async fn state(&self) -> anyhow::Result<CellState>;
    async fn perform(&self, work: Work) -> anyhow::Result<FailedWork>;
}

/// Injected into the Runner: supplies the current fleet and receives every
/// completed batch. `distribute_batch` MAY block; it MUST be safe to call
/// from any task, since the Runner dispatches it on a separate task so the
/// main loop can resume immediately (§4.6 step 6).
#[async_trait]
pub trait AuctionDelegate: Send + Sync {
    async fn fetch_auction_rep_clients(&self) -> anyhow::Result<HashMap<CellId, std::sync::Arc<dyn CellClient>>>;

    async fn distributed_batch(&self, results: AuctionResults);
}
