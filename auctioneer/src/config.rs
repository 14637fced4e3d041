use std::time::Duration;

/// Tunables for the auction runner, following this codebase's convention of
/// reading env vars with a documented, safe-by-default fallback rather than
/// failing to start when a knob is unset or malformed.
#[derive(Clone, Debug)]
pub struct AuctionConfig {
    /// An entry is resubmitted while `Attempts <= max_retries`; past that it
    /// is surfaced as a terminal failure instead of being re-queued.
    pub max_retries: u32,

    /// How long the Runner waits before retrying `FetchAuctionRepClients`
    /// after it fails.
    pub fetch_retry_delay: Duration,

    /// Upper bound on concurrent tasks submitted to the shared worker pool
    /// during state-fetch and commit fan-out.
    pub worker_pool_size: usize,

    /// Threshold above which a state-fetch or commit phase logs a
    /// slow-operation warning (see [`crate::logger::warn_if_slow`]).
    pub slow_phase_threshold: Duration,
}

/// Capacity of the Batch's wake channel. Fixed, not a tunable: anything other
/// than 1 would break the level-triggered "at most one pending wake" reading
/// documented on [`crate::batch::Batch`].
pub const BATCH_WAKE_CAPACITY: usize = 1;

impl AuctionConfig {
    pub fn from_env() -> Self {
        Self {
            max_retries: parse_env_or("AUCTIONEER_MAX_RETRIES", 2),
            fetch_retry_delay: Duration::from_secs(parse_env_or("AUCTIONEER_FETCH_RETRY_SECS", 1)),
            worker_pool_size: parse_env_or("AUCTIONEER_WORKER_POOL_SIZE", 32),
            slow_phase_threshold: Duration::from_millis(parse_env_or("AUCTIONEER_SLOW_PHASE_MS", 500)),
        }
    }
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
