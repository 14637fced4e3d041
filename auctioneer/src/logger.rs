use std::time::Duration;

use tracing::{Span, field};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

pub use common::logger::TraceId;

pub fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let base = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        // Includes timing when the span closes, so per-batch duration shows
        // up in logs without manual bookkeeping.
        .with_span_events(fmt::format::FmtSpan::CLOSE);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(base.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(base.pretty())
            .init();
    }
}

pub fn batch_span(trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "batch",
        trace_id = %trace_id.as_str(),
        batch_id = field::Empty,
        starts = field::Empty,
        stops = field::Empty,
    )
}

pub fn annotate_batch(batch_id: &str, starts: usize, stops: usize) {
    let span = Span::current();
    span.record("batch_id", field::display(batch_id));
    span.record("starts", starts);
    span.record("stops", stops);
}

/// Wraps a network-bound phase (state fetch, commit) and logs when it
/// exceeds `max`, the same slow-operation guard used elsewhere in this
/// codebase.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = std::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
