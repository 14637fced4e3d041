use thiserror::Error;

/// The closed set of domain failures a cell can report during scoring or
/// reservation. Scoring errors are informational: a cell that returns one of
/// these simply abstains from the auction in question.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CellError {
    #[error("cell does not support rootfs {rootfs:?}")]
    CellMismatch { rootfs: String },

    #[error("cell has insufficient resources for the request")]
    InsufficientResources,
}

/// Runner-level conditions a caller might want to match on. Everything else
/// that can go wrong (a delegate call, a cell client call) is an opaque
/// `anyhow::Error` crossing a collaborator boundary this crate does not own.
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to fetch cell clients: {0}")]
    FetchClients(#[source] anyhow::Error),
}
