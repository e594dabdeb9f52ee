use thiserror::Error;

/// Failures surfaced to the embedder by the [`Coordinator`](crate::Coordinator).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// The serial execution context that media and inspector work is posted
    /// to has shut down. This does not happen while the coordinator's
    /// runtime is alive; treat it as fatal.
    #[error("serial context unavailable for page {0}")]
    ConcurrencyInvariantViolation(usize),

    /// The page id was never created, or was already destroyed.
    #[error("unknown page id {0}")]
    UnknownPage(usize),
}
