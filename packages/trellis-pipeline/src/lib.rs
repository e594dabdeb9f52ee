//! Batch scheduling and ordered delivery for Trellis.
//!
//! The [`Coordinator`] accepts raw mutation batches per page, decodes and
//! applies them on a bounded worker pool against the page's
//! [`Document`](trellis_dom::Document), and delivers the resulting
//! [`ActionPackage`](trellis_dom::ActionPackage)s to the embedder's sink
//! strictly in per-page submission order, whatever order decoding finishes
//! in.

mod config;
pub use config::PipelineConfig;

mod coordinator;
pub use coordinator::Coordinator;

mod error;
pub use error::PipelineError;
