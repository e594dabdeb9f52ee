//! Shared types and collaborator traits for the Trellis render-action pipeline.
//!
//! This crate defines the boundary between the three parties involved in
//! rendering: the *producer* (a scripting runtime emitting raw mutation
//! batches), the *core* ([trellis-dom](https://docs.rs/trellis-dom) +
//! [trellis-pipeline](https://docs.rs/trellis-pipeline)), and the
//! *presentation layer* which consumes style-resolved action packages.

mod batch;
pub use batch::{RawBatch, RawRecord, Value};

mod sink;
pub use sink::{ActionSink, DummyActionSink, SharedSink};

mod media;
pub use media::{ColorScheme, MediaContext};

mod binding;
pub use binding::{
    DataHolder, DummyDataHolder, DummyNodeHandle, NodeHandle, SharedDataHolder, SharedNodeHandle,
};
