use trellis_dom::ActionPackage;
use trellis_traits::{MediaContext, SharedSink};

/// Options for configuring a [`Coordinator`](crate::Coordinator).
///
/// Every field is optional with a usable default.
#[derive(Default)]
pub struct PipelineConfig {
    /// Destination for flushed action packages. Defaults to a no-op sink.
    pub sink: Option<SharedSink<ActionPackage>>,
    /// Maximum number of batches decoding concurrently, across all pages.
    pub decode_workers: Option<usize>,
    /// Initial media context for newly created pages.
    pub media: Option<MediaContext>,
}
