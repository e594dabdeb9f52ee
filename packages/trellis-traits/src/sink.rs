use std::sync::Arc;

pub type SharedSink<P> = Arc<dyn ActionSink<P>>;

/// A type that accepts decoded, style-resolved action packages on behalf
/// of the presentation layer.
///
/// The pipeline invokes `deliver` at most once per submitted batch, and
/// strictly in submission order for any given page.
pub trait ActionSink<P>: Send + Sync + 'static {
    fn deliver(&self, page_id: usize, package: P);
}

impl<P, F: Fn(usize, P) + Send + Sync + 'static> ActionSink<P> for F {
    fn deliver(&self, page_id: usize, package: P) {
        self(page_id, package)
    }
}

pub struct DummyActionSink;
impl<P> ActionSink<P> for DummyActionSink {
    fn deliver(&self, _page_id: usize, _package: P) {}
}
