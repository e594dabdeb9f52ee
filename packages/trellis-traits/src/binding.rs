use std::sync::Arc;

pub type SharedNodeHandle = Arc<dyn NodeHandle>;
pub type SharedDataHolder = Arc<dyn DataHolder>;

/// An externally-bound native handle attached to a node (e.g. the widget
/// the presentation layer created for it).
///
/// The core never interprets the handle; its only obligation is to drop
/// the binding when the node is removed so the embedder can observe the
/// release.
pub trait NodeHandle: Send + Sync + 'static {
    /// Called when the owning node is removed from its document.
    fn released(&self, node_id: u64) {
        let _ = node_id;
    }
}

/// An external data binding attached to a node, opaque to the core and
/// cleared on node removal exactly like [`NodeHandle`].
pub trait DataHolder: Send + Sync + 'static {
    fn released(&self, node_id: u64) {
        let _ = node_id;
    }
}

pub struct DummyNodeHandle;
impl NodeHandle for DummyNodeHandle {}

pub struct DummyDataHolder;
impl DataHolder for DummyDataHolder {}
