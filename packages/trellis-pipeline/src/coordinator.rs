//! The batch coordinator: bounded decode concurrency, strict per-page
//! delivery order.
//!
//! Each submitted batch is chained to its predecessor through a oneshot
//! completion signal. Decoding and application run on the pool in whatever
//! order permits free up; the only blocking wait is on the predecessor's
//! signal, taken with no lock held, so a slow batch delays delivery but
//! never decoding. A batch signals completion unconditionally (on drop),
//! so rejected and empty batches still unblock their successors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashMap;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot, Semaphore};
use trellis_dom::{ActionPackage, Document, MutationRecord, StyleMap};
use trellis_traits::{DummyActionSink, MediaContext, RawBatch, SharedSink};

use crate::config::PipelineConfig;
use crate::error::PipelineError;

const DEFAULT_DECODE_WORKERS: usize = 4;

/// Entry point of the pipeline. Owns one [`Document`] per page and a
/// bounded pool of decode workers; guarantees the sink sees each page's
/// packages in submission order.
///
/// Construct from within a tokio runtime: workers are spawned on the
/// current handle.
pub struct Coordinator {
    rt: Handle,
    inner: Arc<Inner>,
    serial_tx: mpsc::UnboundedSender<SerialTask>,
}

struct Inner {
    sink: SharedSink<ActionPackage>,
    pages: Mutex<FxHashMap<usize, PageEntry>>,
    decode_pool: Arc<Semaphore>,
    default_media: MediaContext,

    #[cfg(test)]
    decode_delays: Mutex<std::collections::VecDeque<std::time::Duration>>,
}

struct PageEntry {
    doc: Arc<Mutex<Document>>,
    /// Cleared on teardown; in-flight workers check it before delivering
    alive: Arc<AtomicBool>,
    /// Completion signal of the page's most recently submitted batch
    prev_flush: oneshot::Receiver<()>,
}

impl PageEntry {
    fn new(doc: Document) -> Self {
        // The first batch has no predecessor: pre-signal its receiver
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        Self {
            doc: Arc::new(Mutex::new(doc)),
            alive: Arc::new(AtomicBool::new(true)),
            prev_flush: rx,
        }
    }
}

/// Signals batch completion when dropped, so every exit path of a worker
/// unblocks the successor batch.
struct FlushSignal(Option<oneshot::Sender<()>>);

impl Drop for FlushSignal {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Work arriving outside the batch path (window resizes, theme flips,
/// inspector edits), funneled through one serial context.
enum SerialTask {
    UpdateMedia {
        page_id: usize,
        media: MediaContext,
    },
    InspectorStyle {
        page_id: usize,
        node_id: u64,
        rule_name: String,
        declarations: StyleMap,
    },
}

impl SerialTask {
    fn page_id(&self) -> usize {
        match self {
            SerialTask::UpdateMedia { page_id, .. } => *page_id,
            SerialTask::InspectorStyle { page_id, .. } => *page_id,
        }
    }
}

impl Coordinator {
    pub fn new(config: PipelineConfig) -> Self {
        let workers = config
            .decode_workers
            .unwrap_or(DEFAULT_DECODE_WORKERS)
            .max(1);
        let inner = Arc::new(Inner {
            sink: config.sink.unwrap_or_else(|| Arc::new(DummyActionSink)),
            pages: Mutex::new(FxHashMap::default()),
            decode_pool: Arc::new(Semaphore::new(workers)),
            default_media: config.media.unwrap_or_default(),
            #[cfg(test)]
            decode_delays: Mutex::new(std::collections::VecDeque::new()),
        });

        let rt = Handle::current();
        let (serial_tx, serial_rx) = mpsc::unbounded_channel();
        rt.spawn(Inner::run_serial(inner.clone(), serial_rx));

        Self {
            rt,
            inner,
            serial_tx,
        }
    }

    /// Create the page's document if it does not exist yet. Every other
    /// operation also creates documents on first use; this exists for
    /// embedders that want the document ahead of the first batch.
    pub fn get_or_create_document(&self, page_id: usize) {
        let mut pages = self.inner.pages.lock().unwrap();
        self.inner.entry(&mut pages, page_id);
    }

    /// Tear a page down. In-flight batches for it run to completion (they
    /// still signal their successors) but their packages are discarded.
    pub fn destroy_document(&self, page_id: usize) -> Result<(), PipelineError> {
        let mut pages = self.inner.pages.lock().unwrap();
        let entry = pages
            .remove(&page_id)
            .ok_or(PipelineError::UnknownPage(page_id))?;
        entry.alive.store(false, Ordering::SeqCst);
        tracing::debug!(page_id, "document destroyed");
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.inner.pages.lock().unwrap().len()
    }

    /// Run `f` against a page's document, e.g. for devtools inspection.
    pub fn with_document<R>(
        &self,
        page_id: usize,
        f: impl FnOnce(&Document) -> R,
    ) -> Result<R, PipelineError> {
        let doc = {
            let pages = self.inner.pages.lock().unwrap();
            let entry = pages
                .get(&page_id)
                .ok_or(PipelineError::UnknownPage(page_id))?;
            entry.doc.clone()
        };
        let doc = doc.lock().unwrap();
        Ok(f(&doc))
    }

    /// Queue a raw batch for the page. Returns as soon as the batch is
    /// scheduled; decoding, application, repair and delivery happen on the
    /// worker pool, and a decode failure rejects the batch with an error
    /// event rather than surfacing here.
    pub fn submit_batch(&self, page_id: usize, batch: RawBatch) {
        let (doc, alive, prev_flush, flush) = {
            let mut pages = self.inner.pages.lock().unwrap();
            let entry = self.inner.entry(&mut pages, page_id);
            let (tx, rx) = oneshot::channel();
            let prev_flush = std::mem::replace(&mut entry.prev_flush, rx);
            (
                entry.doc.clone(),
                entry.alive.clone(),
                prev_flush,
                FlushSignal(Some(tx)),
            )
        };

        #[cfg(test)]
        let delay = self.inner.decode_delays.lock().unwrap().pop_front();

        let inner = self.inner.clone();
        self.rt.spawn(async move {
            // Dropped on every exit path, signalling the successor
            let _flush = flush;

            let Ok(permit) = inner.decode_pool.clone().acquire_owned().await else {
                return;
            };

            #[cfg(test)]
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let records = match MutationRecord::decode_batch(&batch) {
                Ok(records) => records,
                Err(err) => {
                    tracing::error!(page_id, %err, "rejecting batch");
                    let _ = prev_flush.await;
                    return;
                }
            };

            // Record-at-a-time application: later records in this batch
            // observe the tree state earlier ones produced, while other
            // batches interleave at record granularity.
            let mut actions = Vec::with_capacity(records.len());
            for record in &records {
                let mut doc = doc.lock().unwrap();
                if let Some(action) = doc.mutate().apply(record) {
                    actions.push(action);
                }
            }
            drop(permit);

            // The one blocking wait: the predecessor's completion. No lock
            // is held across it.
            let _ = prev_flush.await;

            if actions.is_empty() {
                return;
            }

            {
                let mut doc = doc.lock().unwrap();
                doc.repair_dirty_actions(&mut actions);
            }

            if alive.load(Ordering::SeqCst) {
                tracing::debug!(page_id, actions = actions.len(), "flushing package");
                inner.sink.deliver(page_id, ActionPackage::new(page_id, actions));
            }
        });
    }

    /// Post a media-context change for the page. The resulting restyle
    /// package (if any node is affected) is delivered from the serial
    /// context, without a batch-end marker.
    pub fn update_media_context(
        &self,
        page_id: usize,
        media: MediaContext,
    ) -> Result<(), PipelineError> {
        {
            let mut pages = self.inner.pages.lock().unwrap();
            self.inner.entry(&mut pages, page_id);
        }
        self.serial_tx
            .send(SerialTask::UpdateMedia { page_id, media })
            .map_err(|_| PipelineError::ConcurrencyInvariantViolation(page_id))
    }

    /// Post an inspector-authored declaration block for a node. Delivered
    /// like a media change: a synthesized package from the serial context.
    pub fn set_inspector_style(
        &self,
        page_id: usize,
        node_id: u64,
        rule_name: impl Into<String>,
        declarations: StyleMap,
    ) -> Result<(), PipelineError> {
        {
            let mut pages = self.inner.pages.lock().unwrap();
            self.inner.entry(&mut pages, page_id);
        }
        self.serial_tx
            .send(SerialTask::InspectorStyle {
                page_id,
                node_id,
                rule_name: rule_name.into(),
                declarations,
            })
            .map_err(|_| PipelineError::ConcurrencyInvariantViolation(page_id))
    }
}

impl Inner {
    fn entry<'p>(
        &self,
        pages: &'p mut FxHashMap<usize, PageEntry>,
        page_id: usize,
    ) -> &'p mut PageEntry {
        pages.entry(page_id).or_insert_with(|| {
            tracing::debug!(page_id, "document created");
            let mut doc = Document::new(page_id);
            let _ = doc.update_media_context(self.default_media);
            PageEntry::new(doc)
        })
    }

    async fn run_serial(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<SerialTask>) {
        while let Some(task) = rx.recv().await {
            let page_id = task.page_id();
            let (doc, alive) = {
                let pages = inner.pages.lock().unwrap();
                let Some(entry) = pages.get(&page_id) else {
                    tracing::debug!(page_id, "dropping task for destroyed page");
                    continue;
                };
                (entry.doc.clone(), entry.alive.clone())
            };

            let actions = {
                let mut doc = doc.lock().unwrap();
                match task {
                    SerialTask::UpdateMedia { media, .. } => doc.update_media_context(media),
                    SerialTask::InspectorStyle {
                        node_id,
                        rule_name,
                        declarations,
                        ..
                    } => doc
                        .set_inspector_style(node_id, &rule_name, declarations)
                        .into_iter()
                        .collect(),
                }
            };

            if !actions.is_empty() && alive.load(Ordering::SeqCst) {
                inner.sink.deliver(page_id, ActionPackage::new(page_id, actions));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use trellis_dom::ActionKind;
    use trellis_traits::{ActionSink, ColorScheme, RawRecord};

    use super::*;

    #[derive(Default)]
    struct TestSink {
        packages: Mutex<Vec<ActionPackage>>,
    }

    impl ActionSink<ActionPackage> for TestSink {
        fn deliver(&self, _page_id: usize, package: ActionPackage) {
            self.packages.lock().unwrap().push(package);
        }
    }

    impl TestSink {
        async fn wait_for(&self, count: usize) -> Vec<ActionPackage> {
            for _ in 0..200 {
                {
                    let packages = self.packages.lock().unwrap();
                    if packages.len() >= count {
                        return packages.clone();
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("sink never received {count} package(s)");
        }
    }

    fn pipeline(sink: Arc<TestSink>) -> Coordinator {
        Coordinator::new(PipelineConfig {
            sink: Some(sink),
            ..Default::default()
        })
    }

    fn title_batch(title: &str) -> RawBatch {
        RawBatch::new(vec![
            RawRecord::new("page", "set_title", vec![json!(title)]),
            RawRecord::new("dom", "finish", vec![]),
        ])
    }

    fn titles(packages: &[ActionPackage]) -> Vec<String> {
        packages
            .iter()
            .flat_map(|package| &package.actions)
            .filter(|action| action.kind == ActionKind::SetTitle)
            .map(|action| action.payload.as_ref().unwrap().as_str().unwrap().to_string())
            .collect()
    }

    /// A slow first batch must not be overtaken by a fast second one.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_delivery_order_survives_slow_decode() {
        let sink = Arc::new(TestSink::default());
        let pipe = pipeline(sink.clone());

        pipe.inner
            .decode_delays
            .lock()
            .unwrap()
            .extend([Duration::from_millis(100), Duration::from_millis(0)]);

        pipe.submit_batch(1, title_batch("one"));
        pipe.submit_batch(1, title_batch("two"));

        let packages = sink.wait_for(2).await;
        assert_eq!(titles(&packages), ["one", "two"]);
        assert_eq!(packages[0].actions.last().unwrap().kind, ActionKind::Finish);
    }

    /// A batch that decodes to nothing delivers nothing but still signals,
    /// so its successor flushes.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_batch_does_not_stall_successor() {
        let sink = Arc::new(TestSink::default());
        let pipe = pipeline(sink.clone());

        pipe.submit_batch(1, RawBatch::new(vec![]));
        pipe.submit_batch(1, title_batch("after"));

        let packages = sink.wait_for(1).await;
        assert_eq!(titles(&packages), ["after"]);
        assert_eq!(sink.packages.lock().unwrap().len(), 1);
    }

    /// An unrecognized record kind rejects its whole batch; the successor
    /// still flushes.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_rejected_batch_unblocks_successor() {
        let sink = Arc::new(TestSink::default());
        let pipe = pipeline(sink.clone());

        pipe.submit_batch(
            1,
            RawBatch::new(vec![RawRecord::new("dom", "frobnicate", vec![])]),
        );
        pipe.submit_batch(1, title_batch("after"));

        let packages = sink.wait_for(1).await;
        assert_eq!(titles(&packages), ["after"]);
        assert_eq!(sink.packages.lock().unwrap().len(), 1);
    }

    /// Destroying a page while a batch is in flight discards its package.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_teardown_suppresses_delivery() {
        let sink = Arc::new(TestSink::default());
        let pipe = pipeline(sink.clone());

        pipe.inner
            .decode_delays
            .lock()
            .unwrap()
            .push_back(Duration::from_millis(50));

        pipe.submit_batch(1, title_batch("late"));
        pipe.destroy_document(1).unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(sink.packages.lock().unwrap().is_empty());
        assert_eq!(pipe.page_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_document_created_on_first_action() {
        let sink = Arc::new(TestSink::default());
        let pipe = pipeline(sink.clone());
        assert_eq!(pipe.page_count(), 0);

        pipe.submit_batch(3, title_batch("hello"));
        sink.wait_for(1).await;
        assert_eq!(pipe.page_count(), 1);

        // Explicit creation is idempotent
        pipe.get_or_create_document(3);
        assert_eq!(pipe.page_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_page_operations_are_rejected() {
        let pipe = pipeline(Arc::new(TestSink::default()));
        assert_eq!(pipe.destroy_document(7), Err(PipelineError::UnknownPage(7)));
        assert_eq!(
            pipe.with_document(7, |doc| doc.node_count()),
            Err(PipelineError::UnknownPage(7))
        );
    }

    /// A node whose parent arrives in a later batch is linked and
    /// re-resolved before that later batch's package flushes.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_dirty_node_repaired_across_batches() {
        let sink = Arc::new(TestSink::default());
        let pipe = pipeline(sink.clone());

        // Node 2 is attached under node 5 before node 5 exists
        pipe.submit_batch(
            1,
            RawBatch::new(vec![
                RawRecord::new("dom", "create_root", vec![json!({"id": 1})]),
                RawRecord::new(
                    "dom",
                    "add_subtree",
                    vec![json!(5), json!({"id": 2, "style": {"margin": "4"}})],
                ),
                RawRecord::new("dom", "finish", vec![]),
            ]),
        );
        sink.wait_for(1).await;
        pipe.with_document(1, |doc| {
            assert!(doc.get_node(2).unwrap().is_dirty());
            assert!(doc.get_node(2).unwrap().parent.is_none());
        })
        .unwrap();

        // The parent materializes, and a style touch on node 2 carries the
        // repaired result out
        pipe.submit_batch(
            1,
            RawBatch::new(vec![
                RawRecord::new("dom", "add_subtree", vec![json!(1), json!({"id": 5})]),
                RawRecord::new(
                    "dom",
                    "update_inline_style",
                    vec![json!(2), json!({"color": "black"})],
                ),
                RawRecord::new("dom", "finish", vec![]),
            ]),
        );

        let packages = sink.wait_for(2).await;
        let repaired = packages[1]
            .actions
            .iter()
            .find(|action| action.kind == ActionKind::UpdateStyle && action.node_id == 2)
            .unwrap();
        let style = repaired.style.as_ref().unwrap();
        assert_eq!(style["margin"], "4");
        assert_eq!(style["color"], "black");

        pipe.with_document(1, |doc| {
            assert_eq!(doc.get_node(2).unwrap().parent, Some(5));
            assert!(!doc.get_node(2).unwrap().is_dirty());
        })
        .unwrap();
    }

    /// A media change re-cascades owners of affected sheets and delivers a
    /// synthesized package without a batch-end marker.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_media_update_delivers_restyle_package() {
        let sink = Arc::new(TestSink::default());
        let pipe = Coordinator::new(PipelineConfig {
            sink: Some(sink.clone()),
            media: Some(MediaContext::new(400.0, 800.0, 1.0, ColorScheme::Light)),
            ..Default::default()
        });

        pipe.submit_batch(
            1,
            RawBatch::new(vec![
                RawRecord::new(
                    "dom",
                    "register_style_object",
                    vec![
                        json!(10),
                        json!({
                            "rules": [{"selector": ".a", "declarations": {"color": "red"}}],
                            "media": {"max-width": 500.0},
                        }),
                        json!(true),
                    ],
                ),
                RawRecord::new("dom", "create_root", vec![json!({"id": 1, "class": "a"})]),
                RawRecord::new("dom", "finish", vec![]),
            ]),
        );
        let packages = sink.wait_for(1).await;
        let add = &packages[0].actions[0];
        assert_eq!(add.kind, ActionKind::Add);
        assert_eq!(add.style.as_ref().unwrap()["color"], "red");

        // Widening past the sheet's max-width drops its rules
        pipe.update_media_context(1, MediaContext::new(900.0, 800.0, 1.0, ColorScheme::Light))
            .unwrap();

        let packages = sink.wait_for(2).await;
        assert_eq!(packages[1].actions.len(), 1);
        let restyle = &packages[1].actions[0];
        assert_eq!(restyle.kind, ActionKind::UpdateStyle);
        assert_eq!(restyle.node_id, 1);
        assert!(restyle.style.as_ref().unwrap().is_empty());
    }

    /// Inspector edits layer over the cascade and flush as their own
    /// package.
    #[tokio::test(flavor = "multi_thread")]
    async fn test_inspector_style_delivers_package() {
        let sink = Arc::new(TestSink::default());
        let pipe = pipeline(sink.clone());

        pipe.submit_batch(
            1,
            RawBatch::new(vec![
                RawRecord::new("dom", "create_root", vec![json!({"id": 1})]),
                RawRecord::new("dom", "finish", vec![]),
            ]),
        );
        sink.wait_for(1).await;

        let mut declarations = StyleMap::new();
        declarations.insert("color".to_string(), "blue".to_string());
        pipe.set_inspector_style(1, 1, "element.style", declarations)
            .unwrap();

        let packages = sink.wait_for(2).await;
        assert_eq!(packages[1].actions.len(), 1);
        let action = &packages[1].actions[0];
        assert_eq!(action.kind, ActionKind::UpdateStyle);
        assert_eq!(action.style.as_ref().unwrap()["color"], "blue");
    }
}
