use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use trellis_traits::MediaContext;

use crate::mutator::DocumentMutator;
use crate::node::Node;
use crate::stylesheet::{StyleMap, StyleSheet};
use crate::traversal::TreeTraverser;
use crate::ChangeAction;

/// A page's UI tree plus its style-sheet registry.
///
/// Nodes are addressed by producer-assigned integer ids; parent/child links
/// are id references into the node table, so ownership stays acyclic while
/// lookups stay O(1). The document itself is synchronous: callers that share
/// one across workers synchronize at document granularity.
pub struct Document {
    /// Id of the page this document belongs to
    page_id: usize,

    /// The id-indexed node table
    pub(crate) nodes: FxHashMap<u64, Node>,
    /// Id of the root subtree's node, once the producer created it
    pub(crate) root_id: Option<u64>,

    /// Style-sheet registry: node-scoped and doc-level sheets by id
    pub(crate) sheets: FxHashMap<u64, StyleSheet>,
    /// Ids of doc-level sheets, in registration order. These apply to every
    /// node independent of per-node style-object assignment.
    pub(crate) doc_sheet_ids: Vec<u64>,

    /// Current external media state
    pub(crate) media: MediaContext,

    /// Inspector-set declarations layered over the cascade, per node and
    /// named rule
    pub(crate) inspector_overrides: FxHashMap<u64, BTreeMap<String, StyleMap>>,
}

impl Document {
    pub fn new(page_id: usize) -> Self {
        Self {
            page_id,
            nodes: FxHashMap::default(),
            root_id: None,
            sheets: FxHashMap::default(),
            doc_sheet_ids: Vec::new(),
            media: MediaContext::default(),
            inspector_overrides: FxHashMap::default(),
        }
    }

    pub fn page_id(&self) -> usize {
        self.page_id
    }

    pub fn media(&self) -> &MediaContext {
        &self.media
    }

    pub fn root_id(&self) -> Option<u64> {
        self.root_id
    }

    pub fn mutate<'doc>(&'doc mut self) -> DocumentMutator<'doc> {
        DocumentMutator::new(self)
    }

    pub fn get_node(&self, node_id: u64) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    pub fn get_node_mut(&mut self, node_id: u64) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    pub fn contains_node(&self, node_id: u64) -> bool {
        self.nodes.contains_key(&node_id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the node with the given id, creating and indexing it if
    /// absent. An explicit tag name always wins over a previously recorded
    /// one (the producer may describe a node before naming it).
    pub fn find_or_create_node(&mut self, node_id: u64, tag: Option<&str>) -> &mut Node {
        let node = self
            .nodes
            .entry(node_id)
            .or_insert_with(|| Node::new(node_id, ""));
        if let Some(tag) = tag {
            if node.tag != tag {
                node.tag = tag.to_string();
            }
        }
        node
    }

    /// Detaches the node from its parent and removes it and every
    /// descendant from the node table, from every sheet's owner set, and
    /// from any externally-bound handle. No dangling cross-reference
    /// survives.
    pub fn remove_node(&mut self, node_id: u64) -> Option<Node> {
        if let Some(parent_id) = self.nodes.get(&node_id).and_then(|node| node.parent) {
            if let Some(parent) = self.nodes.get_mut(&parent_id) {
                parent.children.retain(|id| *id != node_id);
            }
        }

        let doomed: Vec<u64> = TreeTraverser::new_with_root(self, node_id).collect();
        let mut removed = None;
        for id in doomed {
            let Some(mut node) = self.nodes.remove(&id) else {
                continue;
            };
            node.parent = None;
            if let Some(handle) = node.bound_handle.take() {
                handle.released(id);
            }
            if let Some(holder) = node.data_holder.take() {
                holder.released(id);
            }
            for sheet in self.sheets.values_mut() {
                sheet.owners.remove(&id);
            }
            self.inspector_overrides.remove(&id);
            if id == node_id {
                removed = Some(node);
            }
        }
        removed
    }

    /// Link `node_id` under `new_parent_id` at `index` (appended when out of
    /// range or absent), unlinking from any previous parent first. If the
    /// parent does not resolve the node is marked dirty instead of failing:
    /// unresolved structure is deferred, never fatal.
    pub fn reparent(&mut self, node_id: u64, new_parent_id: u64, index: Option<usize>) -> bool {
        if !self.nodes.contains_key(&node_id) {
            return false;
        }
        if !self.nodes.contains_key(&new_parent_id) {
            tracing::debug!(node_id, new_parent_id, "parent unresolved, deferring");
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.mark_dirty();
                node.pending_parent = Some(new_parent_id);
            }
            return false;
        }

        if let Some(old_parent_id) = self.nodes.get(&node_id).and_then(|node| node.parent) {
            if let Some(old_parent) = self.nodes.get_mut(&old_parent_id) {
                old_parent.children.retain(|id| *id != node_id);
            }
        }

        let parent = self.nodes.get_mut(&new_parent_id).unwrap();
        match index {
            Some(index) if index < parent.children.len() => {
                parent.children.insert(index, node_id)
            }
            _ => parent.children.push(node_id),
        }
        let node = self.nodes.get_mut(&node_id).unwrap();
        node.parent = Some(new_parent_id);
        node.pending_parent = None;
        true
    }

    pub fn get_sheet(&self, sheet_id: u64) -> Option<&StyleSheet> {
        self.sheets.get(&sheet_id)
    }

    /// Insert a node-scoped sheet into the registry. Re-registering under an
    /// existing id replaces the sheet; owners re-attach on their next
    /// cascade.
    pub fn register_style_sheet(&mut self, sheet_id: u64, sheet: StyleSheet) {
        self.sheets.insert(sheet_id, sheet);
    }

    /// Insert a doc-level sheet: registered like any sheet and additionally
    /// appended to the all-nodes list.
    pub fn register_doc_level_style_sheet(&mut self, sheet_id: u64, sheet: StyleSheet) {
        self.sheets.insert(sheet_id, sheet);
        if !self.doc_sheet_ids.contains(&sheet_id) {
            self.doc_sheet_ids.push(sheet_id);
        }
    }

    /// Remove a sheet from the registry by id. This is the only eviction
    /// path; a non-empty owner set does not block it.
    pub fn unregister_style_sheet(&mut self, sheet_id: u64) {
        self.sheets.remove(&sheet_id);
        self.doc_sheet_ids.retain(|id| *id != sheet_id);
    }

    /// Swap in a new media context and re-cascade every node owning a sheet
    /// whose applicability the change affects. Returns one restyle action
    /// per affected subtree root.
    pub fn update_media_context(&mut self, media: MediaContext) -> Vec<ChangeAction> {
        let old = self.media;
        self.media = media;

        let mut affected: Vec<u64> = self
            .sheets
            .values()
            .filter(|sheet| sheet.affected_by(&old, &media))
            .flat_map(|sheet| sheet.owners())
            .collect();
        affected.sort_unstable();
        affected.dedup();

        tracing::debug!(
            page_id = self.page_id,
            owners = affected.len(),
            "media context changed"
        );

        affected
            .into_iter()
            .filter_map(|node_id| self.restyle(node_id))
            .collect()
    }

    /// Layer an inspector-authored declaration block over the node's
    /// cascade under the given rule name, returning the resulting restyle
    /// action (or `None` for an unknown node).
    pub fn set_inspector_style(
        &mut self,
        node_id: u64,
        rule_name: &str,
        declarations: StyleMap,
    ) -> Option<ChangeAction> {
        if !self.nodes.contains_key(&node_id) {
            return None;
        }
        self.inspector_overrides
            .entry(node_id)
            .or_default()
            .insert(rule_name.to_string(), declarations);
        self.restyle(node_id)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use trellis_traits::NodeHandle;

    use super::*;

    #[test]
    fn test_find_or_create_updates_tag() {
        let mut doc = Document::new(0);
        doc.find_or_create_node(1, None);
        assert_eq!(doc.get_node(1).unwrap().tag, "");
        doc.find_or_create_node(1, Some("image"));
        assert_eq!(doc.get_node(1).unwrap().tag, "image");
        assert_eq!(doc.node_count(), 1);
    }

    #[test]
    fn test_reparent_missing_parent_marks_dirty() {
        let mut doc = Document::new(0);
        doc.find_or_create_node(2, Some("div"));
        assert!(!doc.reparent(2, 99, None));
        assert!(doc.get_node(2).unwrap().is_dirty());
        assert!(doc.get_node(2).unwrap().parent.is_none());
    }

    #[test]
    fn test_reparent_moves_between_parents() {
        let mut doc = Document::new(0);
        for id in [1, 2, 3] {
            doc.find_or_create_node(id, Some("div"));
        }
        assert!(doc.reparent(3, 1, None));
        assert!(doc.reparent(3, 2, Some(0)));
        assert!(doc.get_node(1).unwrap().children.is_empty());
        assert_eq!(doc.get_node(2).unwrap().children, [3]);
        assert_eq!(doc.get_node(3).unwrap().parent, Some(2));
    }

    /// remove(node 5) where node 5 has children [6, 7]: the node table and
    /// every owner set no longer reference 5, 6, or 7.
    #[test]
    fn test_remove_scrubs_subtree() {
        struct CountingHandle(AtomicUsize);
        impl NodeHandle for CountingHandle {
            fn released(&self, _node_id: u64) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut doc = Document::new(0);
        for (id, parent) in [(1, None), (5, Some(1)), (6, Some(5)), (7, Some(5))] {
            doc.find_or_create_node(id, Some("div"));
            if let Some(parent) = parent {
                doc.reparent(id, parent, None);
            }
        }

        let handle = Arc::new(CountingHandle(AtomicUsize::new(0)));
        doc.get_node_mut(6).unwrap().bound_handle = Some(handle.clone());

        let mut sheet = StyleSheet::parse(".a{color:red}");
        sheet.owners.extend([5u64, 6, 7]);
        doc.register_style_sheet(10, sheet);

        doc.remove_node(5);

        for id in [5, 6, 7] {
            assert!(!doc.contains_node(id));
            assert!(!doc.get_sheet(10).unwrap().owners.contains(&id));
        }
        assert_eq!(doc.get_node(1).unwrap().children.len(), 0);
        assert_eq!(handle.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_doc_level_registration_appends_once() {
        let mut doc = Document::new(0);
        doc.register_doc_level_style_sheet(1, StyleSheet::default());
        doc.register_doc_level_style_sheet(1, StyleSheet::default());
        assert_eq!(doc.doc_sheet_ids, [1]);
    }
}
