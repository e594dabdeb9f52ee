//! Opportunistic repair of structurally incomplete nodes.
//!
//! A batch may reference a node whose parent is described later in the same
//! batch, or in an earlier still-unflushed batch. Before a batch's actions
//! are handed to the sink, every style-mutating action targeting a dirty
//! node is reprocessed against the now-committed tree state.

use crate::action::ChangeAction;
use crate::Document;

impl Document {
    /// Repair every style-mutating action in the slice (recursing into
    /// nested subtree actions) whose target node is dirty. Idempotent: a
    /// node whose parent remains unresolvable stays dirty for a future
    /// attempt.
    pub fn repair_dirty_actions(&mut self, actions: &mut [ChangeAction]) {
        for action in actions {
            self.repair_action(action);
        }
    }

    fn repair_action(&mut self, action: &mut ChangeAction) {
        if action.kind.is_style_mutating() && self.is_dirty(action.node_id) {
            self.try_repair_node(action);
        }
        self.repair_dirty_actions(&mut action.children);
    }

    fn is_dirty(&self, node_id: u64) -> bool {
        self.get_node(node_id).is_some_and(|node| node.is_dirty())
    }

    fn try_repair_node(&mut self, action: &mut ChangeAction) {
        let node_id = action.node_id;

        // Resolve the parent link from the action's declared parent id if
        // the node is still unlinked.
        let unlinked = self
            .get_node(node_id)
            .is_some_and(|node| node.parent.is_none())
            && self.root_id != Some(node_id);
        if unlinked {
            let declared = action
                .parent_id
                .or_else(|| self.get_node(node_id).and_then(|node| node.pending_parent));
            let Some(parent_id) = declared else {
                tracing::debug!(node_id, "dirty node has no declared parent, deferring");
                return;
            };
            if !self.reparent(node_id, parent_id, action.index) {
                // Still unresolvable, retry on a later batch
                return;
            }
        }

        // The link is in place: clear the deferral marker, then recompute
        // cascade against the repaired structure. Resolution re-marks the
        // node when its sheet walk still fails, keeping it dirty for a
        // future attempt.
        if let Some(node) = self.get_node_mut(node_id) {
            node.clear_dirty();
        }
        let (style, matched) = self.resolve_style(node_id);
        tracing::debug!(node_id, rules = matched.len(), "repaired dirty node");
        action.style = Some(style);
        action.matched = matched;
    }
}
