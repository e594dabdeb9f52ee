//! Cascade resolution: sheet lookup, rule matching and style merging.

use smallvec::SmallVec;

use crate::action::{ActionKind, ChangeAction, RuleRef};
use crate::stylesheet::{Selector, StyleMap};
use crate::traversal::AncestorTraverser;
use crate::Document;

impl Document {
    /// Resolve the node-scoped sheet applicable to a node by walking
    /// ancestors until one carries a non-zero `style_object_id`. The
    /// `use_parent_style` flag skips exactly the node's own slot and starts
    /// the walk at the parent.
    ///
    /// A failed walk (broken chain or an id absent from the registry) marks
    /// the node dirty and yields `None` without failing; doc-level matching
    /// still proceeds. A fully linked chain of zero slots is not a gap: the
    /// node simply has no node-scoped sheet.
    pub(crate) fn resolve_node_sheet(&mut self, node_id: u64) -> Option<u64> {
        let node = self.nodes.get(&node_id)?;
        let mut current = if node.use_parent_style() {
            node.parent
        } else {
            Some(node_id)
        };

        let mut gap = false;
        let mut last_visited = None;
        while let Some(id) = current {
            let Some(node) = self.nodes.get(&id) else {
                gap = true;
                break;
            };
            if node.style_object_id != 0 {
                let sheet_id = node.style_object_id;
                if self.sheets.contains_key(&sheet_id) {
                    return Some(sheet_id);
                }
                // Declared but not (yet) registered
                gap = true;
                break;
            }
            last_visited = Some(id);
            current = node.parent;
        }

        // An exhausted walk that never reached the root means the chain is
        // still unlinked somewhere above.
        if !gap && self.root_id.is_some() && last_visited != self.root_id {
            gap = true;
        }

        if gap {
            tracing::debug!(node_id, "node-scoped style sheet unresolved");
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.mark_dirty();
            }
        }
        None
    }

    /// Whether the selector matches the node, evaluating descendant
    /// combinators against the node's full ancestor chain.
    fn selector_matches(&self, node_id: u64, selector: &Selector) -> bool {
        let Some(node) = self.get_node(node_id) else {
            return false;
        };
        if !selector.subject().matches(node) {
            return false;
        }

        // Each remaining compound (right to left) must match some strictly
        // higher ancestor.
        let mut ancestors = AncestorTraverser::new(self, node_id);
        'compounds: for compound in selector.ancestor_compounds() {
            for ancestor_id in ancestors.by_ref() {
                if let Some(ancestor) = self.get_node(ancestor_id) {
                    if compound.matches(ancestor) {
                        continue 'compounds;
                    }
                }
            }
            return false;
        }
        true
    }

    /// Compute the matched-rule set for a node: every applicable doc-level
    /// sheet first (registration order), then the resolved node-scoped
    /// sheet, rules in source order within each. Consulted sheets record
    /// the node in their owner set for later media retargeting.
    pub(crate) fn match_rules(&mut self, node_id: u64) -> Vec<RuleRef> {
        let node_sheet = self
            .resolve_node_sheet(node_id)
            .filter(|id| !self.doc_sheet_ids.contains(id));

        let mut matched = Vec::new();
        let mut consulted: SmallVec<[u64; 4]> = SmallVec::new();

        if !self.nodes.contains_key(&node_id) {
            return matched;
        }

        let candidate_ids: SmallVec<[u64; 4]> = self
            .doc_sheet_ids
            .iter()
            .copied()
            .chain(node_sheet)
            .collect();

        for sheet_id in candidate_ids {
            let Some(sheet) = self.sheets.get(&sheet_id) else {
                continue;
            };
            consulted.push(sheet_id);
            if !sheet.applies(&self.media) {
                continue;
            }
            for (rule_index, rule) in sheet.rules.iter().enumerate() {
                if self.selector_matches(node_id, &rule.selector) {
                    matched.push(RuleRef {
                        sheet_id,
                        rule_index,
                    });
                }
            }
        }

        for sheet_id in consulted {
            if let Some(sheet) = self.sheets.get_mut(&sheet_id) {
                sheet.owners.insert(node_id);
            }
        }
        matched
    }

    /// Final style for a node: matched rules merged in match order, then
    /// the node's inline declarations (inline always wins on conflicting
    /// properties), then inspector overrides.
    pub fn resolve_style(&mut self, node_id: u64) -> (StyleMap, Vec<RuleRef>) {
        let matched = self.match_rules(node_id);

        let mut style = StyleMap::new();
        for rule_ref in &matched {
            let declarations = self
                .sheets
                .get(&rule_ref.sheet_id)
                .and_then(|sheet| sheet.rules.get(rule_ref.rule_index))
                .map(|rule| &rule.declarations);
            if let Some(declarations) = declarations {
                for (name, value) in declarations {
                    style.insert(name.clone(), value.clone());
                }
            }
        }

        if let Some(node) = self.nodes.get(&node_id) {
            for (name, value) in &node.inline_style {
                style.insert(name.clone(), value.clone());
            }
        }

        if let Some(overrides) = self.inspector_overrides.get(&node_id) {
            for declarations in overrides.values() {
                for (name, value) in declarations {
                    style.insert(name.clone(), value.clone());
                }
            }
        }

        (style, matched)
    }

    /// Recompute a node's style and recursively every descendant's:
    /// descendant-combinator rules anchored above may now match
    /// differently. Produces one nested action per visited node, mirroring
    /// tree shape.
    pub fn restyle(&mut self, node_id: u64) -> Option<ChangeAction> {
        if !self.nodes.contains_key(&node_id) {
            return None;
        }
        let (style, matched) = self.resolve_style(node_id);
        let mut action = ChangeAction::new(ActionKind::UpdateStyle, node_id);
        action.style = Some(style);
        action.matched = matched;

        let child_ids = self.nodes.get(&node_id).unwrap().children.clone();
        for child_id in child_ids {
            if let Some(child_action) = self.restyle(child_id) {
                action.children.push(child_action);
            }
        }
        Some(action)
    }
}

#[cfg(test)]
mod tests {
    use trellis_traits::{ColorScheme, MediaContext};

    use crate::stylesheet::{MediaCondition, StyleSheet};
    use crate::NodeFlags;

    use super::*;

    fn doc_with_tree(links: &[(u64, Option<u64>)]) -> Document {
        let mut doc = Document::new(0);
        for &(id, parent) in links {
            doc.find_or_create_node(id, Some("div"));
            if let Some(parent) = parent {
                doc.reparent(id, parent, None);
            }
        }
        doc
    }

    /// Batch scenario: root 1, child 2 with class "a", doc-level sheet
    /// `.a{color:red}` means node 2 resolves `color=red`.
    #[test]
    fn test_doc_level_sheet_applies() {
        let mut doc = doc_with_tree(&[(1, None), (2, Some(1))]);
        doc.get_node_mut(2).unwrap().set_classes("a");
        doc.register_doc_level_style_sheet(10, StyleSheet::parse(".a{color:red}"));

        let (style, matched) = doc.resolve_style(2);
        assert_eq!(style["color"], "red");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].sheet_id, 10);
        assert_eq!(matched[0].rule_index, 0);
    }

    #[test]
    fn test_inline_style_wins() {
        let mut doc = doc_with_tree(&[(1, None)]);
        let node = doc.get_node_mut(1).unwrap();
        node.set_classes("a");
        node.inline_style
            .insert("color".to_string(), "blue".to_string());
        doc.register_doc_level_style_sheet(10, StyleSheet::parse(".a{color:red;margin:4}"));

        let (style, _) = doc.resolve_style(1);
        assert_eq!(style["color"], "blue");
        assert_eq!(style["margin"], "4");
    }

    /// A node with `style_object_id=0` inherits the nearest non-zero
    /// ancestor's sheet; changing that ancestor's `style_object_id` and
    /// re-cascading updates the descendant without touching it directly.
    #[test]
    fn test_style_object_inheritance() {
        let mut doc = doc_with_tree(&[(1, None), (2, Some(1)), (3, Some(2))]);
        doc.get_node_mut(3).unwrap().set_classes("t");
        doc.get_node_mut(1).unwrap().style_object_id = 20;
        doc.register_style_sheet(20, StyleSheet::parse(".t{color:red}"));
        doc.register_style_sheet(21, StyleSheet::parse(".t{color:green}"));

        let (style, _) = doc.resolve_style(3);
        assert_eq!(style["color"], "red");

        doc.get_node_mut(1).unwrap().style_object_id = 21;
        let action = doc.restyle(1).unwrap();
        // node 1 -> node 2 -> node 3, mirroring tree shape
        let leaf = &action.children[0].children[0];
        assert_eq!(leaf.node_id, 3);
        assert_eq!(leaf.style.as_ref().unwrap()["color"], "green");
    }

    /// `use_parent_style` skips exactly the node's own slot.
    #[test]
    fn test_use_parent_style_single_skip() {
        let mut doc = doc_with_tree(&[(1, None), (2, Some(1))]);
        doc.get_node_mut(1).unwrap().style_object_id = 20;
        {
            let node = doc.get_node_mut(2).unwrap();
            node.style_object_id = 21;
            node.set_classes("t");
            node.flags.insert(NodeFlags::USE_PARENT_STYLE);
        }
        doc.register_style_sheet(20, StyleSheet::parse(".t{color:red}"));
        doc.register_style_sheet(21, StyleSheet::parse(".t{color:green}"));

        // Node 2's own slot (21) is skipped in favor of the parent's (20)
        let (style, _) = doc.resolve_style(2);
        assert_eq!(style["color"], "red");
    }

    #[test]
    fn test_descendant_combinator_uses_ancestor_chain() {
        let mut doc = doc_with_tree(&[(1, None), (2, Some(1)), (3, Some(2)), (4, None)]);
        doc.get_node_mut(1).unwrap().set_classes("list");
        doc.get_node_mut(3).unwrap().set_classes("item");
        doc.get_node_mut(4).unwrap().set_classes("item");
        doc.register_doc_level_style_sheet(10, StyleSheet::parse(".list .item{color:red}"));

        let (style, _) = doc.resolve_style(3);
        assert_eq!(style.get("color").map(String::as_str), Some("red"));

        // Node 4 has the subject class but no qualifying ancestor
        let (style, _) = doc.resolve_style(4);
        assert!(style.is_empty());
    }

    #[test]
    fn test_unresolved_sheet_marks_dirty_but_doc_level_matches() {
        let mut doc = doc_with_tree(&[(1, None), (2, Some(1))]);
        doc.get_node_mut(2).unwrap().set_classes("a");
        // style_object_id declared but never registered
        doc.get_node_mut(2).unwrap().style_object_id = 99;
        doc.register_doc_level_style_sheet(10, StyleSheet::parse(".a{color:red}"));

        let (style, _) = doc.resolve_style(2);
        assert_eq!(style["color"], "red");
        assert!(doc.get_node(2).unwrap().is_dirty());
    }

    /// Resolving cascade twice on an unchanged tree yields byte-identical
    /// style maps.
    #[test]
    fn test_resolution_is_idempotent() {
        let mut doc = doc_with_tree(&[(1, None), (2, Some(1))]);
        doc.get_node_mut(2).unwrap().set_classes("a b");
        doc.get_node_mut(2)
            .unwrap()
            .inline_style
            .insert("padding".to_string(), "2".to_string());
        doc.register_doc_level_style_sheet(10, StyleSheet::parse(".a{color:red}.b{margin:1}"));

        let first = doc.resolve_style(2);
        let second = doc.resolve_style(2);
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn test_media_gated_sheet_contributes_no_rules() {
        let narrow_only = MediaCondition {
            max_width: Some(500.0),
            ..Default::default()
        };
        let mut doc = doc_with_tree(&[(1, None)]);
        doc.get_node_mut(1).unwrap().set_classes("a");
        doc.register_doc_level_style_sheet(
            10,
            StyleSheet::parse(".a{color:red}").with_media(narrow_only),
        );

        doc.media = MediaContext::new(400.0, 800.0, 1.0, ColorScheme::Light);
        let (style, _) = doc.resolve_style(1);
        assert_eq!(style["color"], "red");

        let actions = doc.update_media_context(MediaContext::new(
            900.0,
            800.0,
            1.0,
            ColorScheme::Light,
        ));
        assert_eq!(actions.len(), 1);
        assert!(actions[0].style.as_ref().unwrap().is_empty());
    }

    #[test]
    fn test_inspector_override_is_strongest() {
        let mut doc = doc_with_tree(&[(1, None)]);
        doc.get_node_mut(1)
            .unwrap()
            .inline_style
            .insert("color".to_string(), "blue".to_string());

        let mut decls = StyleMap::new();
        decls.insert("color".to_string(), "magenta".to_string());
        let action = doc.set_inspector_style(1, "element.style", decls).unwrap();
        assert_eq!(action.style.as_ref().unwrap()["color"], "magenta");
    }
}
