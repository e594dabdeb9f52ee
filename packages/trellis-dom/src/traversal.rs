use crate::Document;

/// A pre-order tree traverser for a [`Document`].
#[derive(Clone)]
pub struct TreeTraverser<'a> {
    doc: &'a Document,
    stack: Vec<u64>,
}

impl<'a> TreeTraverser<'a> {
    /// Creates a new tree traverser which starts at the specified node.
    pub fn new_with_root(doc: &'a Document, root: u64) -> Self {
        let mut stack = Vec::with_capacity(32);
        stack.push(root);
        TreeTraverser { doc, stack }
    }
}

impl Iterator for TreeTraverser<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let node = self.doc.get_node(id)?;
        self.stack.extend(node.children.iter().rev());
        Some(id)
    }
}

/// An ancestor traverser for a [`Document`]. Yields parent ids walking
/// towards the root, starting from (and excluding) the given node.
#[derive(Clone)]
pub struct AncestorTraverser<'a> {
    doc: &'a Document,
    current: u64,
}

impl<'a> AncestorTraverser<'a> {
    pub fn new(doc: &'a Document, node_id: u64) -> Self {
        AncestorTraverser {
            doc,
            current: node_id,
        }
    }
}

impl Iterator for AncestorTraverser<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        let current_node = self.doc.get_node(self.current)?;
        self.current = current_node.parent?;
        Some(self.current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> Document {
        // 1 -> (2 -> 4, 3)
        let mut doc = Document::new(0);
        for (id, parent) in [(1, None), (2, Some(1)), (3, Some(1)), (4, Some(2))] {
            doc.find_or_create_node(id, Some("div"));
            if let Some(parent) = parent {
                doc.reparent(id, parent, None);
            }
        }
        doc
    }

    #[test]
    fn test_preorder_traversal() {
        let doc = small_tree();
        let order: Vec<u64> = TreeTraverser::new_with_root(&doc, 1).collect();
        assert_eq!(order, [1, 2, 4, 3]);
    }

    #[test]
    fn test_ancestor_traversal() {
        let doc = small_tree();
        let chain: Vec<u64> = AncestorTraverser::new(&doc, 4).collect();
        assert_eq!(chain, [2, 1]);
    }
}
