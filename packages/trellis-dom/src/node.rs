use bitflags::bitflags;
use smallvec::SmallVec;
use trellis_traits::{SharedDataHolder, SharedNodeHandle};

use crate::stylesheet::StyleMap;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NodeFlags: u8 {
        /// The node's structure or style context could not be fully resolved
        /// at mutation time (missing parent or unregistered style object).
        /// Repaired opportunistically before a batch is flushed.
        const DIRTY = 0b0001;
        /// The node's style inputs changed; the next cascade must recurse
        /// into the whole subtree.
        const RESTYLING = 0b0010;
        /// Skip the node's own style-object slot and start the ancestor
        /// walk at the parent.
        const USE_PARENT_STYLE = 0b0100;
    }
}

/// A tag attribute, e.g. `value="3"` in `<input value="3" ...>`.
#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Debug)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// One node of a [`Document`](crate::Document) tree.
///
/// Ids are opaque integers assigned by the producer; parent/child links are
/// id references into the owning document's node table, never pointers.
pub struct Node {
    /// Producer-assigned id
    pub id: u64,
    /// Tag name, e.g. `div` or `text`
    pub tag: String,
    /// CSS classes (the `class` identity, split on whitespace)
    pub classes: SmallVec<[String; 4]>,
    /// CSS id (the `#id` identity), distinct from the node id
    pub css_id: Option<String>,
    /// Id of the node-scoped style object this subtree is rooted in.
    /// 0 means "inherit from the nearest qualifying ancestor".
    pub style_object_id: u64,
    pub flags: NodeFlags,

    /// Our parent's id
    pub parent: Option<u64>,
    /// Parent declared by the producer but not resolvable yet; consumed by
    /// dirty-node repair once the parent is indexed
    pub pending_parent: Option<u64>,
    /// What are our children?
    pub children: Vec<u64>,

    /// Inline style declarations. Ordered so that resolved styles are
    /// byte-stable across repeated resolution.
    pub inline_style: StyleMap,
    pub attrs: Vec<Attribute>,
    /// Names of events the producer registered on this node
    pub events: Vec<String>,

    /// Externally-bound native handle, cleared on removal
    pub bound_handle: Option<SharedNodeHandle>,
    /// External data binding, cleared on removal
    pub data_holder: Option<SharedDataHolder>,
}

// The bound handle and data holder are opaque trait objects, so Debug is
// written out by hand and elides them.
impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("classes", &self.classes)
            .field("css_id", &self.css_id)
            .field("style_object_id", &self.style_object_id)
            .field("flags", &self.flags)
            .field("parent", &self.parent)
            .field("pending_parent", &self.pending_parent)
            .field("children", &self.children)
            .field("inline_style", &self.inline_style)
            .field("attrs", &self.attrs)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

impl Node {
    pub fn new(id: u64, tag: impl Into<String>) -> Self {
        Self {
            id,
            tag: tag.into(),
            classes: SmallVec::new(),
            css_id: None,
            style_object_id: 0,
            flags: NodeFlags::empty(),
            parent: None,
            pending_parent: None,
            children: Vec::new(),
            inline_style: StyleMap::new(),
            attrs: Vec::new(),
            events: Vec::new(),
            bound_handle: None,
            data_holder: None,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.flags.contains(NodeFlags::DIRTY)
    }

    pub fn mark_dirty(&mut self) {
        self.flags.insert(NodeFlags::DIRTY);
    }

    pub fn clear_dirty(&mut self) {
        self.flags.remove(NodeFlags::DIRTY);
    }

    pub fn use_parent_style(&self) -> bool {
        self.flags.contains(NodeFlags::USE_PARENT_STYLE)
    }

    pub fn set_classes(&mut self, class_attr: &str) {
        self.classes = class_attr
            .split_ascii_whitespace()
            .map(str::to_string)
            .collect();
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        let attr = self.attrs.iter().find(|attr| attr.name == name)?;
        Some(&attr.value)
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attrs.iter_mut().find(|a| a.name == name) {
            Some(existing) => {
                existing.value.clear();
                existing.value.push_str(value);
            }
            None => self.attrs.push(Attribute {
                name: name.to_string(),
                value: value.to_string(),
            }),
        }
    }
}
