use trellis_traits::Value;

use crate::stylesheet::StyleMap;

/// Reference to one matched rule: the owning sheet plus the rule's index
/// within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleRef {
    pub sheet_id: u64,
    pub rule_index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Mount a node (and, via nested children, its subtree)
    Add,
    Remove,
    Move,
    UpdateStyle,
    UpdateAttrs,
    AddEvent,
    RemoveEvent,
    // Tree-independent page chrome
    SetTitle,
    SetStatusBar,
    ScrollTo,
    Statistics,
    /// Batch-end marker, always the last action of a package
    Finish,
}

impl ActionKind {
    /// Whether this action carries a computed style payload that dirty-node
    /// repair may need to rewrite.
    pub fn is_style_mutating(self) -> bool {
        matches!(self, ActionKind::Add | ActionKind::UpdateStyle)
    }
}

/// One decoded, style-resolved tree mutation ready for the presentation
/// layer.
#[derive(Debug, Clone)]
pub struct ChangeAction {
    pub kind: ActionKind,
    /// Target node id (0 for tree-independent actions)
    pub node_id: u64,
    pub parent_id: Option<u64>,
    pub index: Option<usize>,
    /// Computed final style (matched rules merged with inline declarations)
    pub style: Option<StyleMap>,
    pub matched: Vec<RuleRef>,
    pub attrs: Option<StyleMap>,
    pub event: Option<String>,
    /// Payload for page-chrome actions (title text, scroll offsets, ...)
    pub payload: Option<Value>,
    /// Nested actions for subtree creation and restyle propagation,
    /// mirroring tree shape in source order
    pub children: Vec<ChangeAction>,
}

impl ChangeAction {
    pub fn new(kind: ActionKind, node_id: u64) -> Self {
        Self {
            kind,
            node_id,
            parent_id: None,
            index: None,
            style: None,
            matched: Vec::new(),
            attrs: None,
            event: None,
            payload: None,
            children: Vec::new(),
        }
    }

    pub fn chrome(kind: ActionKind, payload: Value) -> Self {
        let mut action = Self::new(kind, 0);
        action.payload = Some(payload);
        action
    }

    pub fn finish() -> Self {
        Self::new(ActionKind::Finish, 0)
    }
}

/// An ordered [`ChangeAction`] sequence for one page: the unit delivered to
/// the presentation-layer sink.
#[derive(Debug, Clone)]
pub struct ActionPackage {
    pub page_id: usize,
    pub actions: Vec<ChangeAction>,
}

impl ActionPackage {
    pub fn new(page_id: usize, actions: Vec<ChangeAction>) -> Self {
        Self { page_id, actions }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}
