//! Decoding of raw mutation records and their synchronous application
//! against a [`Document`].
//!
//! Raw records are decoded once at the boundary into [`MutationRecord`]
//! (an unrecognized kind rejects the whole batch, a malformed field skips
//! only that record). Application happens record by record so later records
//! in the same batch observe up-to-date tree state.

use trellis_traits::{RawBatch, RawRecord, Value};

use crate::action::{ActionKind, ChangeAction};
use crate::error::{DecodeError, FieldError, RecordError};
use crate::node::NodeFlags;
use crate::stylesheet::{value_to_style_string, StyleMap, StyleSheet};
use crate::Document;

/// A parsed subtree descriptor: one node plus nested child descriptors.
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    pub id: u64,
    pub tag: String,
    pub classes: Option<String>,
    pub css_id: Option<String>,
    pub style_object_id: u64,
    pub use_parent_style: bool,
    pub style: StyleMap,
    pub attrs: Vec<(String, String)>,
    pub events: Vec<String>,
    pub children: Vec<NodeDescriptor>,
}

impl NodeDescriptor {
    fn from_value(value: &Value, kind: &'static str) -> Result<Self, FieldError> {
        let obj = value
            .as_object()
            .ok_or(FieldError::new(kind, "node", "object descriptor"))?;
        let id = obj
            .get("id")
            .and_then(Value::as_u64)
            .ok_or(FieldError::new(kind, "node.id", "integer id"))?;
        let tag = obj
            .get("tag")
            .and_then(Value::as_str)
            .unwrap_or("view")
            .to_string();

        let mut style = StyleMap::new();
        if let Some(decls) = obj.get("style").and_then(Value::as_object) {
            for (name, value) in decls {
                if let Some(value) = value_to_style_string(value) {
                    style.insert(name.clone(), value);
                }
            }
        }

        let mut attrs = Vec::new();
        if let Some(map) = obj.get("attrs").and_then(Value::as_object) {
            for (name, value) in map {
                if let Some(value) = value_to_style_string(value) {
                    attrs.push((name.clone(), value));
                }
            }
        }

        let mut events = Vec::new();
        if let Some(list) = obj.get("events").and_then(Value::as_array) {
            for event in list {
                if let Some(event) = event.as_str() {
                    events.push(event.to_string());
                }
            }
        }

        let mut children = Vec::new();
        if let Some(list) = obj.get("children").and_then(Value::as_array) {
            for child in list {
                children.push(NodeDescriptor::from_value(child, kind)?);
            }
        }

        Ok(NodeDescriptor {
            id,
            tag,
            classes: obj.get("class").and_then(Value::as_str).map(str::to_string),
            css_id: obj
                .get("css_id")
                .and_then(Value::as_str)
                .map(str::to_string),
            style_object_id: obj
                .get("style_object_id")
                .and_then(Value::as_u64)
                .unwrap_or(0),
            use_parent_style: obj
                .get("use_parent_style")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            style,
            attrs,
            events,
            children,
        })
    }
}

/// One mutation, decoded from its raw envelope and matched exhaustively
/// by [`DocumentMutator::apply`].
#[derive(Debug, Clone)]
pub enum MutationRecord {
    CreateRoot {
        root: NodeDescriptor,
    },
    AddSubtree {
        parent_id: u64,
        index: Option<usize>,
        root: NodeDescriptor,
    },
    Remove {
        node_id: u64,
    },
    Move {
        node_id: u64,
        parent_id: u64,
        index: Option<usize>,
    },
    UpdateInlineStyle {
        node_id: u64,
        declarations: StyleMap,
    },
    UpdateStyleIdentity {
        node_id: u64,
        classes: Option<String>,
        css_id: Option<String>,
        style_object_id: Option<u64>,
        restyle: bool,
    },
    UpdateAttributes {
        node_id: u64,
        attrs: Vec<(String, String)>,
    },
    AddEvent {
        node_id: u64,
        event: String,
    },
    RemoveEvent {
        node_id: u64,
        event: String,
    },
    RegisterStyleObject {
        sheet_id: u64,
        sheet: StyleSheet,
        doc_level: bool,
    },
    /// Batch-end marker
    Finish,
    SetTitle {
        payload: Value,
    },
    SetStatusBar {
        payload: Value,
    },
    ScrollTo {
        payload: Value,
    },
    Statistics {
        payload: Value,
    },
}

fn arg<'v>(
    args: &'v [Value],
    index: usize,
    kind: &'static str,
    field: &'static str,
) -> Result<&'v Value, FieldError> {
    args.get(index)
        .ok_or(FieldError::new(kind, field, "argument present"))
}

fn u64_arg(
    args: &[Value],
    index: usize,
    kind: &'static str,
    field: &'static str,
) -> Result<u64, FieldError> {
    arg(args, index, kind, field)?
        .as_u64()
        .ok_or(FieldError::new(kind, field, "unsigned integer"))
}

fn str_arg<'v>(
    args: &'v [Value],
    index: usize,
    kind: &'static str,
    field: &'static str,
) -> Result<&'v str, FieldError> {
    arg(args, index, kind, field)?
        .as_str()
        .ok_or(FieldError::new(kind, field, "string"))
}

fn index_arg(args: &[Value], index: usize) -> Option<usize> {
    args.get(index).and_then(Value::as_u64).map(|v| v as usize)
}

fn style_map_arg(
    args: &[Value],
    index: usize,
    kind: &'static str,
    field: &'static str,
) -> Result<StyleMap, FieldError> {
    let obj = arg(args, index, kind, field)?
        .as_object()
        .ok_or(FieldError::new(kind, field, "object of declarations"))?;
    let mut map = StyleMap::new();
    for (name, value) in obj {
        if let Some(value) = value_to_style_string(value) {
            map.insert(name.clone(), value);
        }
    }
    Ok(map)
}

impl MutationRecord {
    /// Decode a raw record. The discriminator is matched against the known
    /// kinds; everything else is a [`DecodeError`] rejecting the batch.
    pub fn decode(raw: &RawRecord) -> Result<MutationRecord, RecordError> {
        let args = raw.args.as_slice();
        let record = match (raw.module.as_str(), raw.kind.as_str()) {
            ("dom", "create_root") => MutationRecord::CreateRoot {
                root: NodeDescriptor::from_value(
                    arg(args, 0, "create_root", "node")?,
                    "create_root",
                )?,
            },
            ("dom", "add_subtree") => MutationRecord::AddSubtree {
                parent_id: u64_arg(args, 0, "add_subtree", "parent_id")?,
                root: NodeDescriptor::from_value(
                    arg(args, 1, "add_subtree", "node")?,
                    "add_subtree",
                )?,
                index: index_arg(args, 2),
            },
            ("dom", "remove") => MutationRecord::Remove {
                node_id: u64_arg(args, 0, "remove", "node_id")?,
            },
            ("dom", "move") => MutationRecord::Move {
                node_id: u64_arg(args, 0, "move", "node_id")?,
                parent_id: u64_arg(args, 1, "move", "parent_id")?,
                index: index_arg(args, 2),
            },
            ("dom", "update_inline_style") => MutationRecord::UpdateInlineStyle {
                node_id: u64_arg(args, 0, "update_inline_style", "node_id")?,
                declarations: style_map_arg(args, 1, "update_inline_style", "declarations")?,
            },
            ("dom", "update_style_identity") => {
                let node_id = u64_arg(args, 0, "update_style_identity", "node_id")?;
                let obj = arg(args, 1, "update_style_identity", "identity")?
                    .as_object()
                    .ok_or(FieldError::new(
                        "update_style_identity",
                        "identity",
                        "object",
                    ))?;
                MutationRecord::UpdateStyleIdentity {
                    node_id,
                    classes: obj.get("class").and_then(Value::as_str).map(str::to_string),
                    css_id: obj
                        .get("css_id")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    style_object_id: obj.get("style_object_id").and_then(Value::as_u64),
                    restyle: obj
                        .get("restyle")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                }
            }
            ("dom", "update_attrs") => {
                let node_id = u64_arg(args, 0, "update_attrs", "node_id")?;
                let obj = arg(args, 1, "update_attrs", "attrs")?
                    .as_object()
                    .ok_or(FieldError::new("update_attrs", "attrs", "object"))?;
                let mut attrs = Vec::with_capacity(obj.len());
                for (name, value) in obj {
                    if let Some(value) = value_to_style_string(value) {
                        attrs.push((name.clone(), value));
                    }
                }
                MutationRecord::UpdateAttributes { node_id, attrs }
            }
            ("dom", "add_event") => MutationRecord::AddEvent {
                node_id: u64_arg(args, 0, "add_event", "node_id")?,
                event: str_arg(args, 1, "add_event", "event")?.to_string(),
            },
            ("dom", "remove_event") => MutationRecord::RemoveEvent {
                node_id: u64_arg(args, 0, "remove_event", "node_id")?,
                event: str_arg(args, 1, "remove_event", "event")?.to_string(),
            },
            ("dom", "register_style_object") => {
                let sheet_id = u64_arg(args, 0, "register_style_object", "sheet_id")?;
                let sheet = arg(args, 1, "register_style_object", "sheet")?;
                let sheet = StyleSheet::from_value(sheet).ok_or(FieldError::new(
                    "register_style_object",
                    "sheet",
                    "rule text or structured sheet",
                ))?;
                MutationRecord::RegisterStyleObject {
                    sheet_id,
                    sheet,
                    doc_level: args.get(2).and_then(Value::as_bool).unwrap_or(false),
                }
            }
            ("dom", "finish") => MutationRecord::Finish,
            ("page", "set_title") => MutationRecord::SetTitle {
                payload: arg(args, 0, "set_title", "title")?.clone(),
            },
            ("page", "set_status_bar") => MutationRecord::SetStatusBar {
                payload: arg(args, 0, "set_status_bar", "status")?.clone(),
            },
            ("page", "scroll_to") => MutationRecord::ScrollTo {
                payload: arg(args, 0, "scroll_to", "position")?.clone(),
            },
            ("page", "statistics") => MutationRecord::Statistics {
                payload: arg(args, 0, "statistics", "statistics")?.clone(),
            },
            _ => {
                return Err(DecodeError::UnknownKind {
                    module: raw.module.clone(),
                    kind: raw.kind.clone(),
                }
                .into());
            }
        };
        Ok(record)
    }

    /// Decode a whole batch. Field errors skip the offending record with a
    /// warning; an unrecognized kind rejects the batch.
    pub fn decode_batch(batch: &RawBatch) -> Result<Vec<MutationRecord>, DecodeError> {
        let mut records = Vec::with_capacity(batch.records.len());
        for raw in &batch.records {
            match MutationRecord::decode(raw) {
                Ok(record) => records.push(record),
                Err(RecordError::Field(err)) => {
                    tracing::warn!(module = %raw.module, kind = %raw.kind, %err, "skipping malformed record");
                }
                Err(RecordError::Decode(err)) => return Err(err),
            }
        }
        Ok(records)
    }
}

/// Applies decoded mutation records against a [`Document`], emitting one
/// style-resolved [`ChangeAction`] per record with a presentation effect.
pub struct DocumentMutator<'doc> {
    /// Document is public as an escape hatch, but users of this API should
    /// ideally avoid using it and prefer exposing additional functionality
    /// in DocumentMutator.
    pub doc: &'doc mut Document,
}

impl<'doc> DocumentMutator<'doc> {
    pub fn new(doc: &'doc mut Document) -> DocumentMutator<'doc> {
        DocumentMutator { doc }
    }

    /// Apply one record. Returns the resulting action, or `None` for
    /// records with no presentation effect (sheet registration).
    pub fn apply(&mut self, record: &MutationRecord) -> Option<ChangeAction> {
        match record {
            MutationRecord::CreateRoot { root } => {
                self.doc.root_id = Some(root.id);
                Some(self.build_subtree(root, None, None))
            }
            MutationRecord::AddSubtree {
                parent_id,
                index,
                root,
            } => Some(self.build_subtree(root, Some(*parent_id), *index)),
            MutationRecord::Remove { node_id } => {
                self.doc.remove_node(*node_id);
                Some(ChangeAction::new(ActionKind::Remove, *node_id))
            }
            MutationRecord::Move {
                node_id,
                parent_id,
                index,
            } => {
                self.doc.reparent(*node_id, *parent_id, *index);
                let mut action = ChangeAction::new(ActionKind::Move, *node_id);
                action.parent_id = Some(*parent_id);
                action.index = *index;
                Some(action)
            }
            MutationRecord::UpdateInlineStyle {
                node_id,
                declarations,
            } => {
                let node = self.find_or_create_target(*node_id);
                for (name, value) in declarations {
                    node.inline_style.insert(name.clone(), value.clone());
                }
                Some(self.style_update_action(*node_id))
            }
            MutationRecord::UpdateStyleIdentity {
                node_id,
                classes,
                css_id,
                style_object_id,
                restyle,
            } => {
                let node = self.find_or_create_target(*node_id);
                if let Some(classes) = classes {
                    node.set_classes(classes);
                }
                if let Some(css_id) = css_id {
                    node.css_id = if css_id.is_empty() {
                        None
                    } else {
                        Some(css_id.clone())
                    };
                }
                if let Some(style_object_id) = style_object_id {
                    node.style_object_id = *style_object_id;
                }
                if *restyle {
                    self.doc.restyle(*node_id)
                } else {
                    Some(self.style_update_action(*node_id))
                }
            }
            MutationRecord::UpdateAttributes { node_id, attrs } => {
                let node = self.find_or_create_target(*node_id);
                let mut map = StyleMap::new();
                for (name, value) in attrs {
                    node.set_attribute(name, value);
                    map.insert(name.clone(), value.clone());
                }
                let mut action = ChangeAction::new(ActionKind::UpdateAttrs, *node_id);
                action.attrs = Some(map);
                Some(action)
            }
            MutationRecord::AddEvent { node_id, event } => {
                let node = self.find_or_create_target(*node_id);
                if !node.events.iter().any(|e| e == event) {
                    node.events.push(event.clone());
                }
                let mut action = ChangeAction::new(ActionKind::AddEvent, *node_id);
                action.event = Some(event.clone());
                Some(action)
            }
            MutationRecord::RemoveEvent { node_id, event } => {
                if let Some(node) = self.doc.get_node_mut(*node_id) {
                    node.events.retain(|e| e != event);
                }
                let mut action = ChangeAction::new(ActionKind::RemoveEvent, *node_id);
                action.event = Some(event.clone());
                Some(action)
            }
            MutationRecord::RegisterStyleObject {
                sheet_id,
                sheet,
                doc_level,
            } => {
                if *doc_level {
                    self.doc
                        .register_doc_level_style_sheet(*sheet_id, sheet.clone());
                } else {
                    self.doc.register_style_sheet(*sheet_id, sheet.clone());
                }
                None
            }
            MutationRecord::Finish => Some(ChangeAction::finish()),
            MutationRecord::SetTitle { payload } => {
                Some(ChangeAction::chrome(ActionKind::SetTitle, payload.clone()))
            }
            MutationRecord::SetStatusBar { payload } => Some(ChangeAction::chrome(
                ActionKind::SetStatusBar,
                payload.clone(),
            )),
            MutationRecord::ScrollTo { payload } => {
                Some(ChangeAction::chrome(ActionKind::ScrollTo, payload.clone()))
            }
            MutationRecord::Statistics { payload } => Some(ChangeAction::chrome(
                ActionKind::Statistics,
                payload.clone(),
            )),
        }
    }

    /// Build one subtree from a descriptor: materialize the node, recurse
    /// into child descriptors, then cascade-resolve, nesting child actions
    /// under the parent action in source order.
    fn build_subtree(
        &mut self,
        descriptor: &NodeDescriptor,
        parent_id: Option<u64>,
        index: Option<usize>,
    ) -> ChangeAction {
        let node = self
            .doc
            .find_or_create_node(descriptor.id, Some(&descriptor.tag));
        if let Some(classes) = &descriptor.classes {
            node.set_classes(classes);
        }
        node.css_id = descriptor.css_id.clone();
        node.style_object_id = descriptor.style_object_id;
        node.flags
            .set(NodeFlags::USE_PARENT_STYLE, descriptor.use_parent_style);
        for (name, value) in &descriptor.style {
            node.inline_style.insert(name.clone(), value.clone());
        }
        for (name, value) in &descriptor.attrs {
            node.set_attribute(name, value);
        }
        for event in &descriptor.events {
            if !node.events.iter().any(|e| e == event) {
                node.events.push(event.clone());
            }
        }

        if let Some(parent_id) = parent_id {
            self.doc.reparent(descriptor.id, parent_id, index);
        }

        // Children are parsed before the cascade resolver runs on the new
        // node, so descendant rules see the finished subtree.
        let child_actions: Vec<ChangeAction> = descriptor
            .children
            .iter()
            .map(|child| self.build_subtree(child, Some(descriptor.id), None))
            .collect();

        let (style, matched) = self.doc.resolve_style(descriptor.id);
        let mut action = ChangeAction::new(ActionKind::Add, descriptor.id);
        action.parent_id = parent_id;
        action.index = index;
        action.style = Some(style);
        action.matched = matched;
        action.children = child_actions;
        action
    }

    /// Style updates may reference a node described in a later record or an
    /// earlier unflushed batch: materialize it and defer linking to repair.
    fn find_or_create_target(&mut self, node_id: u64) -> &mut crate::Node {
        let is_root = self.doc.root_id == Some(node_id);
        let existed = self.doc.contains_node(node_id);
        let node = self.doc.find_or_create_node(node_id, None);
        if !existed || (node.parent.is_none() && !is_root) {
            node.mark_dirty();
        }
        node
    }

    fn style_update_action(&mut self, node_id: u64) -> ChangeAction {
        let (style, matched) = self.doc.resolve_style(node_id);
        let mut action = ChangeAction::new(ActionKind::UpdateStyle, node_id);
        action.style = Some(style);
        action.matched = matched;
        action
    }
}
