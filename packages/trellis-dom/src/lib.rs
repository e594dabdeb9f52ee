//! The core document model for Trellis
//!
//! This crate implements a headless, style-aware UI tree ([`Document`]) which is
//! designed to be embedded in and "driven" by external code: a scripting runtime
//! feeds it raw mutation batches and the tree answers with style-resolved
//! [`ChangeAction`]s for a presentation layer.
//!
//! It includes: the node tree itself, a style-sheet registry with owner
//! tracking, a CSS-like cascade resolver with descendant-combinator matching,
//! a mutation-record parser, and opportunistic repair of structurally
//! incomplete nodes. Scheduling and cross-batch ordering live in the
//! `trellis-pipeline` crate.

/// The document implementation.
///
/// This is the primary entry point for this crate.
mod document;

/// The nodes themselves, and their data.
pub mod node;

mod action;
mod error;
mod mutator;
mod repair;
mod resolve;
mod stylesheet;
mod traversal;

pub use action::{ActionKind, ActionPackage, ChangeAction, RuleRef};
pub use document::Document;
pub use error::{DecodeError, FieldError, RecordError};
pub use mutator::{DocumentMutator, MutationRecord, NodeDescriptor};
pub use node::{Attribute, Node, NodeFlags};
pub use stylesheet::{
    CompoundSelector, MediaCondition, Selector, StyleMap, StyleRule, StyleSheet,
};
pub use traversal::{AncestorTraverser, TreeTraverser};
