use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use trellis_traits::{ColorScheme, MediaContext, Value};

use crate::node::Node;

/// An ordered property → value map. `BTreeMap` keeps resolution output
/// byte-stable: resolving the same node twice yields identical maps.
pub type StyleMap = BTreeMap<String, String>;

/// One compound selector: `tag#id.class1.class2` (all parts optional).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompoundSelector {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: SmallVec<[String; 2]>,
}

impl CompoundSelector {
    pub fn matches(&self, node: &Node) -> bool {
        if let Some(tag) = &self.tag {
            if *tag != node.tag {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if node.css_id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes
            .iter()
            .all(|class| node.classes.iter().any(|c| c == class))
    }

    fn parse(part: &str) -> Option<Self> {
        let mut compound = CompoundSelector::default();
        let mut rest = part;
        // Leading tag name (runs until the first `.` or `#`)
        let tag_end = rest.find(['.', '#']).unwrap_or(rest.len());
        if tag_end > 0 {
            let tag = &rest[..tag_end];
            if tag != "*" {
                compound.tag = Some(tag.to_string());
            }
            rest = &rest[tag_end..];
        }
        while !rest.is_empty() {
            let marker = rest.as_bytes()[0];
            rest = &rest[1..];
            let end = rest.find(['.', '#']).unwrap_or(rest.len());
            let name = &rest[..end];
            if name.is_empty() {
                return None;
            }
            match marker {
                b'.' => compound.classes.push(name.to_string()),
                b'#' => compound.id = Some(name.to_string()),
                _ => return None,
            }
            rest = &rest[end..];
        }
        if compound.tag.is_none() && compound.id.is_none() && compound.classes.is_empty() {
            return None;
        }
        Some(compound)
    }
}

/// A selector: compound selectors joined by descendant combinators,
/// e.g. `.list .item` or `div#root .title`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selector {
    /// Ancestor-most first; the last compound is the subject.
    pub compounds: SmallVec<[CompoundSelector; 2]>,
}

impl Selector {
    pub fn parse(source: &str) -> Option<Self> {
        let compounds: Option<SmallVec<_>> = source
            .split_ascii_whitespace()
            .map(CompoundSelector::parse)
            .collect();
        let compounds = compounds?;
        if compounds.is_empty() {
            return None;
        }
        Some(Selector { compounds })
    }

    pub fn subject(&self) -> &CompoundSelector {
        // Parse guarantees at least one compound
        self.compounds.last().unwrap()
    }

    /// Compounds to the left of the subject, subject-adjacent first.
    pub fn ancestor_compounds(&self) -> impl Iterator<Item = &CompoundSelector> {
        self.compounds[..self.compounds.len() - 1].iter().rev()
    }
}

/// One `selector { declarations }` rule.
#[derive(Debug, Clone)]
pub struct StyleRule {
    pub selector: Selector,
    pub declarations: StyleMap,
}

/// A media condition gating a whole sheet's applicability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaCondition {
    pub min_width: Option<f32>,
    pub max_width: Option<f32>,
    pub color_scheme: Option<ColorScheme>,
}

impl MediaCondition {
    pub fn applies(&self, ctx: &MediaContext) -> bool {
        if let Some(min) = self.min_width {
            if ctx.width < min {
                return false;
            }
        }
        if let Some(max) = self.max_width {
            if ctx.width > max {
                return false;
            }
        }
        if let Some(scheme) = self.color_scheme {
            if ctx.color_scheme != scheme {
                return false;
            }
        }
        true
    }

    fn from_value(value: &Value) -> Self {
        let as_f32 = |key: &str| value.get(key).and_then(Value::as_f64).map(|v| v as f32);
        MediaCondition {
            min_width: as_f32("min-width"),
            max_width: as_f32("max-width"),
            color_scheme: value.get("color-scheme").and_then(Value::as_str).map(|s| {
                if s == "dark" {
                    ColorScheme::Dark
                } else {
                    ColorScheme::Light
                }
            }),
        }
    }
}

/// An opaque rule set, either doc-level or node-scoped via `style_object_id`.
///
/// Tracks the set of nodes ("owners") currently relying on it so that an
/// external context change can retarget re-matching at exactly the affected
/// subtrees.
#[derive(Debug, Clone, Default)]
pub struct StyleSheet {
    pub rules: Vec<StyleRule>,
    pub media: Option<MediaCondition>,
    pub(crate) owners: FxHashSet<u64>,
}

impl StyleSheet {
    pub fn new(rules: Vec<StyleRule>) -> Self {
        Self {
            rules,
            media: None,
            owners: FxHashSet::default(),
        }
    }

    pub fn with_media(mut self, media: MediaCondition) -> Self {
        self.media = Some(media);
        self
    }

    /// Parse a sheet from CSS-ish rule text. Unparseable rules are dropped.
    pub fn parse(css: &str) -> Self {
        let mut rules = Vec::new();
        for block in css.split('}') {
            let Some((selector_src, body)) = block.split_once('{') else {
                continue;
            };
            let Some(selector) = Selector::parse(selector_src.trim()) else {
                continue;
            };
            let mut declarations = StyleMap::new();
            for decl in body.split(';') {
                if let Some((name, value)) = decl.split_once(':') {
                    declarations.insert(name.trim().to_string(), value.trim().to_string());
                }
            }
            rules.push(StyleRule {
                selector,
                declarations,
            });
        }
        StyleSheet::new(rules)
    }

    /// Parse a sheet from a structured `register-style-object` payload:
    /// either a rule-text string or an object of the form
    /// `{"rules": [{"selector": ..., "declarations": {...}}], "media": {...}}`.
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(css) = value.as_str() {
            return Some(StyleSheet::parse(css));
        }
        let obj = value.as_object()?;
        let mut rules = Vec::new();
        for rule in obj.get("rules")?.as_array()? {
            let Some(selector) = rule.get("selector").and_then(Value::as_str) else {
                continue;
            };
            let Some(selector) = Selector::parse(selector) else {
                continue;
            };
            let mut declarations = StyleMap::new();
            if let Some(decls) = rule.get("declarations").and_then(Value::as_object) {
                for (name, value) in decls {
                    if let Some(value) = value_to_style_string(value) {
                        declarations.insert(name.clone(), value);
                    }
                }
            }
            rules.push(StyleRule {
                selector,
                declarations,
            });
        }
        let mut sheet = StyleSheet::new(rules);
        if let Some(media) = obj.get("media") {
            sheet.media = Some(MediaCondition::from_value(media));
        }
        Some(sheet)
    }

    /// Whether the sheet's rules apply under the given media context.
    pub fn applies(&self, ctx: &MediaContext) -> bool {
        self.media.as_ref().is_none_or(|media| media.applies(ctx))
    }

    /// Whether switching from `old` to `new` changes this sheet's
    /// applicability (and so requires re-matching its owners).
    pub fn affected_by(&self, old: &MediaContext, new: &MediaContext) -> bool {
        self.applies(old) != self.applies(new)
    }

    pub fn owners(&self) -> impl Iterator<Item = u64> + '_ {
        self.owners.iter().copied()
    }
}

pub(crate) fn value_to_style_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
