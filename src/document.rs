//! Data model for per-annotator document snapshots.
//!
//! A [`SourceDocument`] identifies the shared text; each annotator contributes
//! an [`AnnotatorSnapshot`] over it: a set of typed, feature-bearing
//! [`AnnotationNode`]s, possibly linked to one another. Snapshots are loaded
//! read-only for the duration of one diff + agreement call; nothing in this
//! module is persisted by the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a node within one annotator snapshot.
pub type NodeId = u32;

/// Reserved link name for the back-reference to the document text.
///
/// This reference exists in every span-bearing node of the source platform
/// and must never participate in structural equality comparison.
pub const DOCUMENT_TEXT_FEATURE: &str = "documentText";

/// Shared text identity, immutable for the duration of a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Document identifier (stable across annotators).
    pub id: String,
    /// Length of the document text in offset units.
    pub text_len: u32,
}

impl SourceDocument {
    /// Create a new source document identity.
    #[must_use]
    pub fn new(id: impl Into<String>, text_len: u32) -> Self {
        Self {
            id: id.into(),
            text_len,
        }
    }
}

/// A primitive or unsupported feature value.
///
/// `Str(None)` models a null string: two null strings agree, null vs
/// non-null disagrees. `Unsupported` carries the range-type name of a
/// feature kind the comparator cannot handle; encountering one during
/// comparison is a fatal, non-retryable error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeatureValue {
    /// 32-bit integer.
    Int(i32),
    /// 64-bit integer.
    Long(i64),
    /// 8-bit integer.
    Byte(i8),
    /// 32-bit float.
    Float(f32),
    /// 64-bit float.
    Double(f64),
    /// Boolean.
    Bool(bool),
    /// Possibly-null string.
    Str(Option<String>),
    /// A value of a range type the engine does not support.
    Unsupported(String),
}

impl FeatureValue {
    /// Render the value as a category label for agreement computation.
    ///
    /// Null strings render as the empty category, matching how absent
    /// feature values are treated.
    #[must_use]
    pub fn as_label(&self) -> String {
        match self {
            FeatureValue::Int(v) => v.to_string(),
            FeatureValue::Long(v) => v.to_string(),
            FeatureValue::Byte(v) => v.to_string(),
            FeatureValue::Float(v) => v.to_string(),
            FeatureValue::Double(v) => v.to_string(),
            FeatureValue::Bool(v) => v.to_string(),
            FeatureValue::Str(Some(s)) => s.clone(),
            FeatureValue::Str(None) => String::new(),
            FeatureValue::Unsupported(range) => format!("<unsupported:{range}>"),
        }
    }
}

/// A reference feature: a link to other nodes in the same snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkValue {
    /// Single-valued link; `None` models a null reference.
    Single(Option<NodeId>),
    /// Ordered multi-valued link.
    Multi(Vec<NodeId>),
}

/// A typed, feature-bearing unit of annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationNode {
    /// Node identifier, unique within its snapshot.
    pub id: NodeId,
    /// Type name (layer) of this node.
    pub type_name: String,
    /// Optional `(begin, end)` span, end-exclusive.
    pub span: Option<(u32, u32)>,
    /// Primitive feature values by feature name.
    pub features: BTreeMap<String, FeatureValue>,
    /// Reference features by feature name.
    ///
    /// A link named [`DOCUMENT_TEXT_FEATURE`] is the reserved text
    /// back-reference and is excluded from comparison.
    pub links: BTreeMap<String, LinkValue>,
}

impl AnnotationNode {
    /// Create a node with no features or links.
    #[must_use]
    pub fn new(id: NodeId, type_name: impl Into<String>, span: Option<(u32, u32)>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
            span,
            features: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    /// Set a primitive feature value.
    #[must_use]
    pub fn with_feature(mut self, name: impl Into<String>, value: FeatureValue) -> Self {
        self.features.insert(name.into(), value);
        self
    }

    /// Set a string feature, `None` for a null string.
    #[must_use]
    pub fn with_str(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.features
            .insert(name.into(), FeatureValue::Str(value.map(String::from)));
        self
    }

    /// Set a single-valued link feature.
    #[must_use]
    pub fn with_link(mut self, name: impl Into<String>, target: Option<NodeId>) -> Self {
        self.links.insert(name.into(), LinkValue::Single(target));
        self
    }

    /// Set an ordered multi-valued link feature.
    #[must_use]
    pub fn with_links(mut self, name: impl Into<String>, targets: Vec<NodeId>) -> Self {
        self.links.insert(name.into(), LinkValue::Multi(targets));
        self
    }
}

/// One annotator's full annotation graph for a document at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotatorSnapshot {
    nodes: BTreeMap<NodeId, AnnotationNode>,
    /// Whether the annotator marked this document as finished.
    pub finished: bool,
}

impl AnnotatorSnapshot {
    /// Create an empty, finished snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: BTreeMap::new(),
            finished: true,
        }
    }

    /// Mark the snapshot as not yet finished.
    #[must_use]
    pub fn unfinished(mut self) -> Self {
        self.finished = false;
        self
    }

    /// Add a node to the snapshot, replacing any node with the same id.
    pub fn add(&mut self, node: AnnotationNode) {
        self.nodes.insert(node.id, node);
    }

    /// Builder-style [`add`](Self::add).
    #[must_use]
    pub fn with(mut self, node: AnnotationNode) -> Self {
        self.add(node);
        self
    }

    /// Look up a node by id.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&AnnotationNode> {
        self.nodes.get(&id)
    }

    /// Iterate all nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &AnnotationNode> {
        self.nodes.values()
    }

    /// Iterate nodes of one type in id order.
    pub fn nodes_of_type<'a>(
        &'a self,
        type_name: &'a str,
    ) -> impl Iterator<Item = &'a AnnotationNode> + 'a {
        self.nodes.values().filter(move |n| n.type_name == type_name)
    }

    /// Total node count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the snapshot holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Address of a node across annotators: `(annotator index, node id)`.
///
/// The annotator index refers to the fixed, caller-supplied annotator
/// ordering of the current diff run, which makes tie-breaks reproducible.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct NodeAddress {
    /// Index into the fixed annotator ordering.
    pub annotator: u32,
    /// Node id within that annotator's snapshot.
    pub node: NodeId,
}

impl NodeAddress {
    /// Create a node address.
    #[must_use]
    pub fn new(annotator: u32, node: NodeId) -> Self {
        Self { annotator, node }
    }
}
