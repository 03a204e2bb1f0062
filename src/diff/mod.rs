//! Clustering of structurally-equal annotations across annotators.
//!
//! [`DiffEngine`] runs once per requested type: it buckets nodes by span
//! ([`SpanIndex`]), compares them with [`NodeComparator`], and clusters
//! mutually agreeing nodes into [`AnnotationSelection`]s, grouped into
//! [`AnnotationOption`]s per conceptual annotation slot. Every structure
//! here is rebuilt from scratch per invocation; nothing is persisted.
//!
//! Tie-break policy is first-match-wins: a node attaches to the first
//! already-placed node it structurally agrees with (in the fixed annotator
//! order), not to the best match among several candidates. Because later
//! nodes are compared against *all* previously-placed anchors, a bucket
//! whose nodes all mutually agree converges to one selection regardless of
//! encounter order.

pub mod comparator;
pub mod span_index;

pub use comparator::{Comparison, NodeComparator, POSITION_DIFF, TYPE_DIFF};
pub use span_index::SpanIndex;

use crate::document::{AnnotatorSnapshot, NodeAddress, NodeId};
use crate::error::{Error, Result};
use crate::schema::{LinkCompareMode, ProjectSchema};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// An equivalence class of annotation nodes, at most one per annotator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationSelection {
    /// Annotator index → node id.
    entries: BTreeMap<u32, NodeId>,
}

impl AnnotationSelection {
    fn singleton(addr: NodeAddress) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(addr.annotator, addr.node);
        Self { entries }
    }

    /// Whether this selection already holds a node from the annotator.
    #[must_use]
    pub fn contains_annotator(&self, annotator: u32) -> bool {
        self.entries.contains_key(&annotator)
    }

    /// Node contributed by the annotator, if any.
    #[must_use]
    pub fn node_for(&self, annotator: u32) -> Option<NodeId> {
        self.entries.get(&annotator).copied()
    }

    /// Number of contributing annotators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no annotator contributed (never true for built results).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All member addresses in annotator order.
    pub fn addresses(&self) -> impl Iterator<Item = NodeAddress> + '_ {
        self.entries
            .iter()
            .map(|(&annotator, &node)| NodeAddress::new(annotator, node))
    }

    fn insert(&mut self, addr: NodeAddress) {
        debug_assert!(!self.contains_annotator(addr.annotator));
        self.entries.insert(addr.annotator, addr.node);
    }
}

/// The set of alternative selections competing for one annotation slot:
/// one type at one `(begin, end)` position (`None` for span-less nodes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationOption {
    /// Type name of the competing selections.
    pub type_name: String,
    /// Position of the slot; `None` for span-less nodes.
    pub position: Option<(u32, u32)>,
    /// Indices into [`DiffResult::selections`].
    pub selections: Vec<usize>,
}

/// Output of one diff invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    /// Fixed annotator ordering used for this run.
    pub annotators: Vec<String>,
    /// All selections, in creation order.
    pub selections: Vec<AnnotationSelection>,
    /// All options, in type-then-position order of creation.
    pub options: Vec<AnnotationOption>,
}

impl DiffResult {
    /// Options belonging to one type.
    pub fn options_of_type<'a>(
        &'a self,
        type_name: &'a str,
    ) -> impl Iterator<Item = &'a AnnotationOption> + 'a {
        self.options.iter().filter(move |o| o.type_name == type_name)
    }

    /// Number of annotation slots found (the "diff size").
    #[must_use]
    pub fn size(&self) -> usize {
        self.options.len()
    }

    /// Total node count across all selections.
    ///
    /// Equals the total node count of the diffed types across all
    /// annotators: every node is placed exactly once.
    #[must_use]
    pub fn total_nodes(&self) -> usize {
        self.selections.iter().map(AnnotationSelection::len).sum()
    }
}

/// Clusters annotations of requested types into selections and options.
///
/// The engine is synchronous, single-threaded per call, CPU-bound, and
/// side-effect-free; each invocation allocates its own index and
/// accumulator, so calls over disjoint inputs may run concurrently
/// without synchronization.
pub struct DiffEngine<'a> {
    schema: &'a ProjectSchema,
    link_mode: LinkCompareMode,
}

impl<'a> DiffEngine<'a> {
    /// Create an engine over a schema with the given link-comparison mode.
    #[must_use]
    pub fn new(schema: &'a ProjectSchema, link_mode: LinkCompareMode) -> Self {
        Self { schema, link_mode }
    }

    /// Diff the given types across annotators, optionally restricted to a
    /// `[window_begin, window_end)` range.
    ///
    /// `annotators` supplies the fixed ordering; `snapshots` is aligned
    /// with it. Types are never cross-compared. An unsupported feature
    /// range type aborts the whole call; no partial result is returned.
    pub fn diff(
        &self,
        annotators: &[String],
        snapshots: &[&AnnotatorSnapshot],
        types: &[&str],
        window: Option<(u32, u32)>,
    ) -> Result<DiffResult> {
        if annotators.len() != snapshots.len() {
            return Err(Error::invalid_input(format!(
                "{} annotator names for {} snapshots",
                annotators.len(),
                snapshots.len()
            )));
        }

        let comparator = NodeComparator::new(snapshots, self.schema, self.link_mode);
        let mut state = DiffState {
            result: DiffResult {
                annotators: annotators.to_vec(),
                selections: Vec::new(),
                options: Vec::new(),
            },
            placed: HashMap::new(),
            option_index: HashMap::new(),
            snapshots,
        };

        for ty in types {
            self.diff_type(ty, window, &comparator, &mut state)?;
        }

        log::debug!(
            "diff over {} type(s): {} option(s), {} selection(s), {} node(s)",
            types.len(),
            state.result.options.len(),
            state.result.selections.len(),
            state.result.total_nodes()
        );
        Ok(state.result)
    }

    fn diff_type(
        &self,
        type_name: &str,
        window: Option<(u32, u32)>,
        comparator: &NodeComparator<'_>,
        state: &mut DiffState<'_>,
    ) -> Result<()> {
        let index = SpanIndex::build(state.snapshots, type_name, window);

        // Running accumulator scoped to the whole type: every node placed
        // so far, in insertion order, so later nodes are compared against
        // all previous anchors.
        let mut anchors: Vec<NodeAddress> = Vec::new();

        for (_position, bucket) in index.iter() {
            for &addr in bucket {
                if state.placed.contains_key(&addr) {
                    // Already merged in as a linked child of an earlier node.
                    anchors.push(addr);
                    continue;
                }

                let mut merged = false;
                for &anchor in &anchors {
                    let selection = &state.result.selections[state.placed[&anchor]];
                    if selection.contains_annotator(addr.annotator) {
                        // First-match-wins: the slot is taken, keep looking.
                        continue;
                    }
                    let cmp = comparator.compare(addr, anchor)?;
                    if !cmp.agreeing {
                        continue;
                    }
                    // Merge the top-level pair and every recursively-agreed
                    // child pair, so sub-structures merge transitively.
                    for &(pa, pb) in &cmp.agreed_pairs {
                        state.merge_pair(pa, pb);
                    }
                    merged = true;
                    break;
                }

                if !merged {
                    state.place_singleton(addr);
                }
                anchors.push(addr);
            }
        }

        // Span-less nodes of the type cannot be bucketed; each unplaced one
        // still gets a selection so no node is left out.
        for (annotator, snapshot) in state.snapshots.iter().enumerate() {
            let spanless: Vec<NodeId> = snapshot
                .nodes_of_type(type_name)
                .filter(|n| n.span.is_none())
                .map(|n| n.id)
                .collect();
            for node in spanless {
                let addr = NodeAddress::new(annotator as u32, node);
                if !state.placed.contains_key(&addr) {
                    state.place_singleton(addr);
                }
            }
        }

        Ok(())
    }
}

struct DiffState<'a> {
    result: DiffResult,
    /// Node → selection index, insertion-ordered via the anchors list.
    placed: HashMap<NodeAddress, usize>,
    /// (type, position) → option index.
    option_index: HashMap<(String, Option<(u32, u32)>), usize>,
    snapshots: &'a [&'a AnnotatorSnapshot],
}

impl DiffState<'_> {
    fn slot_key(&self, addr: NodeAddress) -> (String, Option<(u32, u32)>) {
        let node = self.snapshots[addr.annotator as usize]
            .get(addr.node)
            .expect("placed addresses resolve to nodes");
        (node.type_name.clone(), node.span)
    }

    fn place_singleton(&mut self, addr: NodeAddress) -> usize {
        let sel_idx = self.result.selections.len();
        self.result
            .selections
            .push(AnnotationSelection::singleton(addr));
        self.placed.insert(addr, sel_idx);
        self.attach_to_option(addr, sel_idx);
        sel_idx
    }

    fn attach_to_option(&mut self, addr: NodeAddress, sel_idx: usize) {
        let key = self.slot_key(addr);
        let options = &mut self.result.options;
        let opt_idx = *self.option_index.entry(key.clone()).or_insert_with(|| {
            options.push(AnnotationOption {
                type_name: key.0,
                position: key.1,
                selections: Vec::new(),
            });
            options.len() - 1
        });
        self.result.options[opt_idx].selections.push(sel_idx);
    }

    /// Merge one recursively-agreed `(new, old)` pair into the selection
    /// structure. First-match-wins: a node already placed elsewhere stays
    /// where it is.
    fn merge_pair(&mut self, pa: NodeAddress, pb: NodeAddress) {
        match (self.placed.get(&pa).copied(), self.placed.get(&pb).copied()) {
            (Some(_), Some(_)) => {}
            (None, Some(target)) => self.join_or_single(pa, target),
            (Some(target), None) => self.join_or_single(pb, target),
            (None, None) => {
                if pa.annotator == pb.annotator {
                    self.place_singleton(pa);
                    if pa != pb {
                        self.place_singleton(pb);
                    }
                } else {
                    let sel_idx = self.place_singleton(pb);
                    self.result.selections[sel_idx].insert(pa);
                    self.placed.insert(pa, sel_idx);
                }
            }
        }
    }

    fn join_or_single(&mut self, addr: NodeAddress, sel_idx: usize) {
        if self.result.selections[sel_idx].contains_annotator(addr.annotator) {
            self.place_singleton(addr);
        } else {
            self.result.selections[sel_idx].insert(addr);
            self.placed.insert(addr, sel_idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::AnnotationNode;
    use crate::schema::{FeatureRange, FeatureSchema, LayerSchema};

    fn schema() -> ProjectSchema {
        ProjectSchema::new()
            .with_layer(
                LayerSchema::new("Span")
                    .with_feature(FeatureSchema::new("value", FeatureRange::Str))
                    .with_label_feature("value"),
            )
            .with_layer(
                LayerSchema::new("Target")
                    .with_feature(FeatureSchema::new("role", FeatureRange::Str))
                    .with_label_feature("role"),
            )
    }

    fn span(id: u32, b: u32, e: u32, value: Option<&str>) -> AnnotationNode {
        AnnotationNode::new(id, "Span", Some((b, e))).with_str("value", value)
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("annotator{i}")).collect()
    }

    #[test]
    fn test_identical_documents_single_selection_per_option() {
        let s = schema();
        let a = AnnotatorSnapshot::new()
            .with(span(1, 0, 4, Some("PER")))
            .with(span(2, 5, 9, Some("ORG")));
        let b = a.clone();
        let engine = DiffEngine::new(&s, LinkCompareMode::TargetIdentity);

        let diff = engine
            .diff(&names(2), &[&a, &b], &["Span"], None)
            .unwrap();
        assert_eq!(diff.size(), 2);
        for option in &diff.options {
            assert_eq!(option.selections.len(), 1);
            assert_eq!(diff.selections[option.selections[0]].len(), 2);
        }
    }

    #[test]
    fn test_empty_documents_diff_size_zero() {
        let s = schema();
        let a = AnnotatorSnapshot::new();
        let b = AnnotatorSnapshot::new();
        let engine = DiffEngine::new(&s, LinkCompareMode::TargetIdentity);

        let diff = engine
            .diff(&names(2), &[&a, &b], &["Span"], None)
            .unwrap();
        assert_eq!(diff.size(), 0);
        assert_eq!(diff.total_nodes(), 0);
    }

    #[test]
    fn test_every_node_placed_exactly_once() {
        let s = schema();
        let a = AnnotatorSnapshot::new()
            .with(span(1, 0, 1, Some("")))
            .with(span(2, 1, 2, Some("")))
            .with(span(3, 3, 4, Some("A")));
        let b = AnnotatorSnapshot::new()
            .with(span(1, 0, 1, Some("")))
            .with(span(2, 2, 3, Some("")))
            .with(span(3, 3, 4, Some("B")));
        let engine = DiffEngine::new(&s, LinkCompareMode::TargetIdentity);

        let diff = engine
            .diff(&names(2), &[&a, &b], &["Span"], None)
            .unwrap();
        assert_eq!(diff.total_nodes(), 6);
        // 4 positions: (0,1) merged, (1,2) A-only, (2,3) B-only, (3,4) split.
        assert_eq!(diff.size(), 4);
        let split = diff
            .options
            .iter()
            .find(|o| o.position == Some((3, 4)))
            .unwrap();
        assert_eq!(split.selections.len(), 2);
    }

    #[test]
    fn test_three_way_bucket_converges_to_one_selection() {
        let s = schema();
        let a = AnnotatorSnapshot::new().with(span(1, 0, 4, Some("PER")));
        let b = a.clone();
        let c = a.clone();
        let engine = DiffEngine::new(&s, LinkCompareMode::TargetIdentity);

        let diff = engine
            .diff(&names(3), &[&a, &b, &c], &["Span"], None)
            .unwrap();
        assert_eq!(diff.size(), 1);
        assert_eq!(diff.selections.len(), 1);
        assert_eq!(diff.selections[0].len(), 3);
    }

    #[test]
    fn test_same_annotator_duplicates_stay_separate() {
        let s = schema();
        let a = AnnotatorSnapshot::new()
            .with(span(1, 0, 4, Some("PER")))
            .with(span(2, 0, 4, Some("PER")));
        let b = AnnotatorSnapshot::new().with(span(1, 0, 4, Some("PER")));
        let engine = DiffEngine::new(&s, LinkCompareMode::TargetIdentity);

        let diff = engine
            .diff(&names(2), &[&a, &b], &["Span"], None)
            .unwrap();
        // First-match-wins: b's node joins a's first; a's duplicate gets
        // its own selection in the same option.
        assert_eq!(diff.size(), 1);
        assert_eq!(diff.selections.len(), 2);
        assert_eq!(diff.total_nodes(), 3);
        let first = &diff.selections[0];
        assert_eq!(first.len(), 2);
        assert_eq!(first.node_for(0), Some(1));
    }

    #[test]
    fn test_linked_children_merge_transitively() {
        let s = schema();
        let mk = |target_id: u32| {
            AnnotatorSnapshot::new()
                .with(
                    AnnotationNode::new(1, "Span", Some((0, 4)))
                        .with_str("value", Some("PER"))
                        .with_link("target", Some(target_id)),
                )
                .with(
                    AnnotationNode::new(target_id, "Target", Some((5, 9)))
                        .with_str("role", Some("agent")),
                )
        };
        let a = mk(10);
        let b = mk(20);
        let engine = DiffEngine::new(&s, LinkCompareMode::TargetIdentity);

        let diff = engine
            .diff(&names(2), &[&a, &b], &["Span"], None)
            .unwrap();
        // Top-level selection plus the transitively merged child selection.
        assert_eq!(diff.selections.len(), 2);
        let child = diff
            .options
            .iter()
            .find(|o| o.type_name == "Target")
            .unwrap();
        assert_eq!(child.position, Some((5, 9)));
        assert_eq!(diff.selections[child.selections[0]].len(), 2);
    }

    #[test]
    fn test_unsupported_feature_aborts_whole_call() {
        let s = schema();
        let a = AnnotatorSnapshot::new().with(
            AnnotationNode::new(1, "Span", Some((0, 4)))
                .with_feature("value", crate::document::FeatureValue::Unsupported("FSArray".into())),
        );
        let b = AnnotatorSnapshot::new().with(span(1, 0, 4, Some("x")));
        let engine = DiffEngine::new(&s, LinkCompareMode::TargetIdentity);

        let err = engine
            .diff(&names(2), &[&a, &b], &["Span"], None)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeatureType(_)));
    }

    #[test]
    fn test_window_restricts_diff() {
        let s = schema();
        let a = AnnotatorSnapshot::new()
            .with(span(1, 0, 4, Some("PER")))
            .with(span(2, 50, 54, Some("ORG")));
        let b = a.clone();
        let engine = DiffEngine::new(&s, LinkCompareMode::TargetIdentity);

        let diff = engine
            .diff(&names(2), &[&a, &b], &["Span"], Some((0, 10)))
            .unwrap();
        assert_eq!(diff.size(), 1);
        assert_eq!(diff.options[0].position, Some((0, 4)));
    }

    #[test]
    fn test_mismatched_inputs_rejected() {
        let s = schema();
        let a = AnnotatorSnapshot::new();
        let engine = DiffEngine::new(&s, LinkCompareMode::TargetIdentity);
        let err = engine.diff(&names(2), &[&a], &["Span"], None).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_determinism_across_runs() {
        let s = schema();
        let a = AnnotatorSnapshot::new()
            .with(span(1, 0, 4, Some("PER")))
            .with(span(2, 5, 9, Some("ORG")))
            .with(span(3, 5, 9, Some("LOC")));
        let b = AnnotatorSnapshot::new()
            .with(span(1, 0, 4, Some("PER")))
            .with(span(2, 5, 9, Some("LOC")));
        let engine = DiffEngine::new(&s, LinkCompareMode::TargetIdentity);

        let d1 = engine.diff(&names(2), &[&a, &b], &["Span"], None).unwrap();
        let d2 = engine.diff(&names(2), &[&a, &b], &["Span"], None).unwrap();
        assert_eq!(d1, d2);
    }
}
