//! Span bucketing for one annotation type across annotators.

use crate::document::{AnnotatorSnapshot, NodeAddress};
use std::collections::BTreeMap;

/// Buckets annotation nodes of one type by `(begin, end)` offsets across
/// annotators.
///
/// Buckets iterate in ascending `(begin, end)` order; nodes inside a bucket
/// follow the fixed, caller-supplied annotator ordering (then node id), so
/// downstream tie-breaks are reproducible. An optional
/// `[window_begin, window_end)` filter restricts the index to nodes whose
/// span is covered by the window.
#[derive(Debug, Clone, Default)]
pub struct SpanIndex {
    buckets: BTreeMap<(u32, u32), Vec<NodeAddress>>,
}

impl SpanIndex {
    /// Build the index for `type_name` over the given snapshots.
    ///
    /// The slice index of each snapshot is its annotator index in the fixed
    /// ordering. Span-less nodes are not indexable and are skipped.
    #[must_use]
    pub fn build(
        snapshots: &[&AnnotatorSnapshot],
        type_name: &str,
        window: Option<(u32, u32)>,
    ) -> Self {
        let mut buckets: BTreeMap<(u32, u32), Vec<NodeAddress>> = BTreeMap::new();
        for (annotator, snapshot) in snapshots.iter().enumerate() {
            for node in snapshot.nodes_of_type(type_name) {
                let Some((begin, end)) = node.span else {
                    continue;
                };
                if let Some((wb, we)) = window {
                    if begin < wb || end > we {
                        continue;
                    }
                }
                buckets
                    .entry((begin, end))
                    .or_default()
                    .push(NodeAddress::new(annotator as u32, node.id));
            }
        }
        Self { buckets }
    }

    /// Iterate buckets in ascending `(begin, end)` order.
    pub fn iter(&self) -> impl Iterator<Item = ((u32, u32), &[NodeAddress])> {
        self.buckets.iter().map(|(pos, nodes)| (*pos, nodes.as_slice()))
    }

    /// Number of distinct `(begin, end)` positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether the index holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
