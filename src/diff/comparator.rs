//! Recursive structural-equality check between two annotation nodes.
//!
//! A pair of nodes registers as agreeing iff the full recursive diff map
//! for it ends empty. The comparison never short-circuits: every feature
//! and every reachable link target is visited so the complete per-pair
//! diff map is available for audit, and a missing (null) reference is
//! "not equal", never a fault. Cyclic and self-referential node graphs
//! are handled with an explicit visited-pairs set.

use crate::document::{
    AnnotationNode, AnnotatorSnapshot, FeatureValue, LinkValue, NodeAddress,
    DOCUMENT_TEXT_FEATURE,
};
use crate::error::{Error, Result};
use crate::schema::{LinkCompareMode, ProjectSchema};
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Outcome of comparing one pair of top-level nodes.
#[derive(Debug, Clone)]
pub struct Comparison {
    /// Whether the pair structurally agrees (full diff map empty).
    pub agreeing: bool,
    /// Every `(new, old)` node pair visited during an agreeing comparison,
    /// top-level pair first, in visit order. Empty when disagreeing.
    pub agreed_pairs: Vec<(NodeAddress, NodeAddress)>,
    /// Per-pair disagreeing feature names, for audit. Pairs that agreed
    /// internally have empty entries.
    pub diffs: BTreeMap<(NodeAddress, NodeAddress), Vec<String>>,
}

/// Disagreement marker recorded when the two nodes' spans differ.
pub const POSITION_DIFF: &str = "<position>";
/// Disagreement marker recorded when the two nodes' types differ.
pub const TYPE_DIFF: &str = "<type>";

/// Recursive structural comparator over a fixed set of snapshots.
pub struct NodeComparator<'a> {
    snapshots: &'a [&'a AnnotatorSnapshot],
    schema: &'a ProjectSchema,
    link_mode: LinkCompareMode,
}

impl<'a> NodeComparator<'a> {
    /// Create a comparator. Snapshot slice order is the fixed annotator
    /// ordering referenced by [`NodeAddress::annotator`].
    #[must_use]
    pub fn new(
        snapshots: &'a [&'a AnnotatorSnapshot],
        schema: &'a ProjectSchema,
        link_mode: LinkCompareMode,
    ) -> Self {
        Self {
            snapshots,
            schema,
            link_mode,
        }
    }

    /// Compare two nodes for structural agreement.
    ///
    /// Returns [`Error::UnsupportedFeatureType`] when a feature with an
    /// unsupported range kind is encountered on either side; this aborts
    /// the whole diff for the current document/type.
    pub fn compare(&self, new: NodeAddress, old: NodeAddress) -> Result<Comparison> {
        let mut diffs = BTreeMap::new();
        let mut visited = HashSet::new();
        let mut order = Vec::new();
        self.compare_pair(new, old, &mut diffs, &mut visited, &mut order)?;

        let agreeing = diffs.values().all(Vec::is_empty);
        let agreed_pairs = if agreeing { order } else { Vec::new() };
        Ok(Comparison {
            agreeing,
            agreed_pairs,
            diffs,
        })
    }

    fn node(&self, addr: NodeAddress) -> Option<&AnnotationNode> {
        self.snapshots
            .get(addr.annotator as usize)
            .and_then(|s| s.get(addr.node))
    }

    fn compare_pair(
        &self,
        a: NodeAddress,
        b: NodeAddress,
        diffs: &mut BTreeMap<(NodeAddress, NodeAddress), Vec<String>>,
        visited: &mut HashSet<(NodeAddress, NodeAddress)>,
        order: &mut Vec<(NodeAddress, NodeAddress)>,
    ) -> Result<()> {
        // Cycle guard: each pair is compared at most once per top-level call.
        if !visited.insert((a, b)) {
            return Ok(());
        }
        order.push((a, b));

        let (Some(na), Some(nb)) = (self.node(a), self.node(b)) else {
            // A dangling address is treated as "not equal", not as a fault.
            diffs.insert((a, b), vec![TYPE_DIFF.to_string()]);
            return Ok(());
        };

        let mut local = Vec::new();

        if na.type_name != nb.type_name {
            local.push(TYPE_DIFF.to_string());
            diffs.insert((a, b), local);
            return Ok(());
        }
        if na.span != nb.span {
            local.push(POSITION_DIFF.to_string());
        }

        self.compare_primitives(na, nb, &mut local)?;
        self.compare_links(a, b, na, nb, &mut local, diffs, visited, order)?;

        diffs.insert((a, b), local);
        Ok(())
    }

    fn compare_primitives(
        &self,
        na: &AnnotationNode,
        nb: &AnnotationNode,
        local: &mut Vec<String>,
    ) -> Result<()> {
        let names: BTreeSet<&str> = na
            .features
            .keys()
            .chain(nb.features.keys())
            .map(String::as_str)
            .collect();

        for name in names {
            let va = normalized(na.features.get(name));
            let vb = normalized(nb.features.get(name));
            if let FeatureValue::Unsupported(range) = va {
                return Err(Error::unsupported_feature_type(range.clone()));
            }
            if let FeatureValue::Unsupported(range) = vb {
                return Err(Error::unsupported_feature_type(range.clone()));
            }
            if va != vb {
                local.push(name.to_string());
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn compare_links(
        &self,
        a: NodeAddress,
        b: NodeAddress,
        na: &AnnotationNode,
        nb: &AnnotationNode,
        local: &mut Vec<String>,
        diffs: &mut BTreeMap<(NodeAddress, NodeAddress), Vec<String>>,
        visited: &mut HashSet<(NodeAddress, NodeAddress)>,
        order: &mut Vec<(NodeAddress, NodeAddress)>,
    ) -> Result<()> {
        let names: BTreeSet<&str> = na
            .links
            .keys()
            .chain(nb.links.keys())
            .map(String::as_str)
            .filter(|n| *n != DOCUMENT_TEXT_FEATURE)
            .collect();

        let null = LinkValue::Single(None);
        for name in names {
            let la = na.links.get(name).unwrap_or(&null);
            let lb = nb.links.get(name).unwrap_or(&null);
            match (la, lb) {
                (LinkValue::Single(None), LinkValue::Single(None)) => {}
                (LinkValue::Single(Some(ta)), LinkValue::Single(Some(tb))) => {
                    self.compare_targets(
                        name,
                        NodeAddress::new(a.annotator, *ta),
                        NodeAddress::new(b.annotator, *tb),
                        local,
                        diffs,
                        visited,
                        order,
                    )?;
                }
                (LinkValue::Multi(ta), LinkValue::Multi(tb)) => {
                    if ta.len() != tb.len() {
                        local.push(name.to_string());
                    }
                    // Ordered comparison; traversal continues over the
                    // common prefix even on a length mismatch.
                    for (xa, xb) in ta.iter().zip(tb.iter()) {
                        self.compare_targets(
                            name,
                            NodeAddress::new(a.annotator, *xa),
                            NodeAddress::new(b.annotator, *xb),
                            local,
                            diffs,
                            visited,
                            order,
                        )?;
                    }
                }
                // Null vs non-null, or mismatched link arity.
                _ => local.push(name.to_string()),
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn compare_targets(
        &self,
        name: &str,
        ta: NodeAddress,
        tb: NodeAddress,
        local: &mut Vec<String>,
        diffs: &mut BTreeMap<(NodeAddress, NodeAddress), Vec<String>>,
        visited: &mut HashSet<(NodeAddress, NodeAddress)>,
        order: &mut Vec<(NodeAddress, NodeAddress)>,
    ) -> Result<()> {
        let (Some(nta), Some(ntb)) = (self.node(ta), self.node(tb)) else {
            local.push(name.to_string());
            return Ok(());
        };
        if nta.type_name != ntb.type_name || nta.span != ntb.span {
            local.push(name.to_string());
            return Ok(());
        }
        match self.link_mode {
            LinkCompareMode::TargetIdentity => {
                // Descend; a mismatch anywhere below keeps the full diff
                // map non-empty and thereby marks the top-level pair.
                self.compare_pair(ta, tb, diffs, visited, order)?;
            }
            LinkCompareMode::TargetLabel => {
                let layer = self.schema.layer(&nta.type_name)?;
                if let Some(label) = &layer.label_feature {
                    let va = normalized(nta.features.get(label));
                    let vb = normalized(ntb.features.get(label));
                    if let FeatureValue::Unsupported(range) = va {
                        return Err(Error::unsupported_feature_type(range.clone()));
                    }
                    if let FeatureValue::Unsupported(range) = vb {
                        return Err(Error::unsupported_feature_type(range.clone()));
                    }
                    if va != vb {
                        local.push(name.to_string());
                    }
                }
            }
        }
        Ok(())
    }
}

const NULL_STR: FeatureValue = FeatureValue::Str(None);

/// An absent feature compares like a null string, so null vs null agrees.
fn normalized(value: Option<&FeatureValue>) -> &FeatureValue {
    value.unwrap_or(&NULL_STR)
}
