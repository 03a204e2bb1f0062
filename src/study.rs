//! Projection of diff output into a unit × annotator coding study.
//!
//! A [`CodingStudy`] is the tabular structure agreement measures consume:
//! one row per annotation slot, one column per annotator, each cell the
//! category label the annotator assigned (or `None` when the annotator
//! did not annotate the slot). The study is derived and transient; it is
//! rebuilt from scratch per agreement call.

use crate::diff::DiffResult;
use crate::document::AnnotatorSnapshot;
use crate::error::Result;
use crate::schema::ProjectSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Classification counters over annotation slots ("sets").
///
/// `total = relevant + irrelevant + incomplete`. Relevant sets carry a
/// comparable node from every annotator; incomplete sets miss at least
/// one annotator; irrelevant sets are excluded for another reason
/// (an annotator stacked several nodes on the same slot).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetCounts {
    /// All slots seen.
    pub total: usize,
    /// Complete slots usable for agreement.
    pub relevant: usize,
    /// Slots excluded because an annotator contributed several nodes.
    pub irrelevant: usize,
    /// Slots missing at least one annotator.
    pub incomplete: usize,
    /// Relevant slots where all labels agree.
    pub agreeing: usize,
    /// Relevant slots where labels differ.
    pub differing: usize,
}

/// One unit of the study: a slot and the per-annotator category labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodingItem {
    /// Document the slot came from.
    pub document_id: String,
    /// Type name of the slot.
    pub type_name: String,
    /// `(begin, end)` position, `None` for span-less slots.
    pub position: Option<(u32, u32)>,
    /// Category labels aligned with [`CodingStudy::annotators`]; `None`
    /// where the annotator did not annotate the slot.
    pub labels: Vec<Option<String>>,
}

/// The unit × annotator table consumed by agreement computation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodingStudy {
    /// Fixed annotator ordering (column order).
    pub annotators: Vec<String>,
    /// Study rows, in document-then-slot order.
    pub items: Vec<CodingItem>,
    /// Slot classification counters.
    pub counts: SetCounts,
}

impl CodingStudy {
    /// Distinct category labels across all cells, in sorted order.
    #[must_use]
    pub fn categories(&self) -> Vec<String> {
        let set: BTreeSet<&String> = self
            .items
            .iter()
            .flat_map(|i| i.labels.iter().flatten())
            .collect();
        set.into_iter().cloned().collect()
    }

    /// Fraction of complete items on which all annotators agree.
    ///
    /// Returns `None` when the study has no complete items.
    #[must_use]
    pub fn observed_agreement(&self) -> Option<f64> {
        let complete: Vec<&CodingItem> = self
            .items
            .iter()
            .filter(|i| i.labels.iter().all(Option::is_some))
            .collect();
        if complete.is_empty() {
            return None;
        }
        let agreeing = complete
            .iter()
            .filter(|i| {
                let mut labels = i.labels.iter().flatten();
                let first = labels.next();
                labels.all(|l| Some(l) == first)
            })
            .count();
        Some(agreeing as f64 / complete.len() as f64)
    }

    /// How often each category was assigned, across all annotators.
    #[must_use]
    pub fn category_marginals(&self) -> Vec<(String, usize)> {
        self.categories()
            .into_iter()
            .map(|c| {
                let n = self
                    .items
                    .iter()
                    .flat_map(|i| i.labels.iter().flatten())
                    .filter(|l| **l == c)
                    .count();
                (c, n)
            })
            .collect()
    }
}

/// Builds a [`CodingStudy`] from diff output, one document at a time.
pub struct CodingStudyBuilder<'a> {
    layer: &'a str,
    feature: Option<&'a str>,
    exclude_incomplete: bool,
}

impl<'a> CodingStudyBuilder<'a> {
    /// Create a builder for one target layer and optional feature.
    ///
    /// Validates the layer and feature against the schema up front;
    /// a miss is a fatal [`SchemaMismatch`](crate::Error) for the whole
    /// invocation.
    pub fn new(
        schema: &'a ProjectSchema,
        layer: &'a str,
        feature: Option<&'a str>,
    ) -> Result<Self> {
        let layer_schema = schema.layer(layer)?;
        if let Some(f) = feature {
            layer_schema.feature(f)?;
        }
        Ok(Self {
            layer,
            feature,
            exclude_incomplete: true,
        })
    }

    /// Whether incomplete slots are kept out of the item table
    /// (they are always counted). Defaults to `true`.
    #[must_use]
    pub fn exclude_incomplete(mut self, exclude: bool) -> Self {
        self.exclude_incomplete = exclude;
        self
    }

    /// Target layer this builder projects.
    #[must_use]
    pub fn layer(&self) -> &str {
        self.layer
    }

    /// Start an empty study over the fixed annotator ordering.
    #[must_use]
    pub fn empty_study(&self, annotators: &[String]) -> CodingStudy {
        CodingStudy {
            annotators: annotators.to_vec(),
            items: Vec::new(),
            counts: SetCounts::default(),
        }
    }

    /// Project one document's diff into the study.
    ///
    /// `snapshots` must be the same slice the diff was computed over.
    pub fn add_document(
        &self,
        study: &mut CodingStudy,
        document_id: &str,
        diff: &DiffResult,
        snapshots: &[&AnnotatorSnapshot],
    ) {
        let n = study.annotators.len();
        for option in diff.options_of_type(self.layer) {
            study.counts.total += 1;

            let mut labels: Vec<Option<String>> = vec![None; n];
            let mut stacked = false;
            for &sel_idx in &option.selections {
                for addr in diff.selections[sel_idx].addresses() {
                    let column = addr.annotator as usize;
                    if labels[column].is_some() {
                        stacked = true;
                        continue;
                    }
                    labels[column] = Some(self.category(sel_idx, addr, snapshots));
                }
            }

            if stacked {
                study.counts.irrelevant += 1;
                continue;
            }

            let complete = labels.iter().all(Option::is_some);
            if !complete {
                study.counts.incomplete += 1;
                if self.exclude_incomplete {
                    continue;
                }
            } else {
                study.counts.relevant += 1;
                let mut distinct = labels.iter().flatten();
                let first = distinct.next();
                if distinct.all(|l| Some(l) == first) {
                    study.counts.agreeing += 1;
                } else {
                    study.counts.differing += 1;
                }
            }

            study.items.push(CodingItem {
                document_id: document_id.to_string(),
                type_name: option.type_name.clone(),
                position: option.position,
                labels,
            });
        }
    }

    /// Category label for one node: the target feature's value, or the
    /// selection identity when comparing whole annotations.
    fn category(
        &self,
        sel_idx: usize,
        addr: crate::document::NodeAddress,
        snapshots: &[&AnnotatorSnapshot],
    ) -> String {
        match self.feature {
            Some(feature) => snapshots[addr.annotator as usize]
                .get(addr.node)
                .and_then(|node| node.features.get(feature))
                .map(crate::document::FeatureValue::as_label)
                .unwrap_or_default(),
            None => format!("s{sel_idx}"),
        }
    }
}
