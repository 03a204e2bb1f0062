//! Agreement measures and whole-study computation.
//!
//! [`AgreementMeasure`] is a tagged-variant abstraction over the
//! interchangeable statistics: pairwise coding measures (Cohen's kappa),
//! multi-rater measures (Fleiss' kappa), and evaluation statistics for
//! predictors ([`evaluation`]). Measures are produced by an explicit,
//! constructor-injected [`MeasureRegistry`]; no runtime reflection is
//! involved.
//!
//! `get_agreement` is a pure, deterministic function of its inputs: it
//! diffs each document, projects the diffs into one aggregated
//! [`CodingStudy`](crate::study::CodingStudy), and scores it. A failing
//! document (e.g. an unsupported feature type) is reported per document
//! and skipped, so one bad document never costs the rest of the study.

pub mod evaluation;
pub mod kappa;

pub use evaluation::{evaluate_predictions, EvaluationMeasure, EvaluationResult, LabeledUnit};
pub use kappa::{cohen_kappa, fleiss_kappa, PairScore};

use crate::diff::{DiffEngine, DiffResult};
use crate::document::{AnnotatorSnapshot, SourceDocument};
use crate::error::{Error, Result};
use crate::report::{DocumentDiff, PairwiseScore, SkippedDocument, StatisticsReport};
use crate::schema::{LinkCompareMode, ProjectSchema};
use crate::study::{CodingStudy, CodingStudyBuilder};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Traits steering how a coding measure interprets the diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodingTraits {
    /// How link targets are compared.
    pub link_compare_mode: LinkCompareMode,
    /// Whether slots missing an annotator are excluded from the study
    /// (they are always counted as incomplete).
    pub exclude_incomplete: bool,
    /// Whether snapshots not marked finished are treated as absent.
    pub exclude_unfinished: bool,
}

impl Default for CodingTraits {
    fn default() -> Self {
        Self {
            link_compare_mode: LinkCompareMode::TargetIdentity,
            exclude_incomplete: true,
            exclude_unfinished: false,
        }
    }
}

/// One document with its per-annotator snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentGroup {
    /// Shared document identity.
    pub document: SourceDocument,
    /// Snapshots by annotator name. Annotators absent from a document
    /// contribute nothing to its slots (incomplete sets).
    pub snapshots: BTreeMap<String, AnnotatorSnapshot>,
}

/// A tagged-variant inter-annotator agreement measure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AgreementMeasure {
    /// Pairwise Cohen's-kappa-style measure; the overall score is the
    /// mean of the defined pairwise scores.
    CohenKappa {
        /// Target layer.
        layer: String,
        /// Target feature; `None` compares whole annotations.
        feature: Option<String>,
        /// Coding traits.
        traits: CodingTraits,
    },
    /// Multi-rater Fleiss'-kappa-style measure over N ≥ 2 annotators.
    FleissKappa {
        /// Target layer.
        layer: String,
        /// Target feature; `None` compares whole annotations.
        feature: Option<String>,
        /// Coding traits.
        traits: CodingTraits,
    },
}

impl AgreementMeasure {
    /// Whether the measure handles more than two annotators at once.
    #[must_use]
    pub fn supports_more_than_two_raters(&self) -> bool {
        match self {
            AgreementMeasure::CohenKappa { .. } => false,
            AgreementMeasure::FleissKappa { .. } => true,
        }
    }

    /// Stable identifier of the measure variant.
    #[must_use]
    pub fn id(&self) -> &'static str {
        match self {
            AgreementMeasure::CohenKappa { .. } => "cohen-kappa",
            AgreementMeasure::FleissKappa { .. } => "fleiss-kappa",
        }
    }

    fn parts(&self) -> (&str, Option<&str>, &CodingTraits) {
        match self {
            AgreementMeasure::CohenKappa {
                layer,
                feature,
                traits,
            }
            | AgreementMeasure::FleissKappa {
                layer,
                feature,
                traits,
            } => (layer, feature.as_deref(), traits),
        }
    }

    /// Compute agreement over the whole set of documents, sequentially.
    pub fn get_agreement(
        &self,
        schema: &ProjectSchema,
        groups: &[DocumentGroup],
    ) -> Result<StatisticsReport> {
        self.get_agreement_in_window(schema, groups, None)
    }

    /// Compute agreement restricted to a `[begin, end)` window.
    pub fn get_agreement_in_window(
        &self,
        schema: &ProjectSchema,
        groups: &[DocumentGroup],
        window: Option<(u32, u32)>,
    ) -> Result<StatisticsReport> {
        let ctx = self.context(schema, groups)?;
        let outcomes: Vec<_> = groups
            .iter()
            .map(|g| ctx.process_document(g, window))
            .collect();
        self.assemble(&ctx, outcomes)
    }

    /// Like [`get_agreement`](Self::get_agreement) but fanning documents
    /// out across threads. The per-document engine stays single-threaded
    /// and side-effect-free, so the result is identical to the
    /// sequential one.
    pub fn get_agreement_parallel(
        &self,
        schema: &ProjectSchema,
        groups: &[DocumentGroup],
    ) -> Result<StatisticsReport> {
        let ctx = self.context(schema, groups)?;
        let outcomes: Vec<_> = groups
            .par_iter()
            .map(|g| ctx.process_document(g, None))
            .collect();
        self.assemble(&ctx, outcomes)
    }

    fn context<'c>(
        &'c self,
        schema: &'c ProjectSchema,
        groups: &[DocumentGroup],
    ) -> Result<StudyContext<'c>> {
        let (layer, feature, traits) = self.parts();
        // Validate layer/feature up front: a schema miss is fatal for the
        // whole invocation, before any document work starts.
        let builder =
            CodingStudyBuilder::new(schema, layer, feature)?.exclude_incomplete(traits.exclude_incomplete);

        // Fixed annotator ordering: the sorted union of names across all
        // groups, so map iteration order never shows in results.
        let annotators: Vec<String> = groups
            .iter()
            .flat_map(|g| g.snapshots.keys().cloned())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if annotators.len() < 2 {
            log::debug!("agreement over {} annotator(s): score will be undefined", annotators.len());
        }

        Ok(StudyContext {
            schema,
            builder,
            annotators,
            traits: *traits,
        })
    }

    fn assemble(
        &self,
        ctx: &StudyContext<'_>,
        outcomes: Vec<std::result::Result<DocumentOutcome, (String, String)>>,
    ) -> Result<StatisticsReport> {
        let (layer, feature, _) = self.parts();
        let mut study = ctx.builder.empty_study(&ctx.annotators);
        let mut diffs = Vec::new();
        let mut skipped = Vec::new();
        let mut documents = 0usize;

        for outcome in outcomes {
            match outcome {
                Ok(out) => {
                    let snapshot_refs: Vec<&AnnotatorSnapshot> = out.snapshots.iter().collect();
                    ctx.builder.add_document(
                        &mut study,
                        &out.document_id,
                        &out.diff,
                        &snapshot_refs,
                    );
                    documents += 1;
                    diffs.push(DocumentDiff {
                        document_id: out.document_id,
                        diff: out.diff,
                    });
                }
                Err((document_id, reason)) => {
                    log::warn!("skipping document '{document_id}': {reason}");
                    skipped.push(SkippedDocument {
                        document_id,
                        reason,
                    });
                }
            }
        }

        let pairwise = pairwise_scores(&study);
        let score = match self {
            AgreementMeasure::FleissKappa { .. } => fleiss_kappa(&study),
            AgreementMeasure::CohenKappa { .. } => {
                let defined: Vec<f64> = pairwise
                    .iter()
                    .map(|p| p.score)
                    .filter(|s| !s.is_nan())
                    .collect();
                if defined.is_empty() {
                    f64::NAN
                } else {
                    defined.iter().sum::<f64>() / defined.len() as f64
                }
            }
        };

        Ok(StatisticsReport {
            measure: self.id().to_string(),
            layer: layer.to_string(),
            feature: feature.map(String::from),
            score,
            counts: study.counts,
            pairwise,
            documents,
            skipped,
            study,
            diffs,
        })
    }
}

struct StudyContext<'c> {
    schema: &'c ProjectSchema,
    builder: CodingStudyBuilder<'c>,
    annotators: Vec<String>,
    traits: CodingTraits,
}

struct DocumentOutcome {
    document_id: String,
    diff: DiffResult,
    /// Snapshots aligned with the fixed annotator order (absent or
    /// excluded annotators hold an empty snapshot).
    snapshots: Vec<AnnotatorSnapshot>,
}

impl StudyContext<'_> {
    fn process_document(
        &self,
        group: &DocumentGroup,
        window: Option<(u32, u32)>,
    ) -> std::result::Result<DocumentOutcome, (String, String)> {
        let snapshots: Vec<AnnotatorSnapshot> = self
            .annotators
            .iter()
            .map(|name| match group.snapshots.get(name) {
                Some(s) if !self.traits.exclude_unfinished || s.finished => s.clone(),
                _ => AnnotatorSnapshot::new(),
            })
            .collect();
        let snapshot_refs: Vec<&AnnotatorSnapshot> = snapshots.iter().collect();

        let engine = DiffEngine::new(self.schema, self.traits.link_compare_mode);
        let diff = engine
            .diff(&self.annotators, &snapshot_refs, &[self.builder.layer()], window)
            .map_err(|e| (group.document.id.clone(), e.to_string()))?;

        Ok(DocumentOutcome {
            document_id: group.document.id.clone(),
            diff,
            snapshots,
        })
    }
}

/// Cohen's kappa for every unordered annotator pair.
fn pairwise_scores(study: &CodingStudy) -> Vec<PairwiseScore> {
    let n = study.annotators.len();
    let mut scores = Vec::new();
    for a in 0..n {
        for b in (a + 1)..n {
            let pair = cohen_kappa(study, a, b);
            scores.push(PairwiseScore {
                a: study.annotators[a].clone(),
                b: study.annotators[b].clone(),
                score: pair.score,
                items: pair.items,
                incomplete: pair.incomplete,
            });
        }
    }
    scores
}

/// Constructor-injected factory for agreement measures.
///
/// Replaces the platform's reflection-based tool lookup with an explicit
/// registry: measure builders are plain functions registered by id.
pub struct MeasureRegistry {
    builders: BTreeMap<String, MeasureBuilder>,
}

/// Builds a measure from a layer, optional feature, and traits.
pub type MeasureBuilder = fn(&str, Option<&str>, CodingTraits) -> AgreementMeasure;

impl MeasureRegistry {
    /// Registry with the built-in measures registered.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            builders: BTreeMap::new(),
        };
        registry.register("cohen-kappa", |layer, feature, traits| {
            AgreementMeasure::CohenKappa {
                layer: layer.to_string(),
                feature: feature.map(String::from),
                traits,
            }
        });
        registry.register("fleiss-kappa", |layer, feature, traits| {
            AgreementMeasure::FleissKappa {
                layer: layer.to_string(),
                feature: feature.map(String::from),
                traits,
            }
        });
        registry
    }

    /// Register (or replace) a measure builder under an id.
    pub fn register(&mut self, id: impl Into<String>, builder: MeasureBuilder) {
        self.builders.insert(id.into(), builder);
    }

    /// Registered measure ids, sorted.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.builders.keys().map(String::as_str)
    }

    /// Create a measure by id.
    pub fn create(
        &self,
        id: &str,
        layer: &str,
        feature: Option<&str>,
        traits: CodingTraits,
    ) -> Result<AgreementMeasure> {
        let builder = self
            .builders
            .get(id)
            .ok_or_else(|| Error::invalid_input(format!("unknown agreement measure '{id}'")))?;
        Ok(builder(layer, feature, traits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::AnnotationNode;
    use crate::schema::{FeatureRange, FeatureSchema, LayerSchema};

    fn schema() -> ProjectSchema {
        ProjectSchema::new().with_layer(
            LayerSchema::new("Span")
                .with_feature(FeatureSchema::new("value", FeatureRange::Str))
                .with_label_feature("value"),
        )
    }

    fn span(id: u32, b: u32, e: u32, value: &str) -> AnnotationNode {
        AnnotationNode::new(id, "Span", Some((b, e))).with_str("value", Some(value))
    }

    fn group(id: &str, snapshots: Vec<(&str, AnnotatorSnapshot)>) -> DocumentGroup {
        DocumentGroup {
            document: SourceDocument::new(id, 100),
            snapshots: snapshots
                .into_iter()
                .map(|(n, s)| (n.to_string(), s))
                .collect(),
        }
    }

    fn fleiss() -> AgreementMeasure {
        AgreementMeasure::FleissKappa {
            layer: "Span".into(),
            feature: Some("value".into()),
            traits: CodingTraits::default(),
        }
    }

    #[test]
    fn test_empty_documents_undefined_score() {
        let s = schema();
        let groups = vec![group(
            "doc1",
            vec![("anna", AnnotatorSnapshot::new()), ("bob", AnnotatorSnapshot::new())],
        )];
        let report = fleiss().get_agreement(&s, &groups).unwrap();
        assert!(!report.is_defined());
        assert_eq!(report.diff_size(), 0);
        assert_eq!(report.counts.incomplete, 0);
    }

    #[test]
    fn test_reference_example_score() {
        let s = schema();
        let a = AnnotatorSnapshot::new()
            .with(span(1, 0, 1, ""))
            .with(span(2, 1, 2, ""))
            .with(span(3, 3, 4, "A"));
        let b = AnnotatorSnapshot::new()
            .with(span(1, 0, 1, ""))
            .with(span(2, 2, 3, ""))
            .with(span(3, 3, 4, "B"));
        let groups = vec![group("doc1", vec![("anna", a), ("bob", b)])];

        let report = fleiss().get_agreement(&s, &groups).unwrap();
        assert_eq!(report.counts.total, 4);
        assert_eq!(report.counts.incomplete, 2);
        assert_eq!(report.counts.differing, 1);
        assert!((report.score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_full_agreement_is_maximum() {
        let s = schema();
        let a = AnnotatorSnapshot::new()
            .with(span(1, 0, 4, "PER"))
            .with(span(2, 5, 9, "ORG"));
        let groups = vec![group("doc1", vec![("anna", a.clone()), ("bob", a)])];

        let report = fleiss().get_agreement(&s, &groups).unwrap();
        assert!((report.score - 1.0).abs() < 1e-9);
        for diff in &report.diffs {
            for option in &diff.diff.options {
                assert_eq!(option.selections.len(), 1);
            }
        }
    }

    #[test]
    fn test_cohen_mean_and_pairwise_matrix() {
        let s = schema();
        let a = AnnotatorSnapshot::new()
            .with(span(1, 0, 1, "x"))
            .with(span(2, 2, 3, "y"));
        let groups = vec![group(
            "doc1",
            vec![("anna", a.clone()), ("bob", a.clone()), ("carl", a)],
        )];
        let measure = AgreementMeasure::CohenKappa {
            layer: "Span".into(),
            feature: Some("value".into()),
            traits: CodingTraits::default(),
        };

        let report = measure.get_agreement(&s, &groups).unwrap();
        assert_eq!(report.pairwise.len(), 3);
        assert!((report.score - 1.0).abs() < 1e-9);
        assert!(report.pair("bob", "anna").is_some());
        assert!(!measure.supports_more_than_two_raters());
    }

    #[test]
    fn test_bad_document_skipped_others_survive() {
        let s = schema();
        let good = AnnotatorSnapshot::new().with(span(1, 0, 4, "PER"));
        let bad = AnnotatorSnapshot::new().with(
            AnnotationNode::new(1, "Span", Some((0, 4))).with_feature(
                "value",
                crate::document::FeatureValue::Unsupported("FSArray".into()),
            ),
        );
        let groups = vec![
            group("doc-bad", vec![("anna", bad), ("bob", AnnotatorSnapshot::new())]),
            group("doc-good", vec![("anna", good.clone()), ("bob", good)]),
        ];

        let report = fleiss().get_agreement(&s, &groups).unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].document_id, "doc-bad");
        assert!((report.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unfinished_documents_excluded_by_trait() {
        let s = schema();
        let a = AnnotatorSnapshot::new().with(span(1, 0, 4, "PER"));
        let b = AnnotatorSnapshot::new().with(span(1, 0, 4, "PER")).unfinished();
        let groups = vec![group("doc1", vec![("anna", a), ("bob", b)])];

        let mut traits = CodingTraits::default();
        traits.exclude_unfinished = true;
        let measure = AgreementMeasure::FleissKappa {
            layer: "Span".into(),
            feature: Some("value".into()),
            traits,
        };
        let report = measure.get_agreement(&s, &groups).unwrap();
        assert_eq!(report.counts.incomplete, 1);
        assert!(!report.is_defined());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let s = schema();
        let mut groups = Vec::new();
        for d in 0..6u32 {
            let a = AnnotatorSnapshot::new()
                .with(span(1, d, d + 1, "x"))
                .with(span(2, d + 10, d + 11, "y"));
            let b = AnnotatorSnapshot::new()
                .with(span(1, d, d + 1, "x"))
                .with(span(2, d + 10, d + 11, "z"));
            groups.push(group(&format!("doc{d}"), vec![("anna", a), ("bob", b)]));
        }
        let measure = fleiss();
        let sequential = measure.get_agreement(&s, &groups).unwrap();
        let parallel = measure.get_agreement_parallel(&s, &groups).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_missing_layer_fatal() {
        let s = schema();
        let measure = AgreementMeasure::FleissKappa {
            layer: "Nope".into(),
            feature: None,
            traits: CodingTraits::default(),
        };
        assert!(matches!(
            measure.get_agreement(&s, &[]),
            Err(Error::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_registry_creates_measures() {
        let registry = MeasureRegistry::with_defaults();
        let ids: Vec<_> = registry.ids().collect();
        assert_eq!(ids, vec!["cohen-kappa", "fleiss-kappa"]);

        let m = registry
            .create("fleiss-kappa", "Span", Some("value"), CodingTraits::default())
            .unwrap();
        assert!(m.supports_more_than_two_raters());
        assert!(registry
            .create("krippendorff", "Span", None, CodingTraits::default())
            .is_err());
    }
}
