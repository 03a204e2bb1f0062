//! # annodiff
//!
//! Annotation diffing and inter-annotator agreement for Rust.
//!
//! - **Diff**: recursive structural comparison of annotations across
//!   annotators, clustered into selections and options per slot
//! - **Agreement**: Fleiss' and Cohen's kappa with diagnostic set counts
//! - **Evaluation**: precision/recall/F1/accuracy over deterministic
//!   train/test splits
//!
//! ## Quick Start
//!
//! ```rust
//! use annodiff::prelude::*;
//!
//! let schema = ProjectSchema::new().with_layer(
//!     LayerSchema::new("Span")
//!         .with_feature(FeatureSchema::new("value", FeatureRange::Str))
//!         .with_label_feature("value"),
//! );
//!
//! let anna = AnnotatorSnapshot::new()
//!     .with(AnnotationNode::new(1, "Span", Some((0, 4))).with_str("value", Some("PER")));
//! let bob = anna.clone();
//!
//! let measure = AgreementMeasure::FleissKappa {
//!     layer: "Span".into(),
//!     feature: Some("value".into()),
//!     traits: CodingTraits::default(),
//! };
//! let groups = vec![DocumentGroup {
//!     document: SourceDocument::new("doc1", 10),
//!     snapshots: [("anna".to_string(), anna), ("bob".to_string(), bob)]
//!         .into_iter()
//!         .collect(),
//! }];
//! let report = measure.get_agreement(&schema, &groups).unwrap();
//! assert!((report.score - 1.0).abs() < 1e-9);
//! ```
//!
//! ## Design
//!
//! - **Derived, never persisted**: every diff and study is rebuilt from
//!   scratch per invocation; there is no incremental state to corrupt
//! - **Deterministic**: fixed annotator ordering, ordered containers, and
//!   a no-shuffle train/test split make identical inputs give identical
//!   results
//! - **NaN is "undefined", not an error**: degenerate studies score NaN
//!   and carry diagnostic [`SetCounts`](study::SetCounts) so callers can
//!   explain *why*
//! - **One bad document never costs the study**: per-document failures
//!   are reported and skipped; schema misses abort up front

#![warn(missing_docs)]

pub mod agreement;
pub mod diff;
pub mod document;
mod error;
pub mod report;
pub mod schema;
pub mod study;

pub use agreement::{
    cohen_kappa, fleiss_kappa, AgreementMeasure, CodingTraits, DocumentGroup, MeasureRegistry,
};
pub use diff::{AnnotationOption, AnnotationSelection, DiffEngine, DiffResult};
pub use document::{AnnotationNode, AnnotatorSnapshot, NodeAddress, NodeId, SourceDocument};
pub use error::{Error, Result};
pub use report::StatisticsReport;
pub use schema::{FeatureRange, FeatureSchema, LayerSchema, LinkCompareMode, ProjectSchema};
pub use study::{CodingStudy, CodingStudyBuilder, SetCounts};

/// Convenience re-exports for the common workflow.
pub mod prelude {
    pub use crate::agreement::evaluation::{
        evaluate_predictions, EvaluationMeasure, EvaluationResult, LabeledUnit,
    };
    pub use crate::agreement::{
        cohen_kappa, fleiss_kappa, AgreementMeasure, CodingTraits, DocumentGroup,
        MeasureRegistry,
    };
    pub use crate::diff::{DiffEngine, DiffResult};
    pub use crate::document::{
        AnnotationNode, AnnotatorSnapshot, FeatureValue, LinkValue, NodeAddress, SourceDocument,
    };
    pub use crate::error::{Error, Result};
    pub use crate::report::StatisticsReport;
    pub use crate::schema::{
        FeatureRange, FeatureSchema, LayerSchema, LinkCompareMode, ProjectSchema,
    };
    pub use crate::study::{CodingStudy, CodingStudyBuilder, SetCounts};
}
