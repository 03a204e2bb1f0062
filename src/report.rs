//! Read-only result objects handed to the reporting/UI layer.
//!
//! A [`StatisticsReport`] bundles the scalar score, per-pair breakdowns,
//! set counters, and the raw diff structures for drill-down display.
//! Nothing here is persisted by the engine; rendering an undefined (NaN)
//! score as "not enough data" is the UI collaborator's responsibility.

use crate::diff::DiffResult;
use crate::study::{CodingStudy, SetCounts};
use serde::{Deserialize, Serialize};

/// Score for one unordered annotator pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseScore {
    /// First annotator name.
    pub a: String,
    /// Second annotator name.
    pub b: String,
    /// Pairwise kappa; NaN when undefined for this pair.
    pub score: f64,
    /// Items both annotators labeled.
    pub items: usize,
    /// Items only one of the two labeled.
    pub incomplete: usize,
}

/// A document that was skipped because its diff failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDocument {
    /// Document identifier.
    pub document_id: String,
    /// Failure description.
    pub reason: String,
}

/// One document's raw diff, kept for drill-down rendering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDiff {
    /// Document identifier.
    pub document_id: String,
    /// The diff structures for this document.
    pub diff: DiffResult,
}

/// Result of one whole-study agreement computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsReport {
    /// Identifier of the measure that produced the score.
    pub measure: String,
    /// Target layer.
    pub layer: String,
    /// Target feature, `None` for whole-annotation comparison.
    pub feature: Option<String>,
    /// Overall score; NaN when undefined (insufficient data).
    pub score: f64,
    /// Slot classification counters across all scored documents.
    pub counts: SetCounts,
    /// Per-pair scores (always computed, also for multi-rater measures).
    pub pairwise: Vec<PairwiseScore>,
    /// Documents that contributed to the score.
    pub documents: usize,
    /// Documents skipped due to per-document failures.
    pub skipped: Vec<SkippedDocument>,
    /// The aggregated coding study, for distribution rendering.
    pub study: CodingStudy,
    /// Per-document diff structures, for drill-down.
    pub diffs: Vec<DocumentDiff>,
}

impl StatisticsReport {
    /// Whether the overall score is defined.
    #[must_use]
    pub fn is_defined(&self) -> bool {
        !self.score.is_nan()
    }

    /// Total number of annotation slots across all document diffs.
    #[must_use]
    pub fn diff_size(&self) -> usize {
        self.diffs.iter().map(|d| d.diff.size()).sum()
    }

    /// Pairwise score for two annotators by name, order-insensitive.
    #[must_use]
    pub fn pair(&self, a: &str, b: &str) -> Option<&PairwiseScore> {
        self.pairwise
            .iter()
            .find(|p| (p.a == a && p.b == b) || (p.a == b && p.b == a))
    }
}
