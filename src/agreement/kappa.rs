//! Chance-corrected inter-rater agreement statistics.
//!
//! Both measures return NaN (an explicit "undefined", not an error) when
//! the study carries no usable signal, so callers can distinguish "no
//! data" from "zero agreement" via the study's diagnostic counters.

use crate::study::CodingStudy;
use std::collections::BTreeMap;

const EPSILON: f64 = 1e-9;

/// Fleiss' kappa over N ≥ 2 annotators.
///
/// Operates on complete items only (every annotator labeled the slot).
/// Returns 1.0 for full agreement, NaN when there are no complete items
/// or fewer than two annotators.
#[must_use]
pub fn fleiss_kappa(study: &CodingStudy) -> f64 {
    let raters = study.annotators.len();
    if raters < 2 {
        return f64::NAN;
    }
    let complete: Vec<&Vec<Option<String>>> = study
        .items
        .iter()
        .map(|i| &i.labels)
        .filter(|labels| labels.iter().all(Option::is_some))
        .collect();
    if complete.is_empty() {
        return f64::NAN;
    }

    let mut category_index: BTreeMap<&str, usize> = BTreeMap::new();
    for labels in &complete {
        for label in labels.iter().flatten() {
            let next = category_index.len();
            category_index.entry(label.as_str()).or_insert(next);
        }
    }
    let k = category_index.len();
    let n = raters as f64;

    // Per-item observed agreement and pooled category proportions.
    let mut p_observed = 0.0;
    let mut category_totals = vec![0.0f64; k];
    for labels in &complete {
        let mut counts = vec![0usize; k];
        for label in labels.iter().flatten() {
            counts[category_index[label.as_str()]] += 1;
        }
        let sum_sq: f64 = counts.iter().map(|&c| (c * c) as f64).sum();
        p_observed += (sum_sq - n) / (n * (n - 1.0));
        for (j, &c) in counts.iter().enumerate() {
            category_totals[j] += c as f64;
        }
    }
    let items = complete.len() as f64;
    let p_bar = p_observed / items;
    let p_expected: f64 = category_totals
        .iter()
        .map(|t| (t / (items * n)).powi(2))
        .sum();

    chance_corrected(p_bar, p_expected)
}

/// One pairwise score with its item counts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairScore {
    /// Kappa for this pair; NaN when undefined.
    pub score: f64,
    /// Items where both annotators labeled the slot.
    pub items: usize,
    /// Items where exactly one of the two did.
    pub incomplete: usize,
}

/// Cohen's kappa between two annotators (by column index).
///
/// Uses every item where both annotators labeled the slot; items where
/// only one did count as incomplete for the pair.
#[must_use]
pub fn cohen_kappa(study: &CodingStudy, a: usize, b: usize) -> PairScore {
    let mut both = Vec::new();
    let mut incomplete = 0usize;
    for item in &study.items {
        match (item.labels.get(a), item.labels.get(b)) {
            (Some(Some(la)), Some(Some(lb))) => both.push((la, lb)),
            (Some(Some(_)), Some(None)) | (Some(None), Some(Some(_))) => incomplete += 1,
            _ => {}
        }
    }
    if both.is_empty() {
        return PairScore {
            score: f64::NAN,
            items: 0,
            incomplete,
        };
    }

    let items = both.len() as f64;
    let observed = both.iter().filter(|(la, lb)| la == lb).count() as f64 / items;

    let mut marginals_a: BTreeMap<&str, f64> = BTreeMap::new();
    let mut marginals_b: BTreeMap<&str, f64> = BTreeMap::new();
    for (la, lb) in &both {
        *marginals_a.entry(la.as_str()).or_default() += 1.0;
        *marginals_b.entry(lb.as_str()).or_default() += 1.0;
    }
    let expected: f64 = marginals_a
        .iter()
        .map(|(cat, na)| {
            let nb = marginals_b.get(cat).copied().unwrap_or(0.0);
            (na / items) * (nb / items)
        })
        .sum();

    PairScore {
        score: chance_corrected(observed, expected),
        items: both.len(),
        incomplete,
    }
}

/// `(po - pe) / (1 - pe)`, resolving the degenerate `pe = 1` case to the
/// metric's maximum on full observed agreement and NaN otherwise.
fn chance_corrected(observed: f64, expected: f64) -> f64 {
    if (1.0 - expected).abs() < EPSILON {
        if (observed - 1.0).abs() < EPSILON {
            1.0
        } else {
            f64::NAN
        }
    } else {
        (observed - expected) / (1.0 - expected)
    }
}
