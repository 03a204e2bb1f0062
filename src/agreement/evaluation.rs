//! Evaluation statistics for rule-based or trained predictors.
//!
//! Unlike the kappa family, these measures score a predictor against a
//! labeled corpus over a held-out split rather than comparing humans.
//! The split is a deterministic prefix split (no shuffle): two runs on
//! byte-identical inputs produce identical set sizes and scores.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// One labeled unit of a predictor corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledUnit {
    /// Unit key (e.g. the covered text or a feature vector id).
    pub unit: String,
    /// Gold label.
    pub label: String,
}

impl LabeledUnit {
    /// Create a labeled unit.
    #[must_use]
    pub fn new(unit: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            label: label.into(),
        }
    }
}

/// Precision/recall/accuracy/F1 plus the split sizes that produced them.
///
/// All scores lie in `[0, 1]`; an empty test set yields all-zero scores
/// rather than an error, so learning-curve callers can render the point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Fraction of emitted predictions that were correct.
    pub precision: f64,
    /// Fraction of gold units that received a correct prediction.
    pub recall: f64,
    /// Fraction of gold units predicted correctly (no-prediction counts
    /// as wrong).
    pub accuracy: f64,
    /// Harmonic mean of precision and recall; 0.0 when both are 0.
    pub f1: f64,
    /// Training-set size of the split.
    pub train_size: usize,
    /// Test-set size of the split.
    pub test_size: usize,
    /// Correct predictions.
    pub true_positives: usize,
    /// Incorrect predictions.
    pub false_positives: usize,
    /// Gold units with no correct prediction.
    pub false_negatives: usize,
}

/// Scores a predictor over a deterministic percentage train/test split.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluationMeasure {
    train_fraction: f64,
}

impl EvaluationMeasure {
    /// Create a measure with the given training fraction in `[0, 1]`.
    pub fn new(train_fraction: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&train_fraction) {
            return Err(Error::invalid_input(format!(
                "train fraction {train_fraction} outside [0, 1]"
            )));
        }
        Ok(Self { train_fraction })
    }

    /// Split the corpus into `(train, test)` by percentage.
    ///
    /// The split is a prefix split on the caller-supplied order; a 50/50
    /// fraction over an even corpus yields equal halves (±1 for odd).
    #[must_use]
    pub fn split<'c, T>(&self, corpus: &'c [T]) -> (&'c [T], &'c [T]) {
        let split_at = ((corpus.len() as f64) * self.train_fraction).round() as usize;
        corpus.split_at(split_at.min(corpus.len()))
    }

    /// Split the corpus, apply the predictor to the test half, and score.
    ///
    /// The training half is handed to callers implicitly: the predictor
    /// closure is expected to have been fitted on it beforehand. An empty
    /// corpus scores F1 = 0.0 without error.
    pub fn run<P>(&self, corpus: &[LabeledUnit], predict: P) -> EvaluationResult
    where
        P: Fn(&str) -> Option<String>,
    {
        let (train, test) = self.split(corpus);
        let predictions: Vec<Option<String>> =
            test.iter().map(|u| predict(&u.unit)).collect();
        let mut result = score(test, &predictions);
        result.train_size = train.len();
        result.test_size = test.len();
        result
    }
}

/// Score aligned predictions against gold units.
///
/// `predictions[i]` is the predicted label for `gold[i]`, `None` when the
/// predictor abstained.
pub fn evaluate_predictions(
    gold: &[LabeledUnit],
    predictions: &[Option<String>],
) -> Result<EvaluationResult> {
    if gold.len() != predictions.len() {
        return Err(Error::invalid_input(format!(
            "{} predictions for {} gold units",
            predictions.len(),
            gold.len()
        )));
    }
    let mut result = score(gold, predictions);
    result.test_size = gold.len();
    Ok(result)
}

fn score(gold: &[LabeledUnit], predictions: &[Option<String>]) -> EvaluationResult {
    let mut tp = 0usize;
    let mut fp = 0usize;
    for (unit, prediction) in gold.iter().zip(predictions) {
        match prediction {
            Some(label) if *label == unit.label => tp += 1,
            Some(_) => fp += 1,
            None => {}
        }
    }
    let fn_count = gold.len() - tp;

    let precision = if tp + fp > 0 {
        tp as f64 / (tp + fp) as f64
    } else {
        0.0
    };
    let recall = if gold.is_empty() {
        0.0
    } else {
        tp as f64 / gold.len() as f64
    };
    let accuracy = recall;
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    EvaluationResult {
        precision,
        recall,
        accuracy,
        f1,
        train_size: 0,
        test_size: gold.len(),
        true_positives: tp,
        false_positives: fp,
        false_negatives: fn_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus(n: usize) -> Vec<LabeledUnit> {
        (0..n)
            .map(|i| LabeledUnit::new(format!("u{i}"), if i % 2 == 0 { "x" } else { "y" }))
            .collect()
    }

    #[test]
    fn test_even_fifty_fifty_split() {
        let measure = EvaluationMeasure::new(0.5).unwrap();
        let units = corpus(10);
        let (train, test) = measure.split(&units);
        assert_eq!(train.len(), 5);
        assert_eq!(test.len(), 5);
    }

    #[test]
    fn test_odd_split_differs_by_at_most_one() {
        let measure = EvaluationMeasure::new(0.5).unwrap();
        let units = corpus(11);
        let (train, test) = measure.split(&units);
        assert!((train.len() as i64 - test.len() as i64).abs() <= 1);
        assert_eq!(train.len() + test.len(), 11);
    }

    #[test]
    fn test_empty_corpus_scores_zero_without_error() {
        let measure = EvaluationMeasure::new(0.5).unwrap();
        let result = measure.run(&[], |_| Some("x".into()));
        assert_eq!(result.f1, 0.0);
        assert_eq!(result.train_size, 0);
        assert_eq!(result.test_size, 0);
    }

    #[test]
    fn test_perfect_predictor() {
        let measure = EvaluationMeasure::new(0.5).unwrap();
        let data = corpus(10);
        let result = measure.run(&data, |unit| {
            let i: usize = unit[1..].parse().unwrap();
            Some(if i % 2 == 0 { "x".into() } else { "y".into() })
        });
        assert!((result.precision - 1.0).abs() < 1e-9);
        assert!((result.recall - 1.0).abs() < 1e-9);
        assert!((result.f1 - 1.0).abs() < 1e-9);
        assert_eq!(result.train_size, 5);
        assert_eq!(result.test_size, 5);
    }

    #[test]
    fn test_f1_identity_holds() {
        let gold = corpus(8);
        let predictions: Vec<Option<String>> = gold
            .iter()
            .enumerate()
            .map(|(i, _)| if i < 2 { Some("x".to_string()) } else { None })
            .collect();
        let result = evaluate_predictions(&gold, &predictions).unwrap();
        let (p, r) = (result.precision, result.recall);
        if p + r > 0.0 {
            assert!((result.f1 - 2.0 * p * r / (p + r)).abs() < 1e-9);
        }
        assert!((0.0..=1.0).contains(&result.precision));
        assert!((0.0..=1.0).contains(&result.recall));
        assert!((0.0..=1.0).contains(&result.accuracy));
        assert!((0.0..=1.0).contains(&result.f1));
    }

    #[test]
    fn test_misaligned_predictions_rejected() {
        let gold = corpus(3);
        assert!(evaluate_predictions(&gold, &[None]).is_err());
    }

    #[test]
    fn test_invalid_fraction_rejected() {
        assert!(EvaluationMeasure::new(1.5).is_err());
        assert!(EvaluationMeasure::new(-0.1).is_err());
    }

    #[test]
    fn test_split_is_deterministic() {
        let measure = EvaluationMeasure::new(0.7).unwrap();
        let data = corpus(23);
        let (t1, v1) = measure.split(&data);
        let (t2, v2) = measure.split(&data);
        assert_eq!(t1, t2);
        assert_eq!(v1, v2);
    }
}
