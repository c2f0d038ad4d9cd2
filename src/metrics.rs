// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Evaluation metrics for inferred atoms
//!
//! Each evaluator scores a prediction frame against the truth, observed and
//! target frames of a dataset. Only target atoms are scored:
//! - Categorical: accuracy of the argmax category per entity
//! - Discrete: F1 of the positive class, thresholded at 0.5
//! - Continuous: mean squared error
//! - Ranking: AUC-ROC

use crate::frames::Frame;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Values at or above this are the positive class
pub const POSITIVE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvaluationError {
    #[error("no target atoms have a truth value")]
    NoTargets,

    #[error("AUC-ROC is undefined when the truth has a single class")]
    SingleClass,

    #[error("categorical evaluation needs an entity and a category argument, found arity {0}")]
    CategoricalArity(usize),
}

/// Evaluator named by the directory the runs were tuned for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Evaluator {
    Categorical,
    Discrete,
    Continuous,
    Ranking,
}

impl Evaluator {
    pub const ALL: [Evaluator; 4] = [
        Evaluator::Categorical,
        Evaluator::Discrete,
        Evaluator::Continuous,
        Evaluator::Ranking,
    ];

    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Evaluator::Categorical => "Categorical",
            Evaluator::Discrete => "Discrete",
            Evaluator::Continuous => "Continuous",
            Evaluator::Ranking => "Ranking",
        }
    }

    /// Name of the metric the evaluator reports
    pub fn metric_name(&self) -> &'static str {
        match self {
            Evaluator::Categorical => "Accuracy",
            Evaluator::Discrete => "F1",
            Evaluator::Continuous => "MSE",
            Evaluator::Ranking => "AUC-ROC",
        }
    }

    pub fn evaluate(
        &self,
        predicted: &Frame,
        truth: &Frame,
        observed: &Frame,
        target: &Frame,
    ) -> Result<f64, EvaluationError> {
        match self {
            Evaluator::Categorical => evaluate_accuracy(predicted, truth, observed, target),
            Evaluator::Discrete => evaluate_f1(predicted, truth, observed, target),
            Evaluator::Continuous => evaluate_mse(predicted, truth, observed, target),
            Evaluator::Ranking => evaluate_roc_auc_score(predicted, truth, observed, target),
        }
    }
}

impl fmt::Display for Evaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Confusion matrix for binary outcomes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    /// Create from predicted and true outcomes (`true` = positive)
    pub fn from_outcomes(predictions: &[bool], ground_truth: &[bool]) -> Self {
        assert_eq!(predictions.len(), ground_truth.len(), "Prediction and ground truth lengths must match");

        let mut matrix = Self::default();

        for (pred, truth) in predictions.iter().zip(ground_truth.iter()) {
            match (pred, truth) {
                (true, true) => matrix.tp += 1,
                (false, false) => matrix.tn += 1,
                (true, false) => matrix.fp += 1,
                (false, true) => matrix.fn_ += 1,
            }
        }

        matrix
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.fn_
    }

    /// Accuracy: (TP + TN) / Total
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.tp + self.tn) as f64 / total as f64
    }

    /// Precision: TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        let denom = self.tp + self.fp;
        if denom == 0 {
            return 0.0;
        }
        self.tp as f64 / denom as f64
    }

    /// Recall: TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        let denom = self.tp + self.fn_;
        if denom == 0 {
            return 0.0;
        }
        self.tp as f64 / denom as f64
    }

    /// F1 Score: 2 * (Precision * Recall) / (Precision + Recall)
    pub fn f1_score(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        let denom = precision + recall;
        if denom == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / denom
    }
}

/// (prediction, truth) for every target atom that has a truth value.
/// Targets without a prediction are scored as 0.
fn target_pairs(predicted: &Frame, truth: &Frame, target: &Frame) -> Result<Vec<(f64, f64)>, EvaluationError> {
    let mut pairs = Vec::with_capacity(target.len());
    let mut unlabeled = 0;

    for args in target.keys() {
        match truth.get(args) {
            Some(truth_value) => pairs.push((predicted.get(args).unwrap_or(0.0), truth_value)),
            None => unlabeled += 1,
        }
    }

    if unlabeled > 0 {
        tracing::debug!("{} target atoms have no truth value and were skipped", unlabeled);
    }
    if pairs.is_empty() {
        return Err(EvaluationError::NoTargets);
    }

    Ok(pairs)
}

fn is_positive(value: f64) -> bool {
    value >= POSITIVE_THRESHOLD
}

/// Atoms grouped by entity (first argument), then by category (remaining arguments)
type Categories = BTreeMap<i64, BTreeMap<Vec<i64>, f64>>;

fn add_categories<'a>(categories: &mut Categories, atoms: impl IntoIterator<Item = (&'a Vec<i64>, f64)>) {
    for (args, value) in atoms {
        if let Some((entity, category)) = args.split_first() {
            categories.entry(*entity).or_default().insert(category.to_vec(), value);
        }
    }
}

/// Highest-valued category; ties go to the smallest category key
fn argmax(categories: &BTreeMap<Vec<i64>, f64>) -> Option<&Vec<i64>> {
    let mut best: Option<(&Vec<i64>, f64)> = None;
    for (category, value) in categories {
        match best {
            Some((_, best_value)) if *value <= best_value => {}
            _ => best = Some((category, *value)),
        }
    }
    best.map(|(category, _)| category)
}

/// Categorical accuracy.
///
/// Argument 0 names an entity and the remaining arguments its category. For
/// every entity with a target atom the predicted category is the argmax over
/// observed and predicted atoms, the true category the argmax over observed and
/// truth atoms.
pub fn evaluate_accuracy(
    predicted: &Frame,
    truth: &Frame,
    observed: &Frame,
    target: &Frame,
) -> Result<f64, EvaluationError> {
    if target.is_empty() {
        return Err(EvaluationError::NoTargets);
    }

    let arity = target.arity();
    if arity < 2 {
        return Err(EvaluationError::CategoricalArity(arity));
    }

    let mut predicted_categories = Categories::new();
    add_categories(&mut predicted_categories, observed.iter().map(|(k, v)| (k, *v)));
    add_categories(
        &mut predicted_categories,
        target.keys().map(|k| (k, predicted.get(k).unwrap_or(0.0))),
    );

    let mut true_categories = Categories::new();
    add_categories(&mut true_categories, observed.iter().map(|(k, v)| (k, *v)));
    add_categories(&mut true_categories, truth.iter().map(|(k, v)| (k, *v)));

    // Only entities with at least one labeled target atom are scored.
    let mut entities: Vec<i64> = target
        .keys()
        .filter(|k| truth.contains(k))
        .filter_map(|k| k.first().copied())
        .collect();
    entities.dedup();

    let mut correct = 0usize;
    let mut total = 0usize;

    for entity in entities {
        let Some(expected) = true_categories.get(&entity).and_then(argmax) else {
            continue;
        };
        let actual = predicted_categories.get(&entity).and_then(argmax);

        total += 1;
        if actual == Some(expected) {
            correct += 1;
        }
    }

    if total == 0 {
        return Err(EvaluationError::NoTargets);
    }

    Ok(correct as f64 / total as f64)
}

/// F1 of the positive class with truth and predictions thresholded at 0.5
pub fn evaluate_f1(
    predicted: &Frame,
    truth: &Frame,
    _observed: &Frame,
    target: &Frame,
) -> Result<f64, EvaluationError> {
    let pairs = target_pairs(predicted, truth, target)?;
    let predictions: Vec<bool> = pairs.iter().map(|(p, _)| is_positive(*p)).collect();
    let ground_truth: Vec<bool> = pairs.iter().map(|(_, t)| is_positive(*t)).collect();

    Ok(ConfusionMatrix::from_outcomes(&predictions, &ground_truth).f1_score())
}

/// Mean squared error between predicted and true values
pub fn evaluate_mse(
    predicted: &Frame,
    truth: &Frame,
    _observed: &Frame,
    target: &Frame,
) -> Result<f64, EvaluationError> {
    let pairs = target_pairs(predicted, truth, target)?;
    let sum: f64 = pairs.iter().map(|(p, t)| (p - t).powi(2)).sum();
    Ok(sum / pairs.len() as f64)
}

/// AUC-ROC with thresholded truth as labels and predictions as scores
pub fn evaluate_roc_auc_score(
    predicted: &Frame,
    truth: &Frame,
    _observed: &Frame,
    target: &Frame,
) -> Result<f64, EvaluationError> {
    let pairs = target_pairs(predicted, truth, target)?;
    let scored: Vec<(bool, f64)> = pairs.iter().map(|(p, t)| (is_positive(*t), *p)).collect();
    roc_auc(&scored)
}

/// AUC-ROC by the trapezoidal rule over distinct score thresholds.
/// Tied scores move the curve diagonally.
pub fn roc_auc(scored: &[(bool, f64)]) -> Result<f64, EvaluationError> {
    let mut pairs = scored.to_vec();
    pairs.sort_by(|a, b| b.1.total_cmp(&a.1));

    let n_pos = pairs.iter().filter(|(label, _)| *label).count() as f64;
    let n_neg = pairs.len() as f64 - n_pos;

    if n_pos == 0.0 || n_neg == 0.0 {
        return Err(EvaluationError::SingleClass);
    }

    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut tpr_prev = 0.0;
    let mut fpr_prev = 0.0;
    let mut auc = 0.0;

    let mut idx = 0;
    while idx < pairs.len() {
        let threshold = pairs[idx].1;
        loop {
            if pairs[idx].0 {
                tp += 1.0;
            } else {
                fp += 1.0;
            }
            idx += 1;
            if idx >= pairs.len() || pairs[idx].1.total_cmp(&threshold) != Ordering::Equal {
                break;
            }
        }

        let tpr = tp / n_pos;
        let fpr = fp / n_neg;
        auc += (fpr - fpr_prev) * (tpr + tpr_prev) / 2.0;

        tpr_prev = tpr;
        fpr_prev = fpr;
    }

    Ok(auc)
}

/// Mean and population standard deviation of per-iteration scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryStatistics {
    pub count: usize,
    /// `None` when there are no values
    pub mean: Option<f64>,
    /// Population standard deviation (divides by n); `None` when there are no values
    pub std_dev: Option<f64>,
}

impl SummaryStatistics {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                count: 0,
                mean: None,
                std_dev: None,
            };
        }

        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;

        Self {
            count: values.len(),
            mean: Some(mean),
            std_dev: Some(variance.sqrt()),
        }
    }
}
