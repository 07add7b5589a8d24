//! Binary classification metrics and the scorers built on them.

use std::cmp::Ordering;

use thiserror::Error;

use tb_data::Dataset;
use tb_optimizer::Scorer;
use tb_types::BoxError;

use crate::gbdt::GbdtModel;

const LOG_LOSS_EPS: f64 = 1e-15;

#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("{predictions} predictions for {labels} labels")]
    LengthMismatch { predictions: usize, labels: usize },

    #[error("no samples to score")]
    Empty,

    #[error("ROC AUC is undefined when only one class is present")]
    SingleClass,
}

fn check(proba: &[f64], labels: &[u8]) -> Result<(), MetricError> {
    if proba.len() != labels.len() {
        return Err(MetricError::LengthMismatch {
            predictions: proba.len(),
            labels: labels.len(),
        });
    }
    if proba.is_empty() {
        return Err(MetricError::Empty);
    }
    Ok(())
}

/// Area under the ROC curve via the Mann-Whitney rank statistic. Tied scores
/// share their average rank.
pub fn roc_auc(proba: &[f64], labels: &[u8]) -> Result<f64, MetricError> {
    check(proba, labels)?;
    let n = proba.len();
    let n_pos = labels.iter().filter(|&&l| l == 1).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(MetricError::SingleClass);
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| proba[a].partial_cmp(&proba[b]).unwrap_or(Ordering::Equal));

    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && proba[order[j]] == proba[order[i]] {
            j += 1;
        }
        // ranks i+1..=j averaged
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        let positives = order[i..j].iter().filter(|&&idx| labels[idx] == 1).count();
        rank_sum_pos += avg_rank * positives as f64;
        i = j;
    }

    let (p, q) = (n_pos as f64, n_neg as f64);
    Ok((rank_sum_pos - p * (p + 1.0) / 2.0) / (p * q))
}

/// F1 of the positive class with predictions `proba >= threshold`.
/// Zero when there are no true positives.
pub fn f1_score(proba: &[f64], labels: &[u8], threshold: f64) -> Result<f64, MetricError> {
    check(proba, labels)?;
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (&p, &l) in proba.iter().zip(labels) {
        match (p >= threshold, l == 1) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fn_ += 1,
            (false, false) => {}
        }
    }
    if tp == 0 {
        return Ok(0.0);
    }
    Ok(2.0 * tp as f64 / (2 * tp + fp + fn_) as f64)
}

pub fn accuracy(proba: &[f64], labels: &[u8], threshold: f64) -> Result<f64, MetricError> {
    check(proba, labels)?;
    let correct = proba
        .iter()
        .zip(labels)
        .filter(|(p, l)| (**p >= threshold) == (**l == 1))
        .count();
    Ok(correct as f64 / proba.len() as f64)
}

/// Mean binary cross-entropy. Probabilities are clipped away from 0 and 1.
pub fn log_loss(proba: &[f64], labels: &[u8]) -> Result<f64, MetricError> {
    check(proba, labels)?;
    let total: f64 = proba
        .iter()
        .zip(labels)
        .map(|(&p, &l)| {
            let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            if l == 1 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    Ok(total / proba.len() as f64)
}

// =============================================================================
// Scorers
// =============================================================================

/// Validation ROC AUC. The default objective for searches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RocAucScorer;

impl Scorer<GbdtModel, Dataset> for RocAucScorer {
    fn name(&self) -> &str {
        "roc_auc"
    }

    fn score(&self, model: &GbdtModel, validation: &Dataset) -> Result<f64, BoxError> {
        let proba = model.predict_proba(validation)?;
        Ok(roc_auc(&proba, validation.labels())?)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct F1Scorer {
    pub threshold: f64,
}

impl Default for F1Scorer {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl Scorer<GbdtModel, Dataset> for F1Scorer {
    fn name(&self) -> &str {
        "f1"
    }

    fn score(&self, model: &GbdtModel, validation: &Dataset) -> Result<f64, BoxError> {
        let proba = model.predict_proba(validation)?;
        Ok(f1_score(&proba, validation.labels(), self.threshold)?)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AccuracyScorer {
    pub threshold: f64,
}

impl Default for AccuracyScorer {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl Scorer<GbdtModel, Dataset> for AccuracyScorer {
    fn name(&self) -> &str {
        "accuracy"
    }

    fn score(&self, model: &GbdtModel, validation: &Dataset) -> Result<f64, BoxError> {
        let proba = model.predict_proba(validation)?;
        Ok(accuracy(&proba, validation.labels(), self.threshold)?)
    }
}

/// Negated log loss, so that higher is better like the other scorers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegLogLossScorer;

impl Scorer<GbdtModel, Dataset> for NegLogLossScorer {
    fn name(&self) -> &str {
        "neg_log_loss"
    }

    fn score(&self, model: &GbdtModel, validation: &Dataset) -> Result<f64, BoxError> {
        let proba = model.predict_proba(validation)?;
        Ok(-log_loss(&proba, validation.labels())?)
    }
}
