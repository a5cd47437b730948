//! Training and evaluation metrics.
//!
//! [`Metrics`] is one measurement (a step, an epoch or an evaluation pass);
//! [`MetricsRecorder`] accumulates step metrics into an epoch summary. AUC is
//! never averaged across steps: the recorder keeps every score it has seen
//! and computes the exact AUC over all of them.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Metrics for a step, an epoch or an evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// Mean cross-entropy plus regularization.
    pub loss: f64,
    /// Fraction of examples whose thresholded prediction matches the label.
    pub accuracy: Option<f64>,
    /// Area under the ROC curve, absent when only one class was seen.
    pub auc: Option<f64>,
    /// Number of examples the metrics cover.
    pub num_examples: usize,
    /// Optimizer steps taken when the metrics were recorded.
    pub global_step: u64,
}

impl Metrics {
    /// Creates metrics with the given loss and step.
    ///
    /// # Examples
    ///
    /// ```
    /// use ctr_training::Metrics;
    ///
    /// let metrics = Metrics::new(0.5, 100);
    /// assert_eq!(metrics.loss, 0.5);
    /// assert_eq!(metrics.global_step, 100);
    /// ```
    pub fn new(loss: f64, global_step: u64) -> Self {
        Self {
            loss,
            global_step,
            ..Self::default()
        }
    }

    /// Sets the accuracy.
    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Sets the AUC.
    pub fn with_auc(mut self, auc: f64) -> Self {
        self.auc = Some(auc);
        self
    }

    /// Sets the number of examples covered.
    pub fn with_num_examples(mut self, num_examples: usize) -> Self {
        self.num_examples = num_examples;
        self
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "loss: {:.4}", self.loss)?;
        if let Some(auc) = self.auc {
            write!(f, " - auc: {auc:.4}")?;
        }
        if let Some(accuracy) = self.accuracy {
            write!(f, " - accuracy: {accuracy:.4}")?;
        }
        Ok(())
    }
}

/// Exact ROC AUC from the Mann-Whitney rank statistic.
///
/// Tied scores share their average rank, so a tie between a positive and a
/// negative counts one half. Labels above `0.5` are positives. Returns `None`
/// when only one class is present or the lengths differ.
///
/// # Examples
///
/// ```
/// use ctr_training::auc;
///
/// assert_eq!(auc(&[0.1, 0.4, 0.35, 0.8], &[0.0, 0.0, 1.0, 1.0]), Some(0.75));
/// assert_eq!(auc(&[0.3, 0.7], &[1.0, 1.0]), None);
/// ```
pub fn auc(scores: &[f32], labels: &[f32]) -> Option<f64> {
    if scores.len() != labels.len() {
        return None;
    }
    let positives = labels.iter().filter(|&&y| y > 0.5).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[a]
            .partial_cmp(&scores[b])
            .unwrap_or(Ordering::Equal)
    });

    // Sum of 1-based ranks of the positives, ties averaged.
    let mut positive_rank_sum = 0.0f64;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        let average_rank = (start + end + 1) as f64 / 2.0;
        let tied_positives = order[start..end]
            .iter()
            .filter(|&&i| labels[i] > 0.5)
            .count();
        positive_rank_sum += average_rank * tied_positives as f64;
        start = end;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

/// Fraction of predictions on the right side of `0.5`.
///
/// Returns `None` for empty or mismatched inputs.
pub fn accuracy(probs: &[f32], labels: &[f32]) -> Option<f64> {
    if probs.is_empty() || probs.len() != labels.len() {
        return None;
    }
    let correct = probs
        .iter()
        .zip(labels)
        .filter(|&(&p, &y)| (p > 0.5) == (y > 0.5))
        .count();
    Some(correct as f64 / probs.len() as f64)
}

/// Accumulates per-step losses and predictions over an epoch.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    loss_sum: f64,
    examples: usize,
    steps: u64,
    scores: Vec<f32>,
    labels: Vec<f32>,
}

impl MetricsRecorder {
    /// Creates an empty recorder.
    ///
    /// # Examples
    ///
    /// ```
    /// use ctr_training::MetricsRecorder;
    ///
    /// let recorder = MetricsRecorder::new();
    /// assert_eq!(recorder.count(), 0);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one step: its mean loss and the predictions behind it.
    ///
    /// The loss is weighted by the batch size, so a short final batch counts
    /// for what it covers.
    pub fn record_batch(&mut self, loss: f64, probs: &[f32], labels: &[f32]) {
        self.loss_sum += loss * labels.len() as f64;
        self.examples += labels.len();
        self.steps += 1;
        self.scores.extend_from_slice(probs);
        self.labels.extend_from_slice(labels);
    }

    /// Number of steps recorded.
    pub fn count(&self) -> u64 {
        self.steps
    }

    /// Number of examples recorded.
    pub fn num_examples(&self) -> usize {
        self.examples
    }

    /// Example-weighted mean loss, `0.0` before anything is recorded.
    pub fn average_loss(&self) -> f64 {
        if self.examples == 0 {
            0.0
        } else {
            self.loss_sum / self.examples as f64
        }
    }

    /// AUC over every recorded prediction.
    pub fn auc(&self) -> Option<f64> {
        auc(&self.scores, &self.labels)
    }

    /// Summarizes everything recorded at the given global step.
    ///
    /// # Examples
    ///
    /// ```
    /// use ctr_training::MetricsRecorder;
    ///
    /// let mut recorder = MetricsRecorder::new();
    /// recorder.record_batch(0.5, &[0.9, 0.2], &[1.0, 0.0]);
    /// recorder.record_batch(0.2, &[0.6], &[1.0]);
    ///
    /// let epoch = recorder.aggregate(2);
    /// assert!((epoch.loss - 0.4).abs() < 1e-10);
    /// assert_eq!(epoch.auc, Some(1.0));
    /// assert_eq!(epoch.num_examples, 3);
    /// ```
    pub fn aggregate(&self, global_step: u64) -> Metrics {
        let mut metrics =
            Metrics::new(self.average_loss(), global_step).with_num_examples(self.examples);
        if let Some(auc) = self.auc() {
            metrics = metrics.with_auc(auc);
        }
        if let Some(accuracy) = accuracy(&self.scores, &self.labels) {
            metrics = metrics.with_accuracy(accuracy);
        }
        metrics
    }

    /// Clears the recorder.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_builder() {
        let metrics = Metrics::new(0.5, 100)
            .with_accuracy(0.9)
            .with_auc(0.95)
            .with_num_examples(64);
        assert_eq!(metrics.accuracy, Some(0.9));
        assert_eq!(metrics.auc, Some(0.95));
        assert_eq!(metrics.num_examples, 64);
        assert_eq!(metrics.to_string(), "loss: 0.5000 - auc: 0.9500 - accuracy: 0.9000");
    }

    #[test]
    fn test_auc_perfect_and_reversed() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        assert_eq!(auc(&[0.1, 0.2, 0.8, 0.9], &labels), Some(1.0));
        assert_eq!(auc(&[0.9, 0.8, 0.2, 0.1], &labels), Some(0.0));
    }

    #[test]
    fn test_auc_ties_count_half() {
        // every score tied
        assert_eq!(auc(&[0.5; 4], &[0.0, 1.0, 0.0, 1.0]), Some(0.5));
        // one positive/negative pair tied, the rest ordered
        let value = auc(&[0.2, 0.5, 0.5, 0.9], &[0.0, 0.0, 1.0, 1.0]).unwrap();
        assert!((value - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_auc_matches_pair_count() {
        let scores = [0.3, 0.1, 0.7, 0.7, 0.2, 0.9, 0.4, 0.4];
        let labels = [1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 1.0];
        let mut wins = 0.0;
        let mut pairs = 0.0;
        for (i, &yi) in labels.iter().enumerate() {
            for (j, &yj) in labels.iter().enumerate() {
                if yi == 1.0 && yj == 0.0 {
                    pairs += 1.0;
                    if scores[i] > scores[j] {
                        wins += 1.0;
                    } else if scores[i] == scores[j] {
                        wins += 0.5;
                    }
                }
            }
        }
        let value = auc(&scores, &labels).unwrap();
        assert!((value - wins / pairs).abs() < 1e-12);
    }

    #[test]
    fn test_auc_single_class_or_mismatch() {
        assert_eq!(auc(&[0.1, 0.2], &[0.0, 0.0]), None);
        assert_eq!(auc(&[], &[]), None);
        assert_eq!(auc(&[0.1], &[0.0, 1.0]), None);
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[0.9, 0.4, 0.6, 0.1], &[1.0, 1.0, 0.0, 0.0]), Some(0.5));
        assert_eq!(accuracy(&[], &[]), None);
    }

    #[test]
    fn test_recorder_empty() {
        let recorder = MetricsRecorder::new();
        assert_eq!(recorder.count(), 0);
        assert_eq!(recorder.average_loss(), 0.0);
        assert!(recorder.auc().is_none());
        let metrics = recorder.aggregate(0);
        assert!(metrics.accuracy.is_none());
    }

    #[test]
    fn test_recorder_weights_loss_by_examples() {
        let mut recorder = MetricsRecorder::new();
        recorder.record_batch(1.0, &[0.1, 0.2, 0.3], &[0.0, 0.0, 1.0]);
        recorder.record_batch(0.0, &[0.9], &[1.0]);
        assert_eq!(recorder.count(), 2);
        assert_eq!(recorder.num_examples(), 4);
        assert!((recorder.average_loss() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_recorder_auc_spans_batches() {
        let mut recorder = MetricsRecorder::new();
        // each batch alone has a single class
        recorder.record_batch(0.3, &[0.2, 0.1], &[0.0, 0.0]);
        recorder.record_batch(0.3, &[0.7, 0.8], &[1.0, 1.0]);
        assert_eq!(recorder.aggregate(2).auc, Some(1.0));
    }

    #[test]
    fn test_recorder_reset() {
        let mut recorder = MetricsRecorder::new();
        recorder.record_batch(0.5, &[0.5], &[1.0]);
        recorder.reset();
        assert_eq!(recorder.count(), 0);
        assert_eq!(recorder.num_examples(), 0);
    }
}
