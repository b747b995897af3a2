//! Hold-out evaluation: stratified split, ROC AUC and F1

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Binary confusion counts at a fixed threshold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionCounts {
    pub fn from_labels(y_true: &[f64], y_pred: &[bool]) -> Self {
        let mut counts = Self::default();
        for (&truth, &pred) in y_true.iter().zip(y_pred) {
            match (truth > 0.5, pred) {
                (true, true) => counts.true_positive += 1,
                (false, true) => counts.false_positive += 1,
                (false, false) => counts.true_negative += 1,
                (true, false) => counts.false_negative += 1,
            }
        }
        counts
    }

    pub fn precision(&self) -> f64 {
        let denom = self.true_positive + self.false_positive;
        if denom == 0 {
            0.0
        } else {
            self.true_positive as f64 / denom as f64
        }
    }

    pub fn recall(&self) -> f64 {
        let denom = self.true_positive + self.false_negative;
        if denom == 0 {
            0.0
        } else {
            self.true_positive as f64 / denom as f64
        }
    }

    /// F1 of the positive class; 0.0 when nothing was predicted positive and
    /// nothing was positive
    pub fn f1(&self) -> f64 {
        let denom = 2 * self.true_positive + self.false_positive + self.false_negative;
        if denom == 0 {
            0.0
        } else {
            2.0 * self.true_positive as f64 / denom as f64
        }
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.true_positive + self.false_positive + self.true_negative + self.false_negative;
        if total == 0 {
            0.0
        } else {
            (self.true_positive + self.true_negative) as f64 / total as f64
        }
    }
}

/// Evaluation of one split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub rows: usize,
    /// `None` when the split holds a single class
    pub auc: Option<f64>,
    pub f1: f64,
    pub confusion: ConfusionCounts,
}

/// Score a split at `threshold`
pub fn evaluate(y_true: &[f64], probabilities: &[f64], threshold: f64) -> EvaluationMetrics {
    let labels: Vec<bool> = probabilities.iter().map(|&p| p >= threshold).collect();
    let confusion = ConfusionCounts::from_labels(y_true, &labels);
    EvaluationMetrics {
        rows: y_true.len(),
        auc: roc_auc(y_true, probabilities),
        f1: confusion.f1(),
        confusion,
    }
}

/// Area under the ROC curve via the rank-sum statistic.
///
/// Tied scores receive their average rank. Returns `None` when either class
/// is absent.
pub fn roc_auc(y_true: &[f64], scores: &[f64]) -> Option<f64> {
    let n = y_true.len().min(scores.len());
    let positives = y_true[..n].iter().filter(|&&y| y > 0.5).count();
    let negatives = n - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; n];
    let mut i = 0;
    while i < n {
        let mut j = i + 1;
        while j < n && scores[order[j]] == scores[order[i]] {
            j += 1;
        }
        // Positions i..j share the average of ranks i+1..=j
        let avg_rank = (i + 1 + j) as f64 / 2.0;
        for &idx in &order[i..j] {
            ranks[idx] = avg_rank;
        }
        i = j;
    }

    let positive_rank_sum: f64 = (0..n).filter(|&i| y_true[i] > 0.5).map(|i| ranks[i]).sum();
    let p = positives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

/// Split row indices into train and test sets, preserving class ratios.
///
/// Each class is shuffled with a generator seeded from `seed` and
/// `round(test_size * class_count)` rows go to the test set, keeping at least
/// one row of each class in training. Both index lists are returned sorted.
pub fn stratified_split(y: &[f64], test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(y.len());
    let mut test = Vec::new();

    for positive in [false, true] {
        let mut class: Vec<usize> = (0..y.len()).filter(|&i| (y[i] > 0.5) == positive).collect();
        if class.is_empty() {
            continue;
        }
        class.shuffle(&mut rng);

        let n_test = ((class.len() as f64) * test_size).round() as usize;
        let n_test = n_test.min(class.len().saturating_sub(1));
        test.extend_from_slice(&class[..n_test]);
        train.extend_from_slice(&class[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auc_perfect_and_inverted() {
        let y = [0.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc(&y, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&y, &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
    }

    #[test]
    fn test_auc_ties_average() {
        let y = [0.0, 1.0];
        assert_eq!(roc_auc(&y, &[0.5, 0.5]), Some(0.5));
    }

    #[test]
    fn test_auc_single_class() {
        assert_eq!(roc_auc(&[1.0, 1.0], &[0.2, 0.3]), None);
    }

    #[test]
    fn test_f1() {
        let counts = ConfusionCounts::from_labels(&[1.0, 1.0, 0.0, 0.0], &[true, false, true, false]);
        assert_eq!(counts.true_positive, 1);
        assert!((counts.f1() - 0.5).abs() < 1e-12);
        assert_eq!(ConfusionCounts::default().f1(), 0.0);
    }

    #[test]
    fn test_accuracy() {
        let counts = ConfusionCounts::from_labels(&[1.0, 1.0, 0.0, 0.0], &[true, false, false, false]);
        assert!((counts.accuracy() - 0.75).abs() < 1e-12);
        assert_eq!(ConfusionCounts::default().accuracy(), 0.0);
    }

    #[test]
    fn test_stratified_split_is_deterministic_and_stratified() {
        let y: Vec<f64> = (0..100).map(|i| if i % 4 == 0 { 1.0 } else { 0.0 }).collect();

        let (train, test) = stratified_split(&y, 0.2, 42);
        assert_eq!(train.len() + test.len(), 100);
        assert_eq!(test.len(), 20);
        assert_eq!(test.iter().filter(|&&i| y[i] > 0.5).count(), 5);

        let again = stratified_split(&y, 0.2, 42);
        assert_eq!((train, test), again);
    }

    #[test]
    fn test_stratified_split_keeps_one_training_row() {
        let (train, test) = stratified_split(&[1.0, 0.0], 0.9, 7);
        assert_eq!(train, vec![0, 1]);
        assert!(test.is_empty());
    }
}
