//! Evaluation metrics for classifiers and regressors.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Confusion matrix for a `K`-class classifier.
pub struct ConfusionMatrix {
    /// Number of classes.
    pub n_classes: usize,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty `KxK` confusion matrix.
    pub fn new(n_classes: usize) -> Self {
        Self {
            n_classes,
            counts: vec![0; n_classes * n_classes],
        }
    }

    /// Build a matrix from aligned truth/prediction pairs. Out-of-range pairs are skipped.
    pub fn from_predictions(n_classes: usize, truth: &[usize], predicted: &[usize]) -> Self {
        let mut cm = Self::new(n_classes);
        for (&t, &p) in truth.iter().zip(predicted) {
            cm.add(t, p);
        }
        cm
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        if truth >= self.n_classes || predicted >= self.n_classes {
            return;
        }
        let idx = truth * self.n_classes + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes + predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&v| v as u64).sum()
    }

    /// Rows of the matrix, one per true class.
    pub fn rows(&self) -> impl Iterator<Item = &[u32]> {
        self.counts.chunks(self.n_classes.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Precision/recall statistics for a single class.
pub struct PerClassStats {
    /// `TP / (TP + FP)`.
    pub precision: f32,
    /// `TP / (TP + FN)`.
    pub recall: f32,
    /// Total number of true examples for the class.
    pub support: u32,
}

impl PerClassStats {
    /// Harmonic mean of precision and recall; zero when both are zero.
    pub fn f1(&self) -> f32 {
        f1_score(self.precision, self.recall)
    }
}

fn f1_score(precision: f32, recall: f32) -> f32 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

/// Compute per-class precision and recall from a confusion matrix.
pub fn precision_recall_by_class(cm: &ConfusionMatrix) -> Vec<PerClassStats> {
    let k = cm.n_classes;
    let mut stats = Vec::with_capacity(k);
    for class_idx in 0..k {
        let tp = cm.get(class_idx, class_idx) as f32;
        let mut fp = 0f32;
        let mut fn_ = 0f32;
        let mut support = 0u32;
        for j in 0..k {
            let v = cm.get(class_idx, j);
            support = support.saturating_add(v);
            if j != class_idx {
                fn_ += v as f32;
            }
        }
        for i in 0..k {
            if i != class_idx {
                fp += cm.get(i, class_idx) as f32;
            }
        }
        let precision = if tp + fp == 0.0 { 0.0 } else { tp / (tp + fp) };
        let recall = if tp + fn_ == 0.0 { 0.0 } else { tp / (tp + fn_) };
        stats.push(PerClassStats {
            precision,
            recall,
            support,
        });
    }
    stats
}

/// Compute overall accuracy from a confusion matrix.
pub fn accuracy(cm: &ConfusionMatrix) -> f32 {
    let total = cm.total();
    if total == 0 {
        return 0.0;
    }
    let correct: u64 = (0..cm.n_classes).map(|i| cm.get(i, i) as u64).sum();
    (correct as f32) / (total as f32)
}

/// One row of a classification report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassReportRow {
    pub label: String,
    pub precision: f32,
    pub recall: f32,
    pub f1: f32,
    pub support: u32,
}

/// Per-class and averaged precision/recall/F1 for a held-out partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub per_class: Vec<ClassReportRow>,
    pub accuracy: f32,
    /// Unweighted mean over classes.
    pub macro_avg: ClassReportRow,
    /// Mean weighted by support.
    pub weighted_avg: ClassReportRow,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix, classes: &[String]) -> Self {
        let stats = precision_recall_by_class(cm);
        let per_class: Vec<ClassReportRow> = stats
            .iter()
            .enumerate()
            .map(|(idx, s)| ClassReportRow {
                label: classes
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| idx.to_string()),
                precision: s.precision,
                recall: s.recall,
                f1: s.f1(),
                support: s.support,
            })
            .collect();
        let total_support: u32 = per_class.iter().map(|row| row.support).sum();
        let k = per_class.len().max(1) as f32;
        let macro_avg = ClassReportRow {
            label: "macro avg".to_string(),
            precision: per_class.iter().map(|r| r.precision).sum::<f32>() / k,
            recall: per_class.iter().map(|r| r.recall).sum::<f32>() / k,
            f1: per_class.iter().map(|r| r.f1).sum::<f32>() / k,
            support: total_support,
        };
        let weighted = |pick: fn(&ClassReportRow) -> f32| {
            if total_support == 0 {
                return 0.0;
            }
            per_class
                .iter()
                .map(|r| pick(r) * r.support as f32)
                .sum::<f32>()
                / total_support as f32
        };
        let weighted_avg = ClassReportRow {
            label: "weighted avg".to_string(),
            precision: weighted(|r| r.precision),
            recall: weighted(|r| r.recall),
            f1: weighted(|r| r.f1),
            support: total_support,
        };
        Self {
            per_class,
            accuracy: accuracy(cm),
            macro_avg,
            weighted_avg,
        }
    }
}

/// Binary disruption metrics at one probability threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPoint {
    pub threshold: f32,
    pub precision: f32,
    pub recall: f32,
    pub true_positives: u32,
    pub false_positives: u32,
    pub false_negatives: u32,
}

impl ThresholdPoint {
    /// Count `flagged[i]` against `truth[i]`.
    ///
    /// Precision is zero when nothing is flagged; recall is zero when
    /// nothing is truly positive.
    pub fn from_flags(threshold: f32, truth: &[bool], flagged: &[bool]) -> Self {
        let (mut tp, mut fp, mut fn_) = (0u32, 0u32, 0u32);
        for (&actual, &predicted) in truth.iter().zip(flagged) {
            match (actual, predicted) {
                (true, true) => tp += 1,
                (false, true) => fp += 1,
                (true, false) => fn_ += 1,
                (false, false) => {}
            }
        }
        Self {
            threshold,
            precision: ratio(tp, tp + fp),
            recall: ratio(tp, tp + fn_),
            true_positives: tp,
            false_positives: fp,
            false_negatives: fn_,
        }
    }
}

/// Per-row `score >= threshold` flags.
pub fn flag_at(positive_scores: &[f32], threshold: f32) -> Vec<bool> {
    positive_scores.iter().map(|&score| score >= threshold).collect()
}

/// One [`ThresholdPoint`] per threshold, built from [`flag_at`].
pub fn threshold_sweep(truth: &[bool], positive_scores: &[f32], thresholds: &[f32]) -> Vec<ThresholdPoint> {
    thresholds
        .iter()
        .map(|&threshold| ThresholdPoint::from_flags(threshold, truth, &flag_at(positive_scores, threshold)))
        .collect()
}

fn ratio(num: u32, den: u32) -> f32 {
    if den == 0 { 0.0 } else { num as f32 / den as f32 }
}

/// Error summary of a regressor over some rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub rmse: f32,
    pub mae: f32,
    pub count: usize,
}

/// RMSE and MAE of `predicted` against `actual`; `None` for empty input.
pub fn regression_metrics(actual: &[f32], predicted: &[f32]) -> Option<RegressionMetrics> {
    let count = actual.len().min(predicted.len());
    if count == 0 {
        return None;
    }
    let mut sq = 0f64;
    let mut abs = 0f64;
    for (&a, &p) in actual.iter().zip(predicted) {
        let diff = (p - a) as f64;
        sq += diff * diff;
        abs += diff.abs();
    }
    Some(RegressionMetrics {
        rmse: (sq / count as f64).sqrt() as f32,
        mae: (abs / count as f64) as f32,
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn report_matches_hand_computed_values() {
        // truth:     0 0 0 1 1 2
        // predicted: 0 0 1 1 2 2
        let cm = ConfusionMatrix::from_predictions(3, &[0, 0, 0, 1, 1, 2], &[0, 0, 1, 1, 2, 2]);
        let report = ClassificationReport::from_confusion(&cm, &names(&["normal", "delayed", "suspended"]));
        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-6);
        let normal = &report.per_class[0];
        assert_eq!(normal.precision, 1.0);
        assert!((normal.recall - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(normal.support, 3);
        let suspended = &report.per_class[2];
        assert_eq!(suspended.precision, 0.5);
        assert_eq!(suspended.recall, 1.0);
        assert!((suspended.f1 - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(report.macro_avg.support, 6);
        let expected_weighted_recall = (3.0 * (2.0 / 3.0) + 2.0 * 0.5 + 1.0) / 6.0;
        assert!((report.weighted_avg.recall - expected_weighted_recall).abs() < 1e-6);
    }

    #[test]
    fn empty_matrix_reports_zeros() {
        let cm = ConfusionMatrix::new(2);
        let report = ClassificationReport::from_confusion(&cm, &names(&["running", "stopped"]));
        assert_eq!(report.accuracy, 0.0);
        assert_eq!(report.weighted_avg.f1, 0.0);
    }

    #[test]
    fn threshold_sweep_counts_and_handles_no_positives() {
        let truth = [true, true, false, false];
        let scores = [0.9, 0.35, 0.45, 0.1];
        let points = threshold_sweep(&truth, &scores, &[0.3, 0.5, 0.95]);
        assert_eq!(points[0].true_positives, 2);
        assert_eq!(points[0].false_positives, 1);
        assert!((points[0].precision - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(points[1].recall, 0.5);
        assert_eq!(points[1].precision, 1.0);
        assert_eq!(points[2].precision, 0.0);
        assert_eq!(points[2].recall, 0.0);
        assert_eq!(points[2].false_negatives, 2);
    }

    #[test]
    fn score_on_the_threshold_is_flagged() {
        assert_eq!(flag_at(&[0.5, 0.4999, 0.6], 0.5), vec![true, false, true]);
        let point = ThresholdPoint::from_flags(0.5, &[true, false, true], &[true, false, true]);
        assert_eq!((point.precision, point.recall), (1.0, 1.0));
    }

    #[test]
    fn regression_metrics_cover_rmse_and_mae() {
        let m = regression_metrics(&[0.0, 2.0], &[1.0, 5.0]).unwrap();
        assert!((m.mae - 2.0).abs() < 1e-6);
        assert!((m.rmse - 5.0f32.sqrt()).abs() < 1e-6);
        assert_eq!(m.count, 2);
        assert!(regression_metrics(&[], &[]).is_none());
    }
}
