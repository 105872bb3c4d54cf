//! Held-out evaluation of fitted models.

use serde::{Deserialize, Serialize};

use crate::ml::metrics::{
    ClassificationReport, ConfusionMatrix, RegressionMetrics, ThresholdPoint, regression_metrics,
    threshold_sweep,
};
use crate::ml::{
    Classifier, ModelError, RegressionDataset, Regressor, TrainDataset, argmax, check_schema,
};

/// Thresholds swept when none are configured.
pub const DEFAULT_THRESHOLDS: [f32; 3] = [0.3, 0.4, 0.5];

/// Everything measured for one classifier on one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierEvaluation {
    /// Hard prediction per row, aligned with the evaluated dataset.
    pub predictions: Vec<usize>,
    /// `P(class >= 1)` per row.
    pub disruption_scores: Vec<f32>,
    pub confusion: ConfusionMatrix,
    /// `confusion` collapsed to not disrupted (0) vs disrupted (1).
    pub disruption_confusion: ConfusionMatrix,
    pub report: ClassificationReport,
    pub thresholds: Vec<ThresholdPoint>,
}

impl ClassifierEvaluation {
    pub fn accuracy(&self) -> f32 {
        self.report.accuracy
    }
}

/// Score a classifier on `dataset`, including the disruption threshold sweep.
///
/// The model must have been fitted on the dataset's feature schema. Each
/// threshold point counts rows flagged by `score >= threshold`. For two
/// classes the 0.5 point equals `disruption_confusion`; with more classes the
/// two can differ, since the hard prediction need not be a disruption class
/// when the disruption classes together outweigh class 0.
pub fn evaluate_classifier(
    model: &dyn Classifier,
    dataset: &TrainDataset,
    thresholds: &[f32],
) -> Result<ClassifierEvaluation, ModelError> {
    dataset.validate()?;
    check_schema(model.feature_names(), &dataset.feature_names)?;
    if model.classes() != dataset.classes.as_slice() {
        return Err(ModelError::InvalidModel(format!(
            "model classes [{}] do not match dataset classes [{}]",
            model.classes().join(", "),
            dataset.classes.join(", ")
        )));
    }

    let mut predictions = Vec::with_capacity(dataset.x.len());
    let mut disruption_scores = Vec::with_capacity(dataset.x.len());
    for row in &dataset.x {
        let proba = model.predict_proba(row)?;
        predictions.push(argmax(&proba));
        disruption_scores.push(proba.iter().skip(1).sum());
    }

    let confusion = ConfusionMatrix::from_predictions(dataset.classes.len(), &dataset.y, &predictions);
    let report = ClassificationReport::from_confusion(&confusion, &dataset.classes);
    let disrupted = |labels: &[usize]| labels.iter().map(|&label| usize::from(label >= 1)).collect::<Vec<_>>();
    let disruption_confusion =
        ConfusionMatrix::from_predictions(2, &disrupted(&dataset.y), &disrupted(&predictions));

    let truth: Vec<bool> = dataset.y.iter().map(|&label| label >= 1).collect();
    let thresholds = threshold_sweep(&truth, &disruption_scores, thresholds);

    Ok(ClassifierEvaluation {
        predictions,
        disruption_scores,
        confusion,
        disruption_confusion,
        report,
        thresholds,
    })
}

/// Error of a recovery-time regressor, overall and on suspended rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressorEvaluation {
    pub predictions: Vec<f32>,
    pub overall: Option<RegressionMetrics>,
    /// `None` when the partition holds no suspended rows.
    pub suspended: Option<RegressionMetrics>,
}

/// Score a regressor on `dataset`. `classes[i]` is the status of row `i`.
pub fn evaluate_regressor(
    model: &dyn Regressor,
    dataset: &RegressionDataset,
    classes: &[usize],
    suspended_class: usize,
) -> Result<RegressorEvaluation, ModelError> {
    dataset.validate()?;
    check_schema(model.feature_names(), &dataset.feature_names)?;
    if classes.len() != dataset.y.len() {
        return Err(ModelError::MismatchedLengths {
            x: dataset.y.len(),
            y: classes.len(),
        });
    }
    let predictions = dataset
        .x
        .iter()
        .map(|row| model.predict(row))
        .collect::<Result<Vec<f32>, ModelError>>()?;

    let overall = regression_metrics(&dataset.y, &predictions);
    let (actual, predicted): (Vec<f32>, Vec<f32>) = dataset
        .y
        .iter()
        .zip(&predictions)
        .zip(classes)
        .filter(|(_, class)| **class == suspended_class)
        .map(|((&a, &p), _)| (a, p))
        .unzip();
    let suspended = regression_metrics(&actual, &predicted);

    Ok(RegressorEvaluation {
        predictions,
        overall,
        suspended,
    })
}
