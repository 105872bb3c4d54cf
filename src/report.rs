//! Plain-text renderings of run results for the console.

use std::fmt::Write;

use crate::archive::AvailabilitySummary;
use crate::evaluation::{ClassifierEvaluation, RegressorEvaluation};
use crate::ml::metrics::{ClassReportRow, RegressionMetrics};
use crate::pipeline::TrainingReport;

pub fn render_training_report(report: &TrainingReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "schema: {}  rows: {}  routes: {}",
        report.schema, report.rows, report.routes
    );
    let _ = writeln!(
        out,
        "split: {} train / {} test",
        report.split.train_rows, report.split.test_rows
    );
    for (label, counts) in [
        ("train", &report.split.train_class_counts),
        ("test", &report.split.test_class_counts),
    ] {
        let parts: Vec<String> = report
            .classes
            .iter()
            .zip(counts.iter())
            .map(|(class, count)| format!("{class}={count}"))
            .collect();
        let _ = writeln!(out, "  {label:<5} {}", parts.join("  "));
    }
    out.push('\n');
    out.push_str(&render_classifier("Random Forest", &report.random_forest, &report.classes));
    out.push('\n');
    out.push_str(&render_classifier(
        "Gradient Boosting",
        &report.gradient_boosting,
        &report.classes,
    ));
    out.push('\n');
    out.push_str("--- Feature Importance (Random Forest) ---\n");
    for (feature, importance) in &report.feature_importances {
        let _ = writeln!(out, "{feature:<16} {importance:.4}");
    }
    if let Some(regressor) = &report.regressor {
        out.push('\n');
        out.push_str(&render_regressor(regressor));
    }
    let _ = writeln!(
        out,
        "\nstatus_classifier: {}",
        report.status_model.artifact_name()
    );
    out
}

/// Accuracy, classification report, confusion matrix and threshold sweep.
pub fn render_classifier(title: &str, eval: &ClassifierEvaluation, classes: &[String]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- {title} ---");
    let _ = writeln!(out, "accuracy: {:.4}", eval.accuracy());
    let _ = writeln!(
        out,
        "{:<14} {:>9} {:>9} {:>9} {:>9}",
        "", "precision", "recall", "f1-score", "support"
    );
    for row in &eval.report.per_class {
        write_report_row(&mut out, row);
    }
    write_report_row(&mut out, &eval.report.macro_avg);
    write_report_row(&mut out, &eval.report.weighted_avg);

    out.push_str("confusion matrix (rows=true, cols=pred):\n");
    let width = classes.iter().map(String::len).max().unwrap_or(0).max(6);
    let _ = write!(out, "{:width$}", "");
    for class in classes {
        let _ = write!(out, " {class:>width$}");
    }
    out.push('\n');
    for (class, row) in classes.iter().zip(eval.confusion.rows()) {
        let _ = write!(out, "{class:<width$}");
        for count in row {
            let _ = write!(out, " {count:>width$}");
        }
        out.push('\n');
    }
    if classes.len() > 2 {
        let dc = &eval.disruption_confusion;
        let _ = writeln!(
            out,
            "disrupted vs not (hard predictions): tp={} fp={} fn={} tn={}",
            dc.get(1, 1),
            dc.get(0, 1),
            dc.get(1, 0),
            dc.get(0, 0)
        );
    }

    out.push_str("threshold sweep on P(disruption):\n");
    for point in &eval.thresholds {
        let _ = writeln!(
            out,
            "  threshold {:.2}: recall={:.3} precision={:.3} (tp={} fp={} fn={})",
            point.threshold,
            point.recall,
            point.precision,
            point.true_positives,
            point.false_positives,
            point.false_negatives
        );
    }
    out
}

fn write_report_row(out: &mut String, row: &ClassReportRow) {
    let _ = writeln!(
        out,
        "{:<14} {:>9.3} {:>9.3} {:>9.3} {:>9}",
        row.label, row.precision, row.recall, row.f1, row.support
    );
}

pub fn render_regressor(eval: &RegressorEvaluation) -> String {
    let mut out = String::from("--- Recovery Time Regressor ---\n");
    let line = |label: &str, metrics: Option<&RegressionMetrics>| match metrics {
        Some(m) => format!(
            "{label}: rmse={:.3}h mae={:.3}h (n={})\n",
            m.rmse, m.mae, m.count
        ),
        None => format!("{label}: no rows\n"),
    };
    out.push_str(&line("overall", eval.overall.as_ref()));
    out.push_str(&line("suspended", eval.suspended.as_ref()));
    out
}

pub fn render_availability(target: &str, summary: &AvailabilitySummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Availability for: {target}");
    let _ = writeln!(out, "Total snapshots found: {}", summary.total);
    out.push_str("\n--- Snapshots by Year ---\n");
    for (year, count) in &summary.by_year {
        let _ = writeln!(out, "{year}: {count} snapshots");
    }
    out.push_str("\n--- Snapshots by Page Type (Top 10) ---\n");
    for (page, count) in &summary.top_area_pages {
        let _ = writeln!(out, "{page}: {count} snapshots");
    }
    let _ = writeln!(
        out,
        "\nTotal Winter Season Snapshots (Nov-Mar): {}",
        summary.winter_snapshots
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::evaluate_classifier;
    use crate::ml::{Classifier, ModelError, TrainDataset};
    use std::collections::BTreeMap;

    struct Echo(Vec<String>, Vec<String>);

    impl Classifier for Echo {
        fn classes(&self) -> &[String] {
            &self.1
        }
        fn feature_names(&self) -> &[String] {
            &self.0
        }
        fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>, ModelError> {
            Ok(vec![1.0 - features[0], features[0]])
        }
    }

    #[test]
    fn classifier_block_lists_every_class_and_threshold() {
        let data = TrainDataset {
            feature_names: vec!["p".into()],
            classes: vec!["running".into(), "stopped".into()],
            x: vec![vec![0.1], vec![0.9], vec![0.6]],
            y: vec![0, 1, 0],
        };
        let model = Echo(data.feature_names.clone(), data.classes.clone());
        let eval = evaluate_classifier(&model, &data, &[0.3, 0.5]).unwrap();
        let text = render_classifier("Random Forest", &eval, &data.classes);
        assert!(text.contains("--- Random Forest ---"));
        assert!(text.contains("accuracy: 0.6667"));
        assert!(text.contains("macro avg"));
        assert!(text.contains("threshold 0.30"));
        assert!(text.contains("threshold 0.50: recall=1.000 precision=0.500 (tp=1 fp=1 fn=0)"));
        assert!(!text.contains("disrupted vs not"));
    }

    struct Spread(Vec<String>, Vec<String>);

    impl Classifier for Spread {
        fn classes(&self) -> &[String] {
            &self.1
        }
        fn feature_names(&self) -> &[String] {
            &self.0
        }
        fn predict_proba(&self, features: &[f32]) -> Result<Vec<f32>, ModelError> {
            let rest = (1.0 - features[0]) / 2.0;
            Ok(vec![features[0], rest, rest])
        }
    }

    #[test]
    fn three_class_block_shows_collapsed_matrix() {
        let data = TrainDataset {
            feature_names: vec!["p_normal".into()],
            classes: vec!["normal".into(), "delayed".into(), "suspended".into()],
            x: vec![vec![0.4], vec![0.9], vec![0.1]],
            y: vec![1, 0, 2],
        };
        let model = Spread(data.feature_names.clone(), data.classes.clone());
        let eval = evaluate_classifier(&model, &data, &[0.5]).unwrap();
        let text = render_classifier("Gradient Boosting", &eval, &data.classes);
        assert!(text.contains("disrupted vs not (hard predictions): tp=1 fp=0 fn=1 tn=1"));
        assert!(text.contains("threshold 0.50: recall=1.000 precision=1.000 (tp=2 fp=0 fn=0)"));
    }

    #[test]
    fn availability_lists_years_in_order() {
        let summary = AvailabilitySummary {
            total: 3,
            by_year: BTreeMap::from([("2021".to_string(), 1), ("2019".to_string(), 2)]),
            top_area_pages: vec![("area_sapporo.html".to_string(), 2)],
            winter_snapshots: 1,
        };
        let text = render_availability("x", &summary);
        let y2019 = text.find("2019: 2 snapshots").unwrap();
        let y2021 = text.find("2021: 1 snapshots").unwrap();
        assert!(y2019 < y2021);
        assert!(text.contains("area_sapporo.html: 2 snapshots"));
        assert!(text.ends_with("(Nov-Mar): 1\n"));
    }
}
