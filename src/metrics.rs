//! Diagnostic evaluation of the risk model: accuracy, ROC-AUC, confusion
//! matrix and a per-class precision/recall/F1 report.
//!
//! ROC-AUC comes from linfa's binary classification metrics. The confusion
//! counts are kept here because the report prints them and linfa's
//! `ConfusionMatrix` does not expose its cells.

use linfa::dataset::Pr;
use linfa::metrics::BinaryClassification;
use ndarray::Array1;
use std::fmt;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Precision, recall, F1 and support for one class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Binary confusion matrix indexed as `counts[actual][predicted]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfusionMatrix {
    pub counts: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn true_negatives(&self) -> usize {
        self.counts[0][0]
    }

    pub fn false_positives(&self) -> usize {
        self.counts[0][1]
    }

    pub fn false_negatives(&self) -> usize {
        self.counts[1][0]
    }

    pub fn true_positives(&self) -> usize {
        self.counts[1][1]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    fn class_metrics(&self, class: usize) -> ClassMetrics {
        let other = 1 - class;
        let tp = self.counts[class][class] as f64;
        let fp = self.counts[other][class] as f64;
        let fn_ = self.counts[class][other] as f64;

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        ClassMetrics {
            precision,
            recall,
            f1: ratio(2.0 * precision * recall, precision + recall),
            support: self.counts[class].iter().sum(),
        }
    }
}

/// Output of [`evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationReport {
    pub threshold: f64,
    pub accuracy: f64,
    /// `None` when only one class is present in the ground truth.
    pub roc_auc: Option<f64>,
    pub confusion: ConfusionMatrix,
    /// Indexed by class (0 = fully recovered, 1 = needs recovery).
    pub per_class: [ClassMetrics; 2],
}

impl EvaluationReport {
    pub fn macro_avg(&self) -> ClassMetrics {
        let [a, b] = self.per_class;
        ClassMetrics {
            precision: (a.precision + b.precision) / 2.0,
            recall: (a.recall + b.recall) / 2.0,
            f1: (a.f1 + b.f1) / 2.0,
            support: a.support + b.support,
        }
    }

    pub fn weighted_avg(&self) -> ClassMetrics {
        let [a, b] = self.per_class;
        let total = (a.support + b.support) as f64;
        let weigh = |x: f64, y: f64| ratio(x * a.support as f64 + y * b.support as f64, total);
        ClassMetrics {
            precision: weigh(a.precision, b.precision),
            recall: weigh(a.recall, b.recall),
            f1: weigh(a.f1, b.f1),
            support: a.support + b.support,
        }
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Accuracy: {:.4}", self.accuracy)?;
        match self.roc_auc {
            Some(auc) => writeln!(f, "ROC AUC Score: {:.4}", auc)?,
            None => writeln!(f, "ROC AUC Score: undefined (single class)")?,
        }

        writeln!(f, "\nClassification Report:")?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10} {:>10}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for (class, m) in self.per_class.iter().enumerate() {
            write_row(f, &class.to_string(), m)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>14} {:>10} {:>10} {:>10.2} {:>10}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.confusion.total()
        )?;
        write_row(f, "macro avg", &self.macro_avg())?;
        write_row(f, "weighted avg", &self.weighted_avg())?;

        writeln!(f, "\nConfusion Matrix:")?;
        writeln!(
            f,
            "[[{} {}]\n [{} {}]]",
            self.confusion.true_negatives(),
            self.confusion.false_positives(),
            self.confusion.false_negatives(),
            self.confusion.true_positives()
        )
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, name: &str, m: &ClassMetrics) -> fmt::Result {
    writeln!(
        f,
        "{:>14} {:>10.2} {:>10.2} {:>10.2} {:>10}",
        name, m.precision, m.recall, m.f1, m.support
    )
}

/// Evaluate predicted probabilities against binary ground truth.
///
/// A row is predicted positive when its probability is at least `threshold`.
pub fn evaluate(
    y_true: &Array1<usize>,
    y_proba: &Array1<f64>,
    threshold: f64,
) -> crate::Result<EvaluationReport> {
    if y_true.len() != y_proba.len() {
        anyhow::bail!(
            "label count ({}) does not match prediction count ({})",
            y_true.len(),
            y_proba.len()
        );
    }
    if y_true.is_empty() {
        anyhow::bail!("cannot evaluate an empty prediction set");
    }
    if let Some(&bad) = y_true.iter().find(|&&label| label > 1) {
        anyhow::bail!("evaluation labels must be binary, found {}", bad);
    }

    let mut confusion = ConfusionMatrix::default();
    for (&actual, &p) in y_true.iter().zip(y_proba.iter()) {
        let predicted = usize::from(p >= threshold);
        confusion.counts[actual][predicted] += 1;
    }

    let correct = confusion.true_negatives() + confusion.true_positives();
    let accuracy = correct as f64 / confusion.total() as f64;

    Ok(EvaluationReport {
        threshold,
        accuracy,
        roc_auc: roc_auc(y_true, y_proba),
        confusion,
        per_class: [confusion.class_metrics(0), confusion.class_metrics(1)],
    })
}

/// Area under the ROC curve, or `None` when only one class is present.
pub fn roc_auc(y_true: &Array1<usize>, y_proba: &Array1<f64>) -> Option<f64> {
    let truth: Vec<bool> = y_true.iter().map(|&y| y == 1).collect();
    if truth.iter().all(|&t| t) || truth.iter().all(|&t| !t) {
        return None;
    }

    // Lifted into [0.5, 1] so no score sits on linfa's initial zero threshold;
    // the curve only depends on the ranking.
    let scores: Array1<Pr> = y_proba
        .iter()
        .map(|&p| Pr::new_unchecked((0.5 + p.clamp(0.0, 1.0) / 2.0) as f32))
        .collect();

    scores
        .roc(truth.as_slice())
        .ok()
        .map(|roc| f64::from(roc.area_under_curve()))
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
