//! Confusion matrix and per-class precision/recall/F1

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TcnError};

/// `matrix[true][predicted]` counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub matrix: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(labels_true: &[usize], labels_pred: &[usize], nb_classes: usize) -> Self {
        let mut matrix = vec![vec![0; nb_classes]; nb_classes];
        for (&t, &p) in labels_true.iter().zip(labels_pred) {
            matrix[t][p] += 1;
        }
        Self { matrix }
    }

    pub fn nb_classes(&self) -> usize {
        self.matrix.len()
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    pub fn true_positives(&self, class: usize) -> usize {
        self.matrix[class][class]
    }

    /// Samples predicted as `class`
    pub fn predicted(&self, class: usize) -> usize {
        self.matrix.iter().map(|row| row[class]).sum()
    }

    /// Samples whose true label is `class`
    pub fn support(&self, class: usize) -> usize {
        self.matrix[class].iter().sum()
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.matrix {
            let cells: Vec<String> = row.iter().map(|c| format!("{c:>8}")).collect();
            writeln!(f, "[{}]", cells.join(""))?;
        }
        Ok(())
    }
}

/// Scores of one class or one average
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub precision: f64,
    pub recall: f64,
    #[serde(rename = "f1-score")]
    pub f1_score: f64,
    pub support: usize,
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl ClassScores {
    fn for_class(confusion: &ConfusionMatrix, class: usize) -> Self {
        let tp = confusion.true_positives(class);
        let precision = ratio(tp, confusion.predicted(class));
        let recall = ratio(tp, confusion.support(class));
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        Self {
            precision,
            recall,
            f1_score,
            support: confusion.support(class),
        }
    }
}

/// Scores of one named class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedScores {
    pub name: String,
    #[serde(flatten)]
    pub scores: ClassScores,
}

/// Per-class scores with accuracy and macro/weighted averages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<NamedScores>,
    pub accuracy: f64,
    pub macro_avg: ClassScores,
    pub weighted_avg: ClassScores,
}

impl ClassificationReport {
    pub fn from_confusion(confusion: &ConfusionMatrix, class_names: &[String]) -> Self {
        let classes: Vec<NamedScores> = (0..confusion.nb_classes())
            .map(|class| NamedScores {
                name: class_names
                    .get(class)
                    .cloned()
                    .unwrap_or_else(|| class.to_string()),
                scores: ClassScores::for_class(confusion, class),
            })
            .collect();

        let total = confusion.total();
        let nb_classes = classes.len().max(1) as f64;
        let average = |weight: &dyn Fn(&ClassScores) -> f64, norm: f64| ClassScores {
            precision: classes.iter().map(|c| weight(&c.scores) * c.scores.precision).sum::<f64>() / norm,
            recall: classes.iter().map(|c| weight(&c.scores) * c.scores.recall).sum::<f64>() / norm,
            f1_score: classes.iter().map(|c| weight(&c.scores) * c.scores.f1_score).sum::<f64>() / norm,
            support: total,
        };
        let macro_avg = average(&|_| 1.0, nb_classes);
        let weighted_avg = average(&|s| s.support as f64, total.max(1) as f64);

        let correct: usize = (0..confusion.nb_classes())
            .map(|c| confusion.true_positives(c))
            .sum();

        Self {
            accuracy: ratio(correct, total),
            classes,
            macro_avg,
            weighted_avg,
        }
    }

    pub fn class(&self, name: &str) -> Option<&ClassScores> {
        self.classes.iter().find(|c| c.name == name).map(|c| &c.scores)
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, width: usize, name: &str, s: &ClassScores) -> fmt::Result {
    writeln!(
        f,
        "{name:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        s.precision, s.recall, s.f1_score, s.support
    )
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        for class in &self.classes {
            write_row(f, width, &class.name, &class.scores)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        write_row(f, width, "macro avg", &self.macro_avg)?;
        write_row(f, width, "weighted avg", &self.weighted_avg)
    }
}

/// Confusion matrix and classification report for two label sequences
///
/// Labels beyond `class_names` are reported under their numeric index.
pub fn evaluate_segments(
    labels_true: &[usize],
    labels_pred: &[usize],
    class_names: &[String],
) -> Result<(ConfusionMatrix, ClassificationReport)> {
    if labels_true.len() != labels_pred.len() {
        return Err(TcnError::ShapeMismatch {
            context: "evaluate_segments".to_string(),
            detail: format!(
                "{} true labels but {} predicted labels",
                labels_true.len(),
                labels_pred.len()
            ),
        });
    }
    let nb_classes = labels_true
        .iter()
        .chain(labels_pred)
        .map(|&l| l + 1)
        .max()
        .unwrap_or(0)
        .max(class_names.len());

    let confusion = ConfusionMatrix::new(labels_true, labels_pred, nb_classes);
    let report = ClassificationReport::from_confusion(&confusion, class_names);
    Ok((confusion, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn names() -> Vec<String> {
        vec!["noise".to_string(), "pulse".to_string(), "sine".to_string()]
    }

    #[test]
    fn test_confusion_matrix() {
        let truth = [0, 0, 1, 1, 2, 2];
        let pred = [0, 1, 1, 1, 2, 0];
        let cm = ConfusionMatrix::new(&truth, &pred, 3);
        assert_eq!(cm.matrix, vec![vec![1, 1, 0], vec![0, 2, 0], vec![1, 0, 1]]);
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.predicted(1), 3);
        assert_eq!(cm.support(2), 2);
    }

    #[test]
    fn test_report_scores() {
        let truth = [0, 0, 1, 1, 2, 2];
        let pred = [0, 1, 1, 1, 2, 0];
        let (_, report) = evaluate_segments(&truth, &pred, &names()).unwrap();

        let pulse = report.class("pulse").unwrap();
        assert_relative_eq!(pulse.precision, 2.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(pulse.recall, 1.0, epsilon = 1e-12);
        assert_relative_eq!(pulse.f1_score, 0.8, epsilon = 1e-12);
        assert_eq!(pulse.support, 2);

        assert_relative_eq!(report.accuracy, 4.0 / 6.0, epsilon = 1e-12);
        // precisions 0.5, 2/3, 1
        assert_relative_eq!(report.macro_avg.precision, (0.5 + 2.0 / 3.0 + 1.0) / 3.0, epsilon = 1e-12);
        assert_eq!(report.weighted_avg.support, 6);
    }

    #[test]
    fn test_absent_class_scores_zero() {
        let (cm, report) = evaluate_segments(&[0, 0], &[0, 0], &names()).unwrap();
        assert_eq!(cm.nb_classes(), 3);
        assert_eq!(report.class("sine").unwrap().f1_score, 0.0);
        assert_relative_eq!(report.weighted_avg.recall, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_unnamed_labels() {
        let (cm, report) = evaluate_segments(&[0, 4], &[0, 4], &names()).unwrap();
        assert_eq!(cm.nb_classes(), 5);
        assert!(report.class("4").is_some());
    }

    #[test]
    fn test_length_mismatch() {
        assert!(evaluate_segments(&[0, 1], &[0], &names()).is_err());
    }

    #[test]
    fn test_report_serializes_like_sklearn() {
        let (_, report) = evaluate_segments(&[0, 1], &[0, 1], &names()).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["classes"][1]["name"], "pulse");
        assert_eq!(json["classes"][1]["f1-score"], 1.0);
        assert!(report.to_string().contains("weighted avg"));
    }
}
