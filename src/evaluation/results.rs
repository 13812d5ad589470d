//! Persisting test results

use std::path::{Path, PathBuf};

use ndarray::{Array1, Array2};
use ndarray_npy::write_npy;
use serde::Serialize;

use super::report::{ClassificationReport, ConfusionMatrix};
use crate::config::ParamsRecord;
use crate::error::{Result, TcnError};
use crate::training::History;
use crate::utils::with_suffix;

/// Everything recorded about a finished run
#[derive(Debug, Clone)]
pub struct ResultsBundle {
    pub history: History,
    pub confusion_matrix: ConfusionMatrix,
    pub report: ClassificationReport,
    pub params: ParamsRecord,
    pub x_test: Array2<f32>,
    pub y_test: Array2<f32>,
    pub y_pred: Array2<f32>,
    pub labels_test: Vec<usize>,
    pub labels_pred: Vec<usize>,
}

#[derive(Serialize)]
struct ResultsSummary<'a> {
    fit_hist: &'a History,
    confusion_matrix: &'a ConfusionMatrix,
    classification_report: &'a ClassificationReport,
    params: &'a ParamsRecord,
    arrays: PathBuf,
}

fn save_array<A: ndarray_npy::WritableElement, D: ndarray::Dimension>(
    path: PathBuf,
    array: &ndarray::Array<A, D>,
) -> Result<()> {
    write_npy(&path, array).map_err(|source| TcnError::WriteNpy { path, source })
}

fn labels_array(labels: &[usize]) -> Array1<i64> {
    labels.iter().map(|&l| l as i64).collect()
}

impl ResultsBundle {
    /// Write `SAVE_NAME_results.json` and the arrays to `SAVE_NAME_results/*.npy`
    ///
    /// Returns the path of the JSON file.
    pub fn save(&self, save_name: &Path) -> Result<PathBuf> {
        let array_dir = with_suffix(save_name, "_results");
        std::fs::create_dir_all(&array_dir)?;

        save_array(array_dir.join("x_test.npy"), &self.x_test)?;
        save_array(array_dir.join("y_test.npy"), &self.y_test)?;
        save_array(array_dir.join("y_pred.npy"), &self.y_pred)?;
        save_array(array_dir.join("labels_test.npy"), &labels_array(&self.labels_test))?;
        save_array(array_dir.join("labels_pred.npy"), &labels_array(&self.labels_pred))?;

        let json_path = with_suffix(save_name, "_results.json");
        let summary = ResultsSummary {
            fit_hist: &self.history,
            confusion_matrix: &self.confusion_matrix,
            classification_report: &self.report,
            params: &self.params,
            arrays: array_dir,
        };
        let file = std::fs::File::create(&json_path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), &summary)?;
        Ok(json_path)
    }
}
