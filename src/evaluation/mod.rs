//! Test-set evaluation
//!
//! - `probabilities` - windowed prediction stitched into one timeline
//! - `labels` - probabilities to class labels
//! - `report` - confusion matrix and classification report
//! - `results` - results files of a run

mod labels;
mod probabilities;
mod report;
mod results;

pub use labels::labels_from_probabilities;
pub use probabilities::{evaluate_probabilities, StitchedPrediction};
pub use report::{
    evaluate_segments, ClassScores, ClassificationReport, ConfusionMatrix, NamedScores,
};
pub use results::ResultsBundle;
