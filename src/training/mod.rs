//! Training
//!
//! - `loss` - weighted categorical cross-entropy
//! - `callbacks` - early stopping, LR schedule, checkpoints, progress, metrics log
//! - `trainer` - fit loop
//! - `tracking` - remote experiment tracking

mod callbacks;
mod loss;
mod tracking;
mod trainer;

pub use callbacks::{
    Callback, CheckpointRecorder, EarlyStopping, EpochLogs, MetricsLog, ModelCheckpoint,
    ProgressReporter, ProgressUpdate, ReduceLrOnPlateau, TrainingControl,
};
pub use loss::weighted_categorical_crossentropy;
pub use tracking::RemoteTracker;
pub use trainer::{align_targets, evaluate_loss, fit, FitConfig, History, MAX_STEPS_PER_EPOCH};
