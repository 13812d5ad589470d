//! Utility module
//!
//! - Logging setup
//! - JSON and directory helpers
//! - Array <-> tensor conversions

mod io;
mod logging;
mod tensor;

pub use io::{ensure_dir, save_json, with_suffix};
pub use logging::{log_filter, setup_logging};
pub use tensor::{array2_to_tensor, array3_to_tensor, tensor3_to_array, vec_to_tensor};
