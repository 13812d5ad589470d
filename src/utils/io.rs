//! File helpers

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

/// Create a directory and its parents
pub fn ensure_dir<P: AsRef<Path>>(dir: P) -> Result<()> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))
}

/// Pretty-printed JSON
pub fn save_json<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), value)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// `SAVE_NAME` + `suffix`, e.g. `run_20240101_120000` + `_params.json`
pub fn with_suffix(save_name: &Path, suffix: &str) -> PathBuf {
    let mut name = save_name.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_json_in_new_dir() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("a").join("b");
        ensure_dir(&dir).unwrap();

        let path = dir.join("value.json");
        save_json(&serde_json::json!({ "nb_hist": 64 }), &path).unwrap();
        let back: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back["nb_hist"], 64);
    }

    #[test]
    fn test_with_suffix() {
        let name = Path::new("res").join("song_20240101_120000");
        assert_eq!(
            with_suffix(&name, "_params.json"),
            Path::new("res").join("song_20240101_120000_params.json")
        );
    }
}
