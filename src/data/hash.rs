//! Content hash of a dataset for versioning runs.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::Result;

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

/// SHA-256 over the relative paths and contents of all files, in sorted order
///
/// `path` may be a single file or a directory tree.
pub fn hash_data<P: AsRef<Path>>(path: P) -> Result<String> {
    let root = path.as_ref();
    let mut files = Vec::new();
    if root.is_dir() {
        collect_files(root, &mut files)?;
    } else {
        files.push(root.to_path_buf());
    }
    files.sort();

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1 << 16];
    for file in files {
        let relative = file.strip_prefix(root).unwrap_or(&file);
        hasher.update(relative.to_string_lossy().as_bytes());

        let mut reader = fs::File::open(&file)?;
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_is_stable_and_content_sensitive() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("train")).unwrap();
        fs::write(tmp.path().join("attrs.json"), b"{}").unwrap();
        fs::write(tmp.path().join("train/x.npy"), b"abc").unwrap();

        let first = hash_data(tmp.path()).unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(first, hash_data(tmp.path()).unwrap());

        fs::write(tmp.path().join("train/x.npy"), b"abd").unwrap();
        assert_ne!(first, hash_data(tmp.path()).unwrap());
    }
}
