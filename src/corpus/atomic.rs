//! Write-temp-then-rename primitives.
//!
//! Every file an external reader may open goes through these helpers, so a
//! reader always sees either the previous contents or the new contents and
//! never a partial write. The rename is the commit point.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::Result;

/// Write `bytes` to `path` atomically.
///
/// The bytes land in a sibling `path.<random>.tmp` first, then rename onto
/// the target. Parent directories are created as needed. On failure the
/// temp file is removed and no partial file remains at `path`.
pub fn atomic_write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = tmp_path(path);
    let result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        // Durability is best-effort; atomicity comes from the rename.
        let _ = file.sync_all();
        drop(file);
        fs::rename(&tmp, path)?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Serialize `value` as pretty-printed JSON (2-space indent, trailing
/// newline) and write it atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    atomic_write_file(path, text.as_bytes())
}

fn tmp_path(path: &Path) -> PathBuf {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    name.push('.');
    name.push_str(&suffix[..8]);
    name.push_str(".tmp");
    match path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/c.txt");
        atomic_write_file(&target, b"hello").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"hello");
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f.txt");
        atomic_write_file(&target, b"one").unwrap();
        atomic_write_file(&target, b"two").unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"two");
    }

    #[test]
    fn test_no_tmp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("f.txt");
        atomic_write_file(&target, b"data").unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["f.txt".to_string()]);
    }

    #[test]
    fn test_json_pretty_with_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("v.json");
        atomic_write_json(&target, &serde_json::json!({"a": 1})).unwrap();
        let text = fs::read_to_string(&target).unwrap();
        assert!(text.ends_with('\n'));
        assert!(text.contains("  \"a\": 1"));
    }

    /// Concurrent writers must never let a reader observe a truncated file:
    /// whatever version wins, the contents are one writer's full payload.
    #[test]
    fn test_atomic_visibility_under_contention() {
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let target = Arc::new(dir.path().join("contended.txt"));

        let payload_a = vec![b'a'; 512 * 1024];
        let payload_b = vec![b'b'; 512 * 1024];

        let mut handles = Vec::new();
        for payload in [payload_a.clone(), payload_b.clone()] {
            let target = Arc::clone(&target);
            handles.push(std::thread::spawn(move || {
                for _ in 0..20 {
                    atomic_write_file(&target, &payload).unwrap();
                }
            }));
        }

        let reader_target = Arc::clone(&target);
        let reader = std::thread::spawn(move || {
            for _ in 0..200 {
                if let Ok(contents) = fs::read(&*reader_target) {
                    assert_eq!(contents.len(), 512 * 1024);
                    let first = contents[0];
                    assert!(contents.iter().all(|&b| b == first));
                }
            }
        });

        for h in handles {
            h.join().unwrap();
        }
        reader.join().unwrap();
    }
}
