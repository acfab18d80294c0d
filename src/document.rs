use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{Result, StoreError};

static TMP_NONCE: AtomicU64 = AtomicU64::new(0);

/// Serializes `value` to a temporary file in the destination's directory and
/// renames it into place. Readers never observe a partially written file, and
/// the previous version survives a crash mid-write. Intermediate directories
/// are created as needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| StoreError::Validation(format!("document path {} has no parent", path.display())))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| StoreError::Validation(format!("document path {} has no file name", path.display())))?
        .to_string_lossy()
        .into_owned();
    let nonce = TMP_NONCE.fetch_add(1, Ordering::Relaxed);
    let tmp = parent.join(format!(".{file_name}.tmp.{}.{nonce}", std::process::id()));

    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, &bytes)?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err.into());
    }
    Ok(())
}

/// Reads and parses a JSON document. A missing file is `Ok(None)`; a file
/// that exists but cannot be parsed is a `CorruptDocument`, never conflated
/// with "not found".
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|err| StoreError::CorruptDocument {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
}

/// Walks an entity family's partition tree
/// (`<root>/<year>/<month>/<day>/<id>/<doc>`) and returns every document
/// path, sorted for deterministic iteration. Stray files at intermediate
/// levels are skipped.
pub fn walk_documents(root: &Path, doc_name: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if !root.exists() {
        return Ok(found);
    }
    for year in subdirs(root)? {
        for month in subdirs(&year)? {
            for day in subdirs(&month)? {
                for entity in subdirs(&day)? {
                    let doc = entity.join(doc_name);
                    if doc.is_file() {
                        found.push(doc);
                    }
                }
            }
        }
    }
    found.sort();
    Ok(found)
}

pub(crate) fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(dirs),
        Err(err) => return Err(err.into()),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn read_of_missing_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let value: Option<Value> = read_json(&dir.path().join("absent.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn corrupt_document_is_not_treated_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, b"{ not json").unwrap();

        let err = read_json::<Value>(&path).unwrap_err();
        assert!(matches!(err, StoreError::CorruptDocument { .. }));
    }

    #[test]
    fn write_creates_directories_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c/doc.json");
        let doc = json!({ "id": "x-1", "amount": 12.5 });

        write_json(&path, &doc).unwrap();
        let back: Value = read_json(&path).unwrap().unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn rewrite_with_identical_content_yields_identical_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let doc = json!({ "id": "x-1", "nested": { "k": [1, 2, 3] } });

        write_json(&path, &doc).unwrap();
        let first = fs::read(&path).unwrap();
        write_json(&path, &doc).unwrap();
        let second = fs::read(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        write_json(&path, &json!({ "k": 1 })).unwrap();

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["doc.json"]);
    }
}
