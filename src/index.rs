use std::{collections::BTreeMap, path::PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::{
    document,
    error::{Result, StoreError},
    paths::Family,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    /// Partition path relative to the data directory, forward slashes.
    pub path: String,
    pub created_at: DateTime<Utc>,
}

/// The id→path lookup table for one entity family, backed by a single flat
/// JSON file written through the atomic primitive.
///
/// In-process read-modify-write is serialized by a mutex. Concurrent writers
/// from other processes can still drop an update; that drift is accepted and
/// repaired by `rebuild`, never by locking.
pub struct FamilyIndex {
    data_dir: PathBuf,
    family: Family,
    write_lock: Mutex<()>,
}

impl FamilyIndex {
    pub fn open(data_dir: PathBuf, family: Family) -> Self {
        Self {
            data_dir,
            family,
            write_lock: Mutex::new(()),
        }
    }

    fn index_path(&self) -> PathBuf {
        self.family.index_path(&self.data_dir)
    }

    pub fn load(&self) -> Result<BTreeMap<String, IndexEntry>> {
        Ok(document::read_json(&self.index_path())?.unwrap_or_default())
    }

    pub fn lookup(&self, id: &str) -> Result<Option<IndexEntry>> {
        Ok(self.load()?.remove(id))
    }

    pub fn upsert(&self, id: &str, path: String, created_at: DateTime<Utc>) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load()?;
        entries.insert(id.to_string(), IndexEntry { path, created_at });
        document::write_json(&self.index_path(), &entries)
    }

    /// Regenerates the index from a full directory walk. Idempotent, needs
    /// no downtime: readers that miss here fall back to the walk themselves.
    /// Returns the number of entries written.
    pub fn rebuild(&self) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let family_dir = self.family.dir(&self.data_dir);
        let mut entries = BTreeMap::new();

        for doc_path in document::walk_documents(&family_dir, self.family.doc_name())? {
            let value: Value = match document::read_json(&doc_path)? {
                Some(value) => value,
                None => continue,
            };
            let Some((id, created_at)) = identity_of(&value) else {
                warn!(
                    family = %self.family,
                    path = %doc_path.display(),
                    "skipping document without id/createdAt during index rebuild"
                );
                continue;
            };
            let relative = doc_path
                .strip_prefix(&self.data_dir)
                .map_err(|_| {
                    StoreError::Validation(format!(
                        "document {} lies outside the data directory",
                        doc_path.display()
                    ))
                })?
                .to_string_lossy()
                .replace('\\', "/");
            entries.insert(
                id,
                IndexEntry {
                    path: relative,
                    created_at,
                },
            );
        }

        let count = entries.len();
        document::write_json(&self.index_path(), &entries)?;
        Ok(count)
    }
}

/// Extracts (id, createdAt) from a raw document, tolerating unknown fields.
pub(crate) fn identity_of(value: &Value) -> Option<(String, DateTime<Utc>)> {
    let id = value.get("id")?.as_str()?.to_string();
    let created_at = value
        .get("createdAt")?
        .as_str()?
        .parse::<DateTime<Utc>>()
        .ok()?;
    Some((id, created_at))
}
