pub mod gateway;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{
    document,
    error::{Result, StoreError},
    paths::MONTH_NAMES,
};

const FINGERPRINT_SEP: char = '\u{1f}';

/// An append-only notification record. Never mutated after creation; read
/// state is a projection maintained elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    /// The idempotency fingerprint of `(type, entityId, targetId)`; the
    /// same fact for the same audience always produces the same id.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub actor_id: String,
    pub target_id: String,
    pub entity_type: String,
    pub entity_id: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub context: Value,
}

/// Deterministic event identity: duplicate emission attempts for the same
/// fact/audience pair collide on this key and are skippable.
pub fn fingerprint(event_type: &str, entity_id: &str, target_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_type.as_bytes());
    hasher.update(FINGERPRINT_SEP.to_string().as_bytes());
    hasher.update(entity_id.as_bytes());
    hasher.update(FINGERPRINT_SEP.to_string().as_bytes());
    hasher.update(target_id.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub actor_id: Option<String>,
    pub target_id: Option<String>,
    pub event_type: Option<String>,
    pub project_id: Option<String>,
    /// Inclusive date bounds for the partition walk. Defaults to today so
    /// an unbounded filter cannot walk the whole log.
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

impl EventFilter {
    fn matches(&self, event: &NotificationEvent) -> bool {
        if let Some(actor_id) = &self.actor_id {
            if &event.actor_id != actor_id {
                return false;
            }
        }
        if let Some(target_id) = &self.target_id {
            if &event.target_id != target_id {
                return false;
            }
        }
        if let Some(event_type) = &self.event_type {
            if &event.event_type != event_type {
                return false;
            }
        }
        if let Some(project_id) = &self.project_id {
            let in_metadata = event.metadata.get("projectId").and_then(Value::as_str)
                == Some(project_id.as_str());
            if !in_metadata {
                return false;
            }
        }
        true
    }
}

/// One file per event under
/// `events/<year>/<month-name>/<day>/<type>/<eventId>.json`. Partitioning
/// by type keeps reads from loading unrelated event kinds.
pub struct NotificationStore {
    root: PathBuf,
}

impl NotificationStore {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            root: data_dir.join("notifications").join("events"),
        }
    }

    fn day_dir(&self, date: NaiveDate) -> PathBuf {
        self.root
            .join(format!("{:04}", date.year()))
            .join(MONTH_NAMES[date.month0() as usize])
            .join(format!("{:02}", date.day()))
    }

    fn event_path(&self, event: &NotificationEvent) -> PathBuf {
        self.day_dir(event.timestamp.date_naive())
            .join(&event.event_type)
            .join(format!("{}.json", event.id))
    }

    /// Appends one event file. The store does not deduplicate; callers
    /// check `exists` with the event's fingerprint first.
    pub fn append(&self, event: &NotificationEvent) -> Result<()> {
        if event.id.is_empty() || event.event_type.is_empty() {
            return Err(StoreError::Validation(
                "notification events need an id and a type".into(),
            ));
        }
        if event.target_id.is_empty() {
            return Err(StoreError::Validation(
                "notification events need a target".into(),
            ));
        }
        document::write_json(&self.event_path(event), event)
    }

    /// Whether an event with this fingerprint was ever appended for the
    /// given type. Scans the type's partitions across all dates, since a
    /// retried fact may have been recorded on an earlier day.
    pub fn exists(&self, event_type: &str, fingerprint: &str) -> Result<bool> {
        let file_name = format!("{fingerprint}.json");
        // Most duplicates arrive the same day the original was recorded;
        // probe today's partition before the full scan.
        if self
            .day_dir(Utc::now().date_naive())
            .join(event_type)
            .join(&file_name)
            .is_file()
        {
            return Ok(true);
        }
        for year in document::subdirs(&self.root)? {
            for month in document::subdirs(&year)? {
                for day in document::subdirs(&month)? {
                    if day.join(event_type).join(&file_name).is_file() {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Walks the partitions inside the filter's date range (today when
    /// unspecified) and filters in memory.
    pub fn list(&self, filter: &EventFilter) -> Result<Vec<NotificationEvent>> {
        let today = Utc::now().date_naive();
        let (start, end) = filter.date_range.unwrap_or((today, today));
        if start > end {
            return Err(StoreError::Validation(
                "event filter date range is inverted".into(),
            ));
        }

        let mut events = Vec::new();
        let mut date = start;
        while date <= end {
            let day_dir = self.day_dir(date);
            for type_dir in document::subdirs(&day_dir)? {
                if let Some(wanted) = &filter.event_type {
                    if type_dir.file_name().and_then(|n| n.to_str()) != Some(wanted.as_str()) {
                        continue;
                    }
                }
                let mut files: Vec<_> = std::fs::read_dir(&type_dir)?
                    .collect::<std::io::Result<Vec<_>>>()?
                    .into_iter()
                    .map(|entry| entry.path())
                    .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
                    .collect();
                files.sort();
                for path in files {
                    if let Some(event) = document::read_json::<NotificationEvent>(&path)? {
                        if filter.matches(&event) {
                            events.push(event);
                        }
                    }
                }
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(events)
    }
}
