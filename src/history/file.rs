use log::{info, warn};
use serde_json::Value;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{decode_record, filter_newest_first, HistoryRecord, HistoryStore};
use crate::bank::write_file;
use crate::error::PersistenceError;

pub const HISTORY_FILE: &str = "feedback_history.json";

/// History kept as one JSON array in a local file, rewritten on every change.
pub struct FileHistoryStore {
    path: PathBuf,
}

impl FileHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The conventional history file inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(HISTORY_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored elements as written, including ones this version cannot decode.
    fn load(&self) -> Result<Vec<Value>, PersistenceError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: self.path.display().to_string(),
                    source,
                })
            }
        };

        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|source| PersistenceError::Corrupt {
            path: self.path.display().to_string(),
            source,
        })
    }

    fn store(&self, records: &[Value]) -> Result<(), PersistenceError> {
        let content = serde_json::to_string_pretty(records)?;
        write_file(&self.path, &content)
    }
}

impl HistoryStore for FileHistoryStore {
    fn append(&self, record: &HistoryRecord) -> Result<(), PersistenceError> {
        let mut records = self.load()?;
        records.push(serde_json::to_value(record)?);
        self.store(&records)?;

        info!(
            "saved {} record {} to {}",
            record.kind(),
            record.timestamp,
            self.path.display()
        );
        Ok(())
    }

    fn read_all(&self, subject: Option<&str>) -> Result<Vec<HistoryRecord>, PersistenceError> {
        let records = self
            .load()?
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match decode_record(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("skipping history entry {} in {}: {}", index, self.path.display(), e);
                    None
                }
            })
            .collect();

        Ok(filter_newest_first(records, subject))
    }

    fn delete_by_timestamp(&self, timestamp: &str) -> Result<(), PersistenceError> {
        let mut records = self.load()?;

        let found = records
            .iter()
            .position(|r| r.get("timestamp").and_then(Value::as_str) == Some(timestamp));
        match found {
            Some(index) => {
                records.remove(index);
                self.store(&records)?;
                info!("deleted record {} from {}", timestamp, self.path.display());
            }
            None => warn!("no record stamped {}, nothing to delete", timestamp),
        }
        Ok(())
    }
}
