use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{decode_record, filter_newest_first, HistoryRecord, HistoryStore};
use crate::error::PersistenceError;
use crate::sheets::{is_missing_sheet, rows_or_create, Worksheets};

pub const HISTORY_SHEET: &str = "History";
const HISTORY_HEADER: [&str; 4] = ["timestamp", "email", "type", "content"];

/// History kept one row per record in a `History` worksheet:
/// `[timestamp, user, type, content-json]`.
///
/// Reads are cached for `ttl`; every successful write through this store drops the cache.
pub struct SheetHistoryStore<W> {
    sheets: W,
    user: String,
    ttl: Duration,
    cache: Mutex<Option<(Instant, Vec<HistoryRecord>)>>,
}

impl<W: Worksheets> SheetHistoryStore<W> {
    pub fn new(sheets: W, user: &str, ttl: Duration) -> Self {
        Self {
            sheets,
            user: user.to_string(),
            ttl,
            cache: Mutex::new(None),
        }
    }

    fn invalidate(&self) {
        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Every parseable record, oldest first.
    fn records(&self) -> Result<Vec<HistoryRecord>, PersistenceError> {
        {
            let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some((fetched, records)) = cache.as_ref() {
                if fetched.elapsed() < self.ttl {
                    debug!("serving history from cache");
                    return Ok(records.clone());
                }
            }
        }

        let rows = rows_or_create(&self.sheets, HISTORY_SHEET, &HISTORY_HEADER)?;
        let records: Vec<HistoryRecord> = rows.iter().skip(1).filter_map(|row| parse_row(row)).collect();

        *self.cache.lock().unwrap_or_else(|e| e.into_inner()) =
            Some((Instant::now(), records.clone()));
        Ok(records)
    }

    fn to_row(&self, record: &HistoryRecord) -> Result<Vec<String>, PersistenceError> {
        let mut content = serde_json::to_value(record)?;
        if let Some(object) = content.as_object_mut() {
            object.remove("type");
        }

        Ok(vec![
            record.timestamp.clone(),
            self.user.clone(),
            record.kind().to_string(),
            serde_json::to_string(&content)?,
        ])
    }
}

/// Rebuilds a record from its row; rows that do not decode are skipped.
fn parse_row(row: &[String]) -> Option<HistoryRecord> {
    let timestamp = row.first()?;
    let kind = row.get(2)?;
    let content = row.get(3)?;

    let mut value: Value = match serde_json::from_str(content) {
        Ok(value) => value,
        Err(e) => {
            warn!("skipping history row {}: content is not JSON ({})", timestamp, e);
            return None;
        }
    };
    let object = value.as_object_mut()?;
    object.insert("timestamp".to_string(), Value::String(timestamp.clone()));
    if !kind.trim().is_empty() {
        object.insert("type".to_string(), Value::String(kind.trim().to_string()));
    }

    match decode_record(value) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!("skipping history row {}: {}", timestamp, e);
            None
        }
    }
}

impl<W: Worksheets> HistoryStore for SheetHistoryStore<W> {
    fn append(&self, record: &HistoryRecord) -> Result<(), PersistenceError> {
        let rows = [self.to_row(record)?];
        match self.sheets.append_rows(HISTORY_SHEET, &rows) {
            Ok(()) => {}
            Err(e) if is_missing_sheet(&e) => {
                debug!("worksheet '{}' missing, creating it", HISTORY_SHEET);
                self.sheets.create(HISTORY_SHEET, &HISTORY_HEADER)?;
                self.sheets.append_rows(HISTORY_SHEET, &rows)?;
            }
            Err(e) => return Err(e.into()),
        }
        self.invalidate();

        info!("saved {} record {} to worksheet", record.kind(), record.timestamp);
        Ok(())
    }

    fn read_all(&self, subject: Option<&str>) -> Result<Vec<HistoryRecord>, PersistenceError> {
        Ok(filter_newest_first(self.records()?, subject))
    }

    fn delete_by_timestamp(&self, timestamp: &str) -> Result<(), PersistenceError> {
        let Some(rows) = self.sheets.rows(HISTORY_SHEET)? else {
            warn!("no history worksheet, nothing to delete");
            return Ok(());
        };

        let found = rows
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, row)| row.first().is_some_and(|ts| ts == timestamp));

        match found {
            Some((index, _)) => {
                self.sheets.delete_row(HISTORY_SHEET, index)?;
                self.invalidate();
                info!("deleted record {} from worksheet", timestamp);
            }
            None => warn!("no record stamped {}, nothing to delete", timestamp),
        }
        Ok(())
    }
}
