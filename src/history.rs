mod file;
mod sheet;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Mutex;

use crate::error::PersistenceError;
use crate::feedback::{Feedback, Summary};
use crate::session::AttemptLogEntry;

pub use file::FileHistoryStore;
pub use sheet::SheetHistoryStore;

/// One persisted exchange: an answered question or a final summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// ISO-8601 creation time, also the delete key
    pub timestamp: String,
    pub subject: String,
    #[serde(flatten)]
    pub entry: HistoryEntry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HistoryEntry {
    Question(AnsweredQuestion),
    Summary { content: Summary },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnsweredQuestion {
    pub question_id: String,
    #[serde(default)]
    pub question_topic: String,
    #[serde(default)]
    pub question_prompt: String,
    #[serde(default)]
    pub marks: u32,
    pub student_answer: String,
    pub feedback: Feedback,
}

impl HistoryRecord {
    pub fn question(subject: &str, entry: &AttemptLogEntry) -> Self {
        Self {
            timestamp: next_timestamp(),
            subject: subject.to_string(),
            entry: HistoryEntry::Question(AnsweredQuestion {
                question_id: entry.question_id.clone(),
                question_topic: entry.topic.clone(),
                question_prompt: entry.question_text.clone(),
                marks: entry.marks,
                student_answer: entry.student_answer.clone(),
                feedback: entry.feedback.clone(),
            }),
        }
    }

    pub fn summary(subject: &str, summary: &Summary) -> Self {
        Self {
            timestamp: next_timestamp(),
            subject: subject.to_string(),
            entry: HistoryEntry::Summary {
                content: summary.clone(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self.entry {
            HistoryEntry::Question(_) => "question",
            HistoryEntry::Summary { .. } => "summary",
        }
    }

    /// Case-insensitive match over topic, answer and feedback, or over the summary text.
    pub fn matches_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        match &self.entry {
            HistoryEntry::Question(q) => {
                q.question_topic.to_lowercase().contains(&needle)
                    || q.student_answer.to_lowercase().contains(&needle)
                    || serde_json::to_string(&q.feedback)
                        .map(|f| f.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            }
            HistoryEntry::Summary { content } => serde_json::to_string(content)
                .map(|s| s.to_lowercase().contains(&needle))
                .unwrap_or(false),
        }
    }
}

/// Subject of records written before records carried one.
pub const LEGACY_SUBJECT: &str = "Chemistry";

/// Decodes one stored record.
///
/// Records without a `type` are answered questions, records without a
/// `subject` belong to [`LEGACY_SUBJECT`], and a summary stored flat has its
/// fields gathered into `content`.
pub(crate) fn decode_record(mut value: Value) -> Result<HistoryRecord, serde_json::Error> {
    if let Some(object) = value.as_object_mut() {
        for (key, fallback) in [("type", "question"), ("subject", LEGACY_SUBJECT)] {
            if object.get(key).map_or(true, Value::is_null) {
                object.insert(key.to_string(), Value::String(fallback.to_string()));
            }
        }

        if object.get("type").and_then(Value::as_str) == Some("summary")
            && !object.contains_key("content")
        {
            let content: serde_json::Map<String, Value> = object
                .iter()
                .filter(|(key, _)| !matches!(key.as_str(), "timestamp" | "type" | "subject"))
                .map(|(key, v)| (key.clone(), v.clone()))
                .collect();
            object.retain(|key, _| matches!(key.as_str(), "timestamp" | "type" | "subject"));
            object.insert("content".to_string(), Value::Object(content));
        }
    }

    serde_json::from_value(value)
}

/// Append-only record of answered questions and summaries.
pub trait HistoryStore {
    fn append(&self, record: &HistoryRecord) -> Result<(), PersistenceError>;

    /// Records newest-first, optionally limited to one subject.
    fn read_all(&self, subject: Option<&str>) -> Result<Vec<HistoryRecord>, PersistenceError>;

    /// Removes the first record stamped `timestamp`. An unknown timestamp is not an error.
    fn delete_by_timestamp(&self, timestamp: &str) -> Result<(), PersistenceError>;
}

/// A remote store whose reads fall back to the local file when the remote is unreachable.
/// Writes and deletes go to the remote only.
pub struct FallbackHistory<S> {
    primary: S,
    local: FileHistoryStore,
}

impl<S: HistoryStore> FallbackHistory<S> {
    pub fn new(primary: S, local: FileHistoryStore) -> Self {
        Self { primary, local }
    }
}

impl<S: HistoryStore> HistoryStore for FallbackHistory<S> {
    fn append(&self, record: &HistoryRecord) -> Result<(), PersistenceError> {
        self.primary.append(record)
    }

    fn read_all(&self, subject: Option<&str>) -> Result<Vec<HistoryRecord>, PersistenceError> {
        match self.primary.read_all(subject) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!("remote history unavailable ({}), reading local file", e);
                self.local.read_all(subject)
            }
        }
    }

    fn delete_by_timestamp(&self, timestamp: &str) -> Result<(), PersistenceError> {
        self.primary.delete_by_timestamp(timestamp)
    }
}

/// Filters applied on top of [`HistoryStore::read_all`].
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub subject: Option<String>,
    pub search: Option<String>,
}

impl HistoryQuery {
    pub fn run(&self, store: &dyn HistoryStore) -> Result<Vec<HistoryRecord>, PersistenceError> {
        let records = store.read_all(self.subject.as_deref())?;
        Ok(match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => records
                .into_iter()
                .filter(|record| record.matches_text(needle))
                .collect(),
            _ => records,
        })
    }
}

pub(crate) fn filter_newest_first(
    records: Vec<HistoryRecord>,
    subject: Option<&str>,
) -> Vec<HistoryRecord> {
    records
        .into_iter()
        .rev()
        .filter(|record| subject.map_or(true, |s| record.subject == s))
        .collect()
}

/// Current UTC time, strictly later than any stamp this process handed out before.
fn next_timestamp() -> String {
    static LAST: Mutex<Option<DateTime<Utc>>> = Mutex::new(None);

    let mut last = LAST.lock().unwrap_or_else(|e| e.into_inner());
    let mut now = Utc::now();
    if let Some(previous) = *last {
        if now <= previous {
            now = previous + Duration::microseconds(1);
        }
    }
    *last = Some(now);

    now.to_rfc3339_opts(SecondsFormat::Micros, true)
}
