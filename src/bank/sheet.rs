use log::{debug, info};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{parse_questions, Question, QuestionBank, QUESTION_COLUMNS};
use crate::error::{LoadError, PersistenceError};
use crate::sheets::{rows_or_create, Worksheets};

/// Questions kept in one `Questions_<subject>` worksheet per subject.
///
/// Reads are cached per subject for `ttl`; `save` drops the subject's entry.
pub struct SheetQuestionBank<W> {
    sheets: W,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Instant, Vec<Question>)>>,
}

impl<W: Worksheets> SheetQuestionBank<W> {
    pub fn new(sheets: W, ttl: Duration) -> Self {
        Self {
            sheets,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn worksheet_title(subject: &str) -> String {
        format!("Questions_{}", subject.trim())
    }

    fn cached(&self, subject: &str) -> Option<Vec<Question>> {
        let cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .get(subject)
            .filter(|(fetched, _)| fetched.elapsed() < self.ttl)
            .map(|(_, questions)| questions.clone())
    }

    fn remember(&self, subject: &str, questions: &[Question]) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.insert(subject.to_string(), (Instant::now(), questions.to_vec()));
    }

    fn forget(&self, subject: &str) {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.remove(subject);
    }
}

/// Turns header + rows into the JSON list shape the file bank reads.
fn rows_to_value(rows: &[Vec<String>]) -> Value {
    let Some((header, body)) = rows.split_first() else {
        return Value::Array(Vec::new());
    };

    let items = body
        .iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| {
            let object: Map<String, Value> = header
                .iter()
                .zip(row.iter())
                .filter(|(_, cell)| !cell.is_empty())
                .map(|(key, cell)| (key.trim().to_string(), Value::String(cell.clone())))
                .collect();
            Value::Object(object)
        })
        .collect();

    Value::Array(items)
}

impl<W: Worksheets> QuestionBank for SheetQuestionBank<W> {
    fn load(&self, subject: &str) -> Result<Vec<Question>, LoadError> {
        if let Some(questions) = self.cached(subject) {
            debug!("serving {} questions from cache", subject);
            return Ok(questions);
        }

        let title = Self::worksheet_title(subject);
        let rows = rows_or_create(&self.sheets, &title, &QUESTION_COLUMNS)?;
        let questions = parse_questions(&rows_to_value(&rows))?;

        self.remember(subject, &questions);
        Ok(questions)
    }

    fn save(&self, subject: &str, questions: &[Question]) -> Result<(), PersistenceError> {
        let title = Self::worksheet_title(subject);

        let mut rows: Vec<Vec<String>> = Vec::with_capacity(questions.len() + 1);
        if self.sheets.rows(&title)?.is_some() {
            self.sheets.clear(&title)?;
            rows.push(QUESTION_COLUMNS.iter().map(|c| c.to_string()).collect());
        } else {
            self.sheets.create(&title, &QUESTION_COLUMNS)?;
        }

        rows.extend(questions.iter().map(|q| {
            vec![
                q.id.clone(),
                q.topic.clone(),
                q.marks.to_string(),
                q.prompt.clone(),
                q.answer_type.as_str().to_string(),
            ]
        }));
        self.sheets.append_rows(&title, &rows)?;
        self.forget(subject);

        info!("saved {} {} questions to worksheet {}", questions.len(), subject, title);
        Ok(())
    }
}
