mod file;
mod sheet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::error::{LoadError, PersistenceError};
use crate::value::get_attribute;

pub use file::FileQuestionBank;
pub(crate) use file::write_file;
pub use sheet::SheetQuestionBank;

/// Column order shared by the JSON bank, the worksheet and CSV exports.
pub const QUESTION_COLUMNS: [&str; 5] = ["id", "topic", "marks", "prompt", "answer_type"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerType {
    #[default]
    Text,
    Multiline,
}

impl AnswerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerType::Text => "text",
            AnswerType::Multiline => "multiline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// unique within its subject
    pub id: String,
    pub topic: String,
    /// maximum points, always > 0
    pub marks: u32,
    pub prompt: String,
    #[serde(default)]
    pub answer_type: AnswerType,
}

impl Question {
    /// Long prompts get a multi-line answer box even when declared as text.
    pub fn wants_multiline(&self) -> bool {
        self.answer_type == AnswerType::Multiline || self.prompt.chars().count() > 120
    }
}

/// Ordered per-subject question source.
pub trait QuestionBank {
    fn load(&self, subject: &str) -> Result<Vec<Question>, LoadError>;

    /// Replaces every question of `subject`.
    fn save(&self, subject: &str, questions: &[Question]) -> Result<(), PersistenceError>;
}

/// Lowercase, dash-separated form of a subject name, used in file and sheet names.
pub fn subject_slug(subject: &str) -> String {
    let mut slugger = github_slugger::Slugger::default();
    slugger.slug(subject.trim())
}

pub(crate) fn parse_questions(value: &Value) -> Result<Vec<Question>, LoadError> {
    let items = value.as_array().ok_or(LoadError::NotAList)?;

    let questions = items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_question(index, item))
        .collect::<Result<Vec<Question>, LoadError>>()?;

    check_unique(&questions)?;
    Ok(questions)
}

fn parse_question(index: usize, item: &Value) -> Result<Question, LoadError> {
    if !item.is_object() {
        return Err(LoadError::MissingField { index, field: "id" });
    }

    let id: String = get_attribute(item, "id")
        .filter(|id: &String| !id.is_empty())
        .ok_or(LoadError::MissingField { index, field: "id" })?;
    let topic: String =
        get_attribute(item, "topic").ok_or(LoadError::MissingField { index, field: "topic" })?;
    let prompt: String = get_attribute(item, "prompt")
        .ok_or(LoadError::MissingField { index, field: "prompt" })?;

    let raw_marks = item
        .get("marks")
        .filter(|v| !v.is_null())
        .ok_or(LoadError::MissingField { index, field: "marks" })?;
    let marks: u32 = get_attribute(item, "marks")
        .filter(|marks| *marks > 0)
        .ok_or_else(|| LoadError::InvalidMarks {
            id: id.clone(),
            value: raw_marks.to_string(),
        })?;

    let answer_type = match get_attribute::<String>(item, "answer_type").as_deref() {
        None | Some("") | Some("text") => AnswerType::Text,
        Some("multiline") => AnswerType::Multiline,
        Some(other) => {
            return Err(LoadError::InvalidAnswerType {
                id,
                value: other.to_string(),
            })
        }
    };

    Ok(Question {
        id,
        topic,
        marks,
        prompt,
        answer_type,
    })
}

fn check_unique(questions: &[Question]) -> Result<(), LoadError> {
    let mut seen = HashSet::new();
    for question in questions {
        if !seen.insert(question.id.as_str()) {
            return Err(LoadError::DuplicateId(question.id.clone()));
        }
    }
    Ok(())
}
