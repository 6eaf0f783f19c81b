use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use super::{parse_questions, subject_slug, Question, QuestionBank};
use crate::error::{LoadError, PersistenceError};

/// Questions stored as one JSON array per subject inside a directory.
///
/// The default subject lives in `questions.json`, every other subject in
/// `questions_<slug>.json`.
pub struct FileQuestionBank {
    dir: PathBuf,
    default_subject: String,
}

impl FileQuestionBank {
    pub fn new(dir: impl Into<PathBuf>, default_subject: &str) -> Self {
        Self {
            dir: dir.into(),
            default_subject: default_subject.to_string(),
        }
    }

    pub fn path_for(&self, subject: &str) -> PathBuf {
        if subject.trim().eq_ignore_ascii_case(self.default_subject.trim()) {
            self.dir.join("questions.json")
        } else {
            self.dir.join(format!("questions_{}.json", subject_slug(subject)))
        }
    }
}

impl QuestionBank for FileQuestionBank {
    fn load(&self, subject: &str) -> Result<Vec<Question>, LoadError> {
        let path = self.path_for(subject);
        debug!("loading {} questions from {}", subject, path.display());

        let content = fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let value: serde_json::Value = serde_json::from_str(&content)?;

        parse_questions(&value)
    }

    fn save(&self, subject: &str, questions: &[Question]) -> Result<(), PersistenceError> {
        let path = self.path_for(subject);
        let content = serde_json::to_string_pretty(questions)?;
        write_file(&path, &content)?;

        info!(
            "saved {} {} questions to {}",
            questions.len(),
            subject,
            path.display()
        );
        Ok(())
    }
}

/// Writes through a sibling temp file so readers never see a half-written file.
pub(crate) fn write_file(path: &Path, content: &str) -> Result<(), PersistenceError> {
    let io_error = |source| PersistenceError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(io_error)?;
    fs::rename(&tmp, path).map_err(io_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::AnswerType;

    fn question(id: &str) -> Question {
        Question {
            id: id.to_string(),
            topic: "Atoms".to_string(),
            marks: 2,
            prompt: format!("prompt {id}"),
            answer_type: AnswerType::Text,
        }
    }

    #[test]
    fn default_subject_uses_the_plain_file_name() {
        let bank = FileQuestionBank::new("/data", "Chemistry");
        assert_eq!(bank.path_for("Chemistry"), PathBuf::from("/data/questions.json"));
        assert_eq!(
            bank.path_for("Physics"),
            PathBuf::from("/data/questions_physics.json")
        );
    }

    #[test]
    fn save_then_load_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let bank = FileQuestionBank::new(dir.path(), "Chemistry");
        let questions = vec![question("Q3"), question("Q1"), question("Q2")];

        bank.save("Biology", &questions).unwrap();
        let loaded = bank.load("Biology").unwrap();

        assert_eq!(loaded, questions);
        assert!(dir.path().join("questions_biology.json").exists());
    }

    #[test]
    fn missing_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let bank = FileQuestionBank::new(dir.path(), "Chemistry");

        let err = bank.load("Chemistry").unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    #[test]
    fn malformed_json_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("questions.json"), "[{\"id\": ").unwrap();
        let bank = FileQuestionBank::new(dir.path(), "Chemistry");

        let err = bank.load("Chemistry").unwrap_err();
        assert!(matches!(err, LoadError::Json(_)));
    }
}
