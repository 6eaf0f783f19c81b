use serde::{Deserialize, Serialize};

use crate::bank::{subject_slug, QUESTION_COLUMNS};
use crate::feedback::Summary;
use crate::history::HistoryRecord;
use crate::session::{AttemptLogEntry, SessionState};

pub const NEXT_QUIZ_PROMPT_FILE: &str = "teacher_prompt_next_quiz.txt";

/// Everything a finished quiz produced, as offered for download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsBundle {
    pub subject: String,
    pub qa_log: Vec<AttemptLogEntry>,
    pub final_summary: Option<Summary>,
}

impl ResultsBundle {
    pub fn from_session(state: &SessionState) -> Self {
        Self {
            subject: state.subject().to_string(),
            qa_log: state.attempt_log().to_vec(),
            final_summary: state.summary().cloned(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn file_name(&self) -> String {
        format!("{}_quiz_results.json", subject_slug(&self.subject))
    }
}

/// Prompt asking a model for a follow-up question set built from the student's history.
///
/// Returns `None` when there is no history to base it on.
pub fn next_quiz_prompt(history: &[HistoryRecord]) -> Result<Option<String>, serde_json::Error> {
    if history.is_empty() {
        return Ok(None);
    }

    let keys = QUESTION_COLUMNS
        .iter()
        .map(|key| format!("\"{}\"", key))
        .collect::<Vec<_>>()
        .join(", ");

    let mut prompt = String::from(
        "You are an expert Cambridge science tutor.\n\
         Below is the history of a student's recent quiz attempts in JSON format.\n\n\
         Look through it for:\n\
         1. Misconceptions that keep coming back.\n\
         2. Topics with low scores.\n\
         3. The kinds of question they miss (recall or application).\n\n\
         Then write a new set of 10-15 questions tailored to this student.\n\
         - Concentrate on the weak areas.\n\
         - Mix easy and harder questions.\n",
    );
    prompt.push_str(&format!(
        "- Reply with a JSON list of objects with the keys {}.\n\n",
        keys
    ));
    prompt.push_str("Student history JSON:\n");
    prompt.push_str(&serde_json::to_string_pretty(history)?);

    Ok(Some(prompt))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_file_name_uses_subject_slug() {
        let bundle = ResultsBundle::from_session(&SessionState::new("Earth Science"));

        assert_eq!(bundle.file_name(), "earth-science_quiz_results.json");
        let value: serde_json::Value = serde_json::from_str(&bundle.to_json().unwrap()).unwrap();
        assert_eq!(value["subject"], "Earth Science");
        assert!(value["qa_log"].as_array().unwrap().is_empty());
        assert!(value["final_summary"].is_null());
    }

    #[test]
    fn no_history_means_no_prompt() {
        assert_eq!(next_quiz_prompt(&[]).unwrap(), None);
    }

    #[test]
    fn prompt_embeds_history_and_bank_format() {
        let summary = Summary {
            overall_summary: "struggles with moles".into(),
            ..Summary::default()
        };
        let history = vec![HistoryRecord::summary("Chemistry", &summary)];

        let prompt = next_quiz_prompt(&history).unwrap().unwrap();

        assert!(prompt.contains("10-15 questions"));
        assert!(prompt.contains("\"id\", \"topic\", \"marks\", \"prompt\", \"answer_type\""));
        assert!(prompt.contains("struggles with moles"));
        assert!(prompt.contains(&history[0].timestamp));
    }
}
