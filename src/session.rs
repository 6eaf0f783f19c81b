mod file;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::bank::Question;
use crate::error::{LoadError, PersistenceError, QuizError};
use crate::feedback::{Feedback, Summary};
use crate::grading::GradingClient;
use crate::history::{HistoryRecord, HistoryStore};
use crate::normalize::{normalize_feedback, normalize_summary};
use crate::score::{score, Score};

pub use file::SessionFile;

/// One graded exchange, in answering order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptLogEntry {
    pub question_id: String,
    pub topic: String,
    pub marks: u32,
    pub question_text: String,
    pub student_answer: String,
    pub feedback: Feedback,
}

/// Progress of one subject's quiz. Only [`QuizEngine`] moves it forward.
///
/// `index` never decreases except through [`QuizEngine::reset`], and every
/// question with feedback also has a recorded answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    subject: String,
    index: usize,
    #[serde(default)]
    answers: BTreeMap<String, String>,
    #[serde(default)]
    feedback: BTreeMap<String, Feedback>,
    #[serde(default)]
    attempt_log: Vec<AttemptLogEntry>,
    #[serde(default)]
    summary: Option<Summary>,
}

impl SessionState {
    pub fn new(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            index: 0,
            answers: BTreeMap::new(),
            feedback: BTreeMap::new(),
            attempt_log: Vec::new(),
            summary: None,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn answer(&self, question_id: &str) -> Option<&str> {
        self.answers.get(question_id).map(String::as_str)
    }

    pub fn feedback(&self, question_id: &str) -> Option<&Feedback> {
        self.feedback.get(question_id)
    }

    pub fn attempt_log(&self) -> &[AttemptLogEntry] {
        &self.attempt_log
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// `answered` is true once feedback exists for question `index`.
    AwaitingAnswer { index: usize, answered: bool },
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    EmptyAnswer,
    AlreadyGraded,
    QuizComplete,
}

#[derive(Debug)]
pub enum Submission {
    /// The answer was graded and committed. `warning` holds a history write
    /// that failed after the commit.
    Graded {
        feedback: Feedback,
        warning: Option<PersistenceError>,
    },
    Rejected(Rejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    Moved { index: usize },
    Completed,
    NotAnswered,
    AlreadyComplete,
}

#[derive(Debug)]
pub struct Completion {
    pub summary: Summary,
    pub score: Score,
    /// `false` when the summary came from an earlier call
    pub generated: bool,
    pub warning: Option<PersistenceError>,
}

/// Drives a [`SessionState`] through one subject's questions.
///
/// The engine keeps no state of its own; callers load the session, call one
/// operation and store the session again.
pub struct QuizEngine<'a> {
    subject: &'a str,
    questions: &'a [Question],
    grader: &'a dyn GradingClient,
    history: &'a dyn HistoryStore,
    grade_level: &'a str,
}

impl<'a> QuizEngine<'a> {
    pub fn new(
        subject: &'a str,
        questions: &'a [Question],
        grader: &'a dyn GradingClient,
        history: &'a dyn HistoryStore,
        grade_level: &'a str,
    ) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(LoadError::Empty {
                subject: subject.to_string(),
            }
            .into());
        }

        Ok(Self {
            subject,
            questions,
            grader,
            history,
            grade_level,
        })
    }

    pub fn subject(&self) -> &'a str {
        self.subject
    }

    pub fn questions(&self) -> &'a [Question] {
        self.questions
    }

    pub fn start(&self) -> SessionState {
        SessionState::new(self.subject)
    }

    fn check(&self, state: &SessionState) -> Result<(), QuizError> {
        if state.subject != self.subject {
            return Err(QuizError::SubjectMismatch {
                session: state.subject.clone(),
                engine: self.subject.to_string(),
            });
        }
        Ok(())
    }

    pub fn progress(&self, state: &SessionState) -> Result<Progress, QuizError> {
        self.check(state)?;

        Ok(match self.questions.get(state.index) {
            Some(question) => Progress::AwaitingAnswer {
                index: state.index,
                answered: state.feedback.contains_key(&question.id),
            },
            None => Progress::Complete,
        })
    }

    /// The question at the session's index, `None` once the quiz is complete.
    pub fn current_question(&self, state: &SessionState) -> Result<Option<&'a Question>, QuizError> {
        self.check(state)?;
        Ok(self.questions.get(state.index))
    }

    /// Grades `answer` for the current question.
    ///
    /// A grading failure leaves `state` untouched. A history failure after
    /// the commit comes back as a warning.
    pub fn submit(&self, state: &mut SessionState, answer: &str) -> Result<Submission, QuizError> {
        self.check(state)?;

        let Some(question) = self.questions.get(state.index) else {
            return Ok(Submission::Rejected(Rejection::QuizComplete));
        };
        if state.feedback.contains_key(&question.id) {
            return Ok(Submission::Rejected(Rejection::AlreadyGraded));
        }
        let answer = answer.trim();
        if answer.is_empty() {
            return Ok(Submission::Rejected(Rejection::EmptyAnswer));
        }

        let raw = self.grader.grade_answer(question, answer, self.grade_level)?;
        let feedback = normalize_feedback(&raw, question);

        let entry = AttemptLogEntry {
            question_id: question.id.clone(),
            topic: question.topic.clone(),
            marks: question.marks,
            question_text: question.prompt.clone(),
            student_answer: answer.to_string(),
            feedback: feedback.clone(),
        };
        let record = HistoryRecord::question(self.subject, &entry);
        state.answers.insert(question.id.clone(), answer.to_string());
        state.feedback.insert(question.id.clone(), feedback.clone());
        state.attempt_log.push(entry);
        info!(
            "{} {}: {} ({})",
            self.subject,
            question.id,
            feedback.verdict.label(),
            feedback.score_band
        );

        let warning = match self.history.append(&record) {
            Ok(()) => None,
            Err(e) => {
                warn!("could not save answer to {}: {}", question.id, e);
                Some(e)
            }
        };

        Ok(Submission::Graded { feedback, warning })
    }

    /// Moves past the current question once it has feedback.
    pub fn advance(&self, state: &mut SessionState) -> Result<Advance, QuizError> {
        self.check(state)?;

        let Some(question) = self.questions.get(state.index) else {
            return Ok(Advance::AlreadyComplete);
        };
        if !state.feedback.contains_key(&question.id) {
            return Ok(Advance::NotAnswered);
        }

        state.index += 1;
        if state.index >= self.questions.len() {
            info!("{} quiz complete", self.subject);
            Ok(Advance::Completed)
        } else {
            Ok(Advance::Moved { index: state.index })
        }
    }

    /// Summary and score of a completed quiz.
    ///
    /// The summary is generated and saved to history on the first call only;
    /// later calls return the cached one.
    pub fn complete(&self, state: &mut SessionState) -> Result<Completion, QuizError> {
        self.check(state)?;

        if state.index < self.questions.len() {
            return Err(QuizError::NotComplete {
                index: state.index,
                total: self.questions.len(),
            });
        }

        let score = score(&state.attempt_log);
        if let Some(summary) = &state.summary {
            return Ok(Completion {
                summary: summary.clone(),
                score,
                generated: false,
                warning: None,
            });
        }

        let raw = self
            .grader
            .summarize_attempt(&state.attempt_log, self.grade_level)?;
        let mut summary = normalize_summary(&raw);
        summary.subject = Some(self.subject.to_string());
        state.summary = Some(summary.clone());

        let warning = match self.history.append(&HistoryRecord::summary(self.subject, &summary)) {
            Ok(()) => None,
            Err(e) => {
                warn!("could not save {} summary: {}", self.subject, e);
                Some(e)
            }
        };

        Ok(Completion {
            summary,
            score,
            generated: true,
            warning,
        })
    }

    /// Back to the first question with every answer, feedback and summary dropped.
    pub fn reset(&self, state: &mut SessionState) -> Result<(), QuizError> {
        self.check(state)?;
        *state = self.start();
        info!("{} quiz reset", self.subject);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::AnswerType;
    use crate::error::{RequestError, UpstreamError};
    use crate::history::FileHistoryStore;
    use std::cell::Cell;

    struct Fixed {
        calls: Cell<usize>,
        fail: bool,
    }

    impl Fixed {
        fn new(fail: bool) -> Self {
            Self {
                calls: Cell::new(0),
                fail,
            }
        }
    }

    impl GradingClient for Fixed {
        fn grade_answer(&self, _: &Question, _: &str, _: &str) -> Result<String, UpstreamError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(RequestError::ServerError { status: 502 }.into());
            }
            Ok(r#"{"verdict": "Correct", "score_band": "1", "feedback": "ok"}"#.to_string())
        }

        fn summarize_attempt(&self, _: &[AttemptLogEntry], _: &str) -> Result<String, UpstreamError> {
            self.calls.set(self.calls.get() + 1);
            Ok(r#"{"overall_summary": "done"}"#.to_string())
        }
    }

    fn questions() -> Vec<Question> {
        vec![Question {
            id: "Q1".into(),
            topic: "Acids".into(),
            marks: 1,
            prompt: "Name a strong acid.".into(),
            answer_type: AnswerType::Text,
        }]
    }

    #[test]
    fn empty_bank_cannot_start() {
        let dir = tempfile::tempdir().unwrap();
        let history = FileHistoryStore::in_dir(dir.path());
        let grader = Fixed::new(false);

        let err = QuizEngine::new("Chemistry", &[], &grader, &history, "Grade 7").err().unwrap();

        assert!(matches!(err, QuizError::Load(LoadError::Empty { .. })));
    }

    #[test]
    fn answers_are_trimmed_and_graded_once() {
        let dir = tempfile::tempdir().unwrap();
        let history = FileHistoryStore::in_dir(dir.path());
        let grader = Fixed::new(false);
        let questions = questions();
        let engine = QuizEngine::new("Chemistry", &questions, &grader, &history, "Grade 7").unwrap();
        let mut state = engine.start();

        let first = engine.submit(&mut state, "  HCl \n").unwrap();
        let again = engine.submit(&mut state, "H2SO4").unwrap();

        assert!(matches!(first, Submission::Graded { warning: None, .. }));
        assert!(matches!(again, Submission::Rejected(Rejection::AlreadyGraded)));
        assert_eq!(state.answer("Q1"), Some("HCl"));
        assert_eq!(grader.calls.get(), 1);
        assert_eq!(
            engine.progress(&state).unwrap(),
            Progress::AwaitingAnswer { index: 0, answered: true }
        );
    }

    #[test]
    fn failed_grading_commits_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let history = FileHistoryStore::in_dir(dir.path());
        let grader = Fixed::new(true);
        let questions = questions();
        let engine = QuizEngine::new("Chemistry", &questions, &grader, &history, "Grade 7").unwrap();
        let mut state = engine.start();

        let err = engine.submit(&mut state, "HCl").unwrap_err();

        assert!(matches!(err, QuizError::Upstream(_)));
        assert_eq!(state, engine.start());
        assert!(history.read_all(None).unwrap().is_empty());
    }

    #[test]
    fn sessions_of_other_subjects_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let history = FileHistoryStore::in_dir(dir.path());
        let grader = Fixed::new(false);
        let questions = questions();
        let engine = QuizEngine::new("Chemistry", &questions, &grader, &history, "Grade 7").unwrap();
        let mut state = SessionState::new("Physics");

        let err = engine.advance(&mut state).unwrap_err();

        assert!(matches!(err, QuizError::SubjectMismatch { .. }));
    }

    #[test]
    fn completing_early_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let history = FileHistoryStore::in_dir(dir.path());
        let grader = Fixed::new(false);
        let questions = questions();
        let engine = QuizEngine::new("Chemistry", &questions, &grader, &history, "Grade 7").unwrap();
        let mut state = engine.start();

        let err = engine.complete(&mut state).unwrap_err();

        assert!(matches!(err, QuizError::NotComplete { index: 0, total: 1 }));
        assert_eq!(grader.calls.get(), 0);
    }

    #[test]
    fn state_survives_a_json_round_trip() {
        let mut state = SessionState::new("Chemistry");
        state.index = 1;
        state.answers.insert("Q1".into(), "HCl".into());

        let json = serde_json::to_string(&state).unwrap();
        let back: SessionState = serde_json::from_str(&json).unwrap();

        assert_eq!(back, state);
    }
}
