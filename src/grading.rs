mod openai;
mod prompt;

use std::time::Duration;

use crate::bank::Question;
use crate::error::UpstreamError;
use crate::session::AttemptLogEntry;

pub use openai::{ModelParams, OpenAiClient, DEFAULT_BASE_URL};
pub use prompt::{feedback_prompt, summary_prompt, Prompt};

/// One blocking exchange with the grading model. Replies are returned raw;
/// [`crate::normalize`] owns their interpretation.
pub trait GradingClient {
    fn grade_answer(
        &self,
        question: &Question,
        student_answer: &str,
        grade_level: &str,
    ) -> Result<String, UpstreamError>;

    fn summarize_attempt(
        &self,
        attempt_log: &[AttemptLogEntry],
        grade_level: &str,
    ) -> Result<String, UpstreamError>;
}

/// Timeout and retry behaviour of a grading client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestPolicy {
    /// `None` leaves the transport's own timeouts in charge
    pub timeout: Option<Duration>,
    /// extra attempts after a transient failure
    pub max_retries: u32,
}
