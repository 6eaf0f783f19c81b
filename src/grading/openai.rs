use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::{json, Value};

use super::prompt::{feedback_prompt, summary_prompt, Prompt};
use super::{GradingClient, RequestPolicy};
use crate::bank::Question;
use crate::error::{RequestError, UpstreamError};
use crate::session::AttemptLogEntry;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    pub model: String,
    pub temperature: f64,
}

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiClient {
    agent: ureq::Agent,
    api_key: String,
    base_url: String,
    feedback: ModelParams,
    summary: ModelParams,
    policy: RequestPolicy,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiClient {
    pub fn new(
        api_key: &str,
        base_url: &str,
        feedback: ModelParams,
        summary: ModelParams,
        policy: RequestPolicy,
    ) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = policy.timeout {
            builder = builder.timeout(timeout);
        }

        Self {
            agent: builder.build(),
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            feedback,
            summary,
            policy,
        }
    }

    fn payload(params: &ModelParams, prompt: &Prompt) -> Value {
        json!({
            "model": params.model,
            "temperature": params.temperature,
            "messages": [
                {"role": "system", "content": prompt.system},
                {"role": "user", "content": prompt.user},
            ],
        })
    }

    fn complete(&self, params: &ModelParams, prompt: &Prompt) -> Result<String, UpstreamError> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = Self::payload(params, prompt);

        with_retries(self.policy.max_retries, || self.send(&url, &payload))
    }

    fn send(&self, url: &str, payload: &Value) -> Result<String, UpstreamError> {
        debug!("POST {} model={}", url, payload["model"]);

        let response = self
            .agent
            .post(url)
            .set("Authorization", &format!("Bearer {}", self.api_key))
            .set("Content-Type", "application/json")
            .send_json(payload)
            .map_err(|e| match e {
                ureq::Error::Status(status @ (401 | 403), _) => {
                    UpstreamError::Unauthorized { status }
                }
                ureq::Error::Status(code, _) => RequestError::ServerError { status: code }.into(),
                other => RequestError::Http(other).into(),
            })?;

        let body: ChatResponse = response.into_json().map_err(RequestError::Io)?;

        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or(UpstreamError::NoChoices)
    }
}

/// Calls `call` until it succeeds, fails for good, or `max_retries` transient failures were retried.
fn with_retries<T>(
    max_retries: u32,
    mut call: impl FnMut() -> Result<T, UpstreamError>,
) -> Result<T, UpstreamError> {
    let mut attempt = 0;
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                warn!("grading call failed ({}), retry {} of {}", e, attempt, max_retries);
            }
            Err(e) => return Err(e),
        }
    }
}

impl GradingClient for OpenAiClient {
    fn grade_answer(
        &self,
        question: &Question,
        student_answer: &str,
        grade_level: &str,
    ) -> Result<String, UpstreamError> {
        info!("grading answer to {} with {}", question.id, self.feedback.model);
        let prompt = feedback_prompt(question, student_answer, grade_level);
        self.complete(&self.feedback, &prompt)
    }

    fn summarize_attempt(
        &self,
        attempt_log: &[AttemptLogEntry],
        grade_level: &str,
    ) -> Result<String, UpstreamError> {
        info!(
            "summarizing {} answers with {}",
            attempt_log.len(),
            self.summary.model
        );
        let prompt = summary_prompt(attempt_log, grade_level)?;
        self.complete(&self.summary, &prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_carries_model_and_messages() {
        let params = ModelParams {
            model: "gpt-4o-mini".into(),
            temperature: 0.5,
        };
        let prompt = Prompt {
            system: "sys".into(),
            user: "usr".into(),
        };

        let payload = OpenAiClient::payload(&params, &prompt);

        assert_eq!(payload["model"], "gpt-4o-mini");
        assert_eq!(payload["temperature"], 0.5);
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][1]["content"], "usr");
    }

    #[test]
    fn base_url_loses_its_trailing_slash() {
        let params = ModelParams {
            model: "m".into(),
            temperature: 0.0,
        };
        let client = OpenAiClient::new(
            "key",
            "http://localhost:8080/v1/",
            params.clone(),
            params,
            RequestPolicy::default(),
        );
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    fn busy() -> UpstreamError {
        RequestError::ServerError { status: 503 }.into()
    }

    #[test]
    fn transient_failures_are_retried_up_to_the_limit() {
        let mut calls = 0;
        let result: Result<String, _> = with_retries(2, || {
            calls += 1;
            Err(busy())
        });

        assert!(matches!(
            result,
            Err(UpstreamError::Request(RequestError::ServerError { status: 503 }))
        ));
        assert_eq!(calls, 3);
    }

    #[test]
    fn a_retry_can_succeed() {
        let mut calls = 0;
        let result = with_retries(3, || {
            calls += 1;
            if calls == 1 {
                Err(busy())
            } else {
                Ok("graded".to_string())
            }
        });

        assert_eq!(result.unwrap(), "graded");
        assert_eq!(calls, 2);
    }

    #[test]
    fn permanent_failures_are_not_retried() {
        let mut calls = 0;
        let result: Result<String, _> = with_retries(5, || {
            calls += 1;
            Err(UpstreamError::Unauthorized { status: 401 })
        });

        assert!(matches!(result, Err(UpstreamError::Unauthorized { status: 401 })));
        assert_eq!(calls, 1);
    }

    #[test]
    fn no_retries_by_default() {
        let mut calls = 0;
        let result: Result<String, _> = with_retries(RequestPolicy::default().max_retries, || {
            calls += 1;
            Err(busy())
        });

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn null_content_reads_as_empty_text() {
        let body: ChatResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        let content = body.choices.into_iter().next().unwrap().message.content;
        assert_eq!(content.unwrap_or_default(), "");
    }
}
