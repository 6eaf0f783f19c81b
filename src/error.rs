use thiserror::Error;

/// Failure talking to a remote HTTP service (grading model or spreadsheet).
#[derive(Error, Debug)]
pub enum RequestError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] ureq::Error),

    #[error("Failed to read response body: {0}")]
    Io(#[from] std::io::Error),

    #[error("Server returned an error: {status}")]
    ServerError { status: u16 },

    #[error("Unexpected response: {0}")]
    Malformed(String),
}

/// The question source could not produce a usable question list.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read question source {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("question source is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("question source must be a list of questions")]
    NotAList,

    #[error("question {index} must set '{field}'")]
    MissingField { index: usize, field: &'static str },

    #[error("question '{id}' has invalid marks '{value}', expected a positive integer")]
    InvalidMarks { id: String, value: String },

    #[error("question '{id}' has unknown answer type '{value}'")]
    InvalidAnswerType { id: String, value: String },

    #[error("question id '{0}' appears more than once")]
    DuplicateId(String),

    #[error("no questions found for {subject}")]
    Empty { subject: String },

    #[error("failed to fetch questions: {0}")]
    Remote(#[from] RequestError),
}

/// The grading model could not be reached or refused the call.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("grading request failed: {0}")]
    Request(#[from] RequestError),

    #[error("grading service rejected the credentials (status {status})")]
    Unauthorized { status: u16 },

    #[error("grading reply contained no choices")]
    NoChoices,

    #[error("failed to encode grading request: {0}")]
    Encode(#[from] serde_json::Error),
}

impl UpstreamError {
    /// Transport failures, rate limits and 5xx replies may succeed when sent again.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Request(RequestError::Http(_)) => true,
            UpstreamError::Request(RequestError::ServerError { status }) => {
                *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}

/// A history or question write (or a history read) failed.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} does not hold a valid record list: {source}")]
    Corrupt {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("remote store request failed: {0}")]
    Remote(#[from] RequestError),
}

/// Errors surfaced by the quiz engine to its caller.
#[derive(Error, Debug)]
pub enum QuizError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("session belongs to '{session}' but the engine drives '{engine}'")]
    SubjectMismatch { session: String, engine: String },

    #[error("quiz is not complete yet ({index} of {total} questions done)")]
    NotComplete { index: usize, total: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_rate_limits_are_transient() {
        let busy = UpstreamError::Request(RequestError::ServerError { status: 503 });
        let limited = UpstreamError::Request(RequestError::ServerError { status: 429 });
        let bad = UpstreamError::Request(RequestError::ServerError { status: 400 });

        assert!(busy.is_transient());
        assert!(limited.is_transient());
        assert!(!bad.is_transient());
        assert!(!UpstreamError::Unauthorized { status: 401 }.is_transient());
        assert!(!UpstreamError::NoChoices.is_transient());
    }
}
