pub mod bank;
pub mod config;
pub mod error;
pub mod export;
pub mod feedback;
pub mod grading;
pub mod history;
pub mod normalize;
pub mod score;
pub mod session;
pub mod sheets;
mod value;

pub use bank::{Question, QuestionBank};
pub use error::{LoadError, PersistenceError, QuizError, UpstreamError};
pub use grading::GradingClient;
pub use history::{HistoryRecord, HistoryStore};
pub use session::{QuizEngine, SessionState};
