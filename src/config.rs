use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::bank::{FileQuestionBank, QuestionBank, SheetQuestionBank};
use crate::grading::{ModelParams, OpenAiClient, RequestPolicy, DEFAULT_BASE_URL};
use crate::history::{FallbackHistory, FileHistoryStore, HistoryStore, SheetHistoryStore};
use crate::sheets::SheetsClient;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config file is not valid YAML: {0}")]
    Parse(#[from] serde_yaml_ng::Error),

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Local,
    Remote,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" | "file" => Ok(StorageBackend::Local),
            "remote" | "sheets" => Ok(StorageBackend::Remote),
            _ => Err(ConfigError::InvalidValue {
                key: "storage_backend",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage_backend: StorageBackend,
    /// question files, the local history file and saved sessions live here
    pub data_dir: PathBuf,
    pub grade_level: String,
    /// the subject stored in plain `questions.json`
    pub default_subject: String,
    pub grading: GradingSettings,
    pub sheets: SheetSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradingSettings {
    pub base_url: String,
    pub model_feedback: String,
    pub model_summary: String,
    pub temperature_feedback: f64,
    pub temperature_summary: f64,
    pub timeout_secs: Option<u64>,
    pub max_retries: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SheetSettings {
    pub spreadsheet_id: Option<String>,
    pub history_cache_secs: u64,
    pub questions_cache_secs: u64,
    /// written into the user column of every history row
    pub user: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            storage_backend: StorageBackend::Local,
            data_dir: PathBuf::from("."),
            grade_level: String::from("Grade 7 Cambridge"),
            default_subject: String::from("Chemistry"),
            grading: GradingSettings::default(),
            sheets: SheetSettings::default(),
        }
    }
}

impl Default for GradingSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model_feedback: String::from("gpt-4o-mini"),
            model_summary: String::from("gpt-4o-mini"),
            temperature_feedback: 0.4,
            temperature_summary: 0.3,
            timeout_secs: None,
            max_retries: 0,
        }
    }
}

impl Default for SheetSettings {
    fn default() -> Self {
        Self {
            spreadsheet_id: None,
            history_cache_secs: 60,
            questions_cache_secs: 600,
            user: String::from("unknown"),
        }
    }
}

/// Credentials, taken from the environment only.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub openai_api_key: Option<String>,
    pub google_access_token: Option<String>,
}

impl Secrets {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            openai_api_key: non_empty("OPENAI_API_KEY"),
            google_access_token: non_empty("GOOGLE_ACCESS_TOKEN"),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}

fn parse_env<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

impl Settings {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(text)?)
    }

    /// Defaults, then the YAML file at `path` if given, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_yaml(&text)?
            }
            None => Self::default(),
        };

        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("QUIZ_STORAGE_BACKEND") {
            self.storage_backend = v.parse()?;
        }
        if let Some(v) = get("QUIZ_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("QUIZ_GRADE_LEVEL") {
            self.grade_level = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.grading.base_url = v;
        }
        if let Some(v) = get("OPENAI_MODEL_FEEDBACK") {
            self.grading.model_feedback = v;
        }
        if let Some(v) = get("OPENAI_MODEL_SUMMARY") {
            self.grading.model_summary = v;
        }
        if let Some(v) = get("OPENAI_TEMPERATURE_FEEDBACK") {
            self.grading.temperature_feedback = parse_env("OPENAI_TEMPERATURE_FEEDBACK", &v)?;
        }
        if let Some(v) = get("OPENAI_TEMPERATURE_SUMMARY") {
            self.grading.temperature_summary = parse_env("OPENAI_TEMPERATURE_SUMMARY", &v)?;
        }
        if let Some(v) = get("QUIZ_SHEET_ID") {
            self.sheets.spreadsheet_id = Some(v);
        }
        if let Some(v) = get("QUIZ_USER_EMAIL") {
            self.sheets.user = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grade_level.trim().is_empty() {
            return Err(ConfigError::Missing("grade_level"));
        }
        if self.default_subject.trim().is_empty() {
            return Err(ConfigError::Missing("default_subject"));
        }
        for (key, value) in [
            ("grading.temperature_feedback", self.grading.temperature_feedback),
            ("grading.temperature_summary", self.grading.temperature_summary),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key,
                    value: value.to_string(),
                });
            }
        }
        if self.storage_backend == StorageBackend::Remote && self.spreadsheet_id().is_none() {
            return Err(ConfigError::Missing("sheets.spreadsheet_id"));
        }
        Ok(())
    }

    fn spreadsheet_id(&self) -> Option<&str> {
        self.sheets
            .spreadsheet_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
    }

    pub fn request_policy(&self) -> RequestPolicy {
        RequestPolicy {
            timeout: self.grading.timeout_secs.map(Duration::from_secs),
            max_retries: self.grading.max_retries,
        }
    }

    pub fn local_history(&self) -> FileHistoryStore {
        FileHistoryStore::in_dir(&self.data_dir)
    }

    fn sheets_client(&self, secrets: &Secrets) -> Result<SheetsClient, ConfigError> {
        let id = self
            .spreadsheet_id()
            .ok_or(ConfigError::Missing("sheets.spreadsheet_id"))?;
        let token = secrets
            .google_access_token
            .as_deref()
            .ok_or(ConfigError::Missing("GOOGLE_ACCESS_TOKEN"))?;
        Ok(SheetsClient::new(id, token, self.request_policy().timeout))
    }

    pub fn question_bank(&self, secrets: &Secrets) -> Result<Box<dyn QuestionBank>, ConfigError> {
        Ok(match self.storage_backend {
            StorageBackend::Local => Box::new(FileQuestionBank::new(
                self.data_dir.clone(),
                &self.default_subject,
            )),
            StorageBackend::Remote => Box::new(SheetQuestionBank::new(
                self.sheets_client(secrets)?,
                Duration::from_secs(self.sheets.questions_cache_secs),
            )),
        })
    }

    /// The configured history store. A remote store reads from the local file when unreachable.
    pub fn history_store(&self, secrets: &Secrets) -> Result<Box<dyn HistoryStore>, ConfigError> {
        Ok(match self.storage_backend {
            StorageBackend::Local => Box::new(self.local_history()),
            StorageBackend::Remote => {
                let remote = SheetHistoryStore::new(
                    self.sheets_client(secrets)?,
                    &self.sheets.user,
                    Duration::from_secs(self.sheets.history_cache_secs),
                );
                Box::new(FallbackHistory::new(remote, self.local_history()))
            }
        })
    }

    pub fn grading_client(&self, secrets: &Secrets) -> Result<OpenAiClient, ConfigError> {
        let api_key = secrets
            .openai_api_key
            .as_deref()
            .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        Ok(OpenAiClient::new(
            api_key,
            &self.grading.base_url,
            ModelParams {
                model: self.grading.model_feedback.clone(),
                temperature: self.grading.temperature_feedback,
            },
            ModelParams {
                model: self.grading.model_summary.clone(),
                temperature: self.grading.temperature_summary,
            },
            self.request_policy(),
        ))
    }
}
