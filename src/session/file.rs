use log::debug;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::SessionState;
use crate::bank::{subject_slug, write_file};
use crate::error::PersistenceError;

/// Sessions kept between invocations, one JSON file per subject under `<data_dir>/sessions`.
pub struct SessionFile {
    dir: PathBuf,
}

impl SessionFile {
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("sessions"),
        }
    }

    pub fn path_for(&self, subject: &str) -> PathBuf {
        self.dir.join(format!("{}.json", subject_slug(subject)))
    }

    /// The stored session for `subject`, or a fresh one when none was saved.
    pub fn load(&self, subject: &str) -> Result<SessionState, PersistenceError> {
        let path = self.path_for(subject);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no saved {} session, starting fresh", subject);
                return Ok(SessionState::new(subject));
            }
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        serde_json::from_str(&content).map_err(|source| PersistenceError::Corrupt {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, state: &SessionState) -> Result<(), PersistenceError> {
        let content = serde_json::to_string_pretty(state)?;
        write_file(&self.path_for(state.subject()), &content)
    }
}
