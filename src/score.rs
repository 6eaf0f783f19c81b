use serde::{Deserialize, Serialize};
use std::fmt;

use crate::session::AttemptLogEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub achieved: u32,
    pub possible: u32,
    /// rounded down; `None` when nothing could be scored
    pub percent: Option<u32>,
}

/// Sums the points each entry's score band reports against the question marks.
///
/// Bands are taken as written: a band above its question's marks is not capped.
pub fn score(attempt_log: &[AttemptLogEntry]) -> Score {
    let achieved: u64 = attempt_log
        .iter()
        .map(|entry| u64::from(entry.feedback.score_band.points()))
        .sum();
    let possible: u64 = attempt_log.iter().map(|entry| u64::from(entry.marks)).sum();

    let percent = (possible > 0).then(|| achieved * 100 / possible);

    Score {
        achieved: saturate(achieved),
        possible: saturate(possible),
        percent: percent.map(saturate),
    }
}

fn saturate(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent {
            Some(percent) => write!(f, "{}/{} ({}%)", self.achieved, self.possible, percent),
            None => write!(f, "{}/{}", self.achieved, self.possible),
        }
    }
}
