use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Verdict {
    #[serde(rename = "Correct")]
    Correct,
    #[default]
    #[serde(rename = "Partly correct")]
    PartlyCorrect,
    #[serde(rename = "Incorrect")]
    Incorrect,
}

impl Verdict {
    /// Lenient reading of a model-written verdict ("Partly correct", "partially-correct", "WRONG", ...).
    pub fn parse(text: &str) -> Option<Verdict> {
        let key: String = text
            .chars()
            .filter(|c| c.is_alphabetic())
            .collect::<String>()
            .to_lowercase();

        match key.as_str() {
            "correct" | "right" => Some(Verdict::Correct),
            "partlycorrect" | "partiallycorrect" | "partial" | "partlyright" => {
                Some(Verdict::PartlyCorrect)
            }
            "incorrect" | "wrong" => Some(Verdict::Incorrect),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Correct => "Correct",
            Verdict::PartlyCorrect => "Partly correct",
            Verdict::Incorrect => "Incorrect",
        }
    }
}

/// Stored verdicts are read as leniently as model replies; anything unrecognised is partly correct.
impl<'de> Deserialize<'de> for Verdict {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(Verdict::parse(&text).unwrap_or_default())
    }
}

/// Points awarded for one answer, kept exactly as the grading model wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreBand {
    Number(serde_json::Number),
    Text(String),
}

impl Default for ScoreBand {
    fn default() -> Self {
        ScoreBand::Text(String::from("0"))
    }
}

impl ScoreBand {
    /// First run of digits in the band, 0 when there is none.
    pub fn points(&self) -> u32 {
        static DIGITS: OnceLock<Regex> = OnceLock::new();
        let digits = DIGITS.get_or_init(|| Regex::new(r"\d+").unwrap());

        let text = match self {
            ScoreBand::Number(n) => n.to_string(),
            ScoreBand::Text(s) => s.clone(),
        };

        digits
            .find(&text)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
    }
}

impl std::fmt::Display for ScoreBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreBand::Number(n) => write!(f, "{}", n),
            ScoreBand::Text(s) => write!(f, "{}", s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoLink {
    pub query: String,
    pub url: String,
}

/// Structured grading of one answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(default)]
    pub verdict: Verdict,

    /// points awarded, not clamped to the question's marks
    #[serde(default)]
    pub score_band: ScoreBand,

    /// short supportive feedback
    #[serde(default)]
    pub feedback: String,

    #[serde(default)]
    pub model_answer: String,

    /// detailed explanation; holds the raw reply when it could not be parsed
    #[serde(default)]
    pub why: String,

    #[serde(default)]
    pub misconceptions: Vec<String>,

    #[serde(default)]
    pub next_steps: Vec<String>,

    #[serde(default)]
    pub video_queries: Vec<String>,

    /// derived from the first video queries
    #[serde(default)]
    pub video_links: Vec<VideoLink>,
}

/// Learning-plan summary of a whole attempt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Summary {
    pub overall_summary: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub gaps: Vec<String>,
    #[serde(default)]
    pub misconceptions_to_fix: Vec<String>,
    #[serde(default)]
    pub key_learning_points: Vec<String>,
    #[serde(default)]
    pub recommended_next_topics: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// unparsed model reply, only set when the reply was not valid JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_take_the_first_digit_run() {
        assert_eq!(ScoreBand::Text("2".into()).points(), 2);
        assert_eq!(ScoreBand::Text("not sure, maybe 1".into()).points(), 1);
        assert_eq!(ScoreBand::Text("".into()).points(), 0);
        assert_eq!(ScoreBand::Text("2/3".into()).points(), 2);
        assert_eq!(ScoreBand::Number(3.into()).points(), 3);
        assert_eq!(ScoreBand::Number((-1).into()).points(), 1);
        assert_eq!(ScoreBand::Text("99999999999999999999".into()).points(), u32::MAX);
    }

    #[test]
    fn verdict_parsing_is_lenient() {
        assert_eq!(Verdict::parse("Correct"), Some(Verdict::Correct));
        assert_eq!(Verdict::parse("Partly correct"), Some(Verdict::PartlyCorrect));
        assert_eq!(Verdict::parse("partially-correct"), Some(Verdict::PartlyCorrect));
        assert_eq!(Verdict::parse(" INCORRECT "), Some(Verdict::Incorrect));
        assert_eq!(Verdict::parse("Correct|Partly correct|Incorrect"), None);
    }

    #[test]
    fn verdict_serializes_with_spaces() {
        let json = serde_json::to_string(&Verdict::PartlyCorrect).unwrap();
        assert_eq!(json, "\"Partly correct\"");
        let back: Verdict = serde_json::from_str("\"PartlyCorrect\"").unwrap();
        assert_eq!(back, Verdict::PartlyCorrect);
    }

    #[test]
    fn stored_verdicts_are_read_leniently() {
        let read = |json: &str| serde_json::from_str::<Verdict>(json).unwrap();

        assert_eq!(read("\"Partially correct\""), Verdict::PartlyCorrect);
        assert_eq!(read("\"wrong\""), Verdict::Incorrect);
        assert_eq!(read("\"Correct\""), Verdict::Correct);
        assert_eq!(read("\"no idea\""), Verdict::PartlyCorrect);
        assert_eq!(read("null"), Verdict::PartlyCorrect);
    }

    #[test]
    fn sparse_feedback_fills_in_defaults() {
        let feedback: Feedback = serde_json::from_str(r#"{"verdict": "Incorrect"}"#).unwrap();

        assert_eq!(feedback.verdict, Verdict::Incorrect);
        assert_eq!(feedback.score_band, ScoreBand::default());
        assert!(feedback.feedback.is_empty());
        assert!(feedback.model_answer.is_empty());
        assert!(feedback.why.is_empty());
    }

    #[test]
    fn score_band_keeps_its_json_shape() {
        let number: ScoreBand = serde_json::from_str("2").unwrap();
        let text: ScoreBand = serde_json::from_str("\"2\"").unwrap();
        assert_eq!(number, ScoreBand::Number(2.into()));
        assert_eq!(text, ScoreBand::Text("2".into()));
        assert_eq!(serde_json::to_string(&number).unwrap(), "2");
    }
}
