//! Turns raw grading-model replies into [`Feedback`] and [`Summary`] records.
//!
//! Nothing downstream looks at model text directly. Neither function fails: a
//! reply that is not a JSON object becomes a fallback record carrying the raw
//! text.

use log::{debug, warn};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::bank::Question;
use crate::feedback::{Feedback, ScoreBand, Summary, Verdict, VideoLink};
use crate::value::{get_text, get_text_list};

pub const VIDEO_SEARCH_URL: &str = "https://www.youtube.com/results?search_query=";
pub const MAX_VIDEO_LINKS: usize = 6;

pub const UNPARSED_FEEDBACK: &str =
    "Feedback could not be parsed as JSON. Showing raw response below.";
pub const UNPARSED_SUMMARY: &str = "Summary could not be parsed as JSON. Raw output provided.";

/// Removes surrounding markdown code fences (```` ```json ```` or ```` ``` ````).
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// A non-empty JSON object, or nothing.
fn decode_object(raw: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(strip_code_fence(raw)) {
        Ok(value) if value.as_object().is_some_and(|o| !o.is_empty()) => Some(value),
        Ok(_) => None,
        Err(e) => {
            debug!("grading reply is not JSON: {}", e);
            None
        }
    }
}

pub fn video_search_url(query: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").unwrap());

    format!(
        "{}{}",
        VIDEO_SEARCH_URL,
        whitespace.replace_all(query.trim(), "+")
    )
}

pub fn video_links(queries: &[String]) -> Vec<VideoLink> {
    queries
        .iter()
        .take(MAX_VIDEO_LINKS)
        .map(|query| VideoLink {
            query: query.clone(),
            url: video_search_url(query),
        })
        .collect()
}

fn score_band(value: Option<&Value>) -> ScoreBand {
    match value {
        Some(Value::Number(n)) => ScoreBand::Number(n.clone()),
        Some(Value::String(s)) => ScoreBand::Text(s.clone()),
        Some(Value::Null) | None => ScoreBand::default(),
        Some(other) => ScoreBand::Text(other.to_string()),
    }
}

pub fn normalize_feedback(raw: &str, question: &Question) -> Feedback {
    let Some(value) = decode_object(raw) else {
        warn!(
            "feedback for question {} could not be parsed, keeping raw reply",
            question.id
        );
        return Feedback {
            verdict: Verdict::PartlyCorrect,
            score_band: ScoreBand::Text(String::from("0")),
            feedback: UNPARSED_FEEDBACK.to_string(),
            model_answer: String::new(),
            why: raw.to_string(),
            misconceptions: Vec::new(),
            next_steps: Vec::new(),
            video_queries: Vec::new(),
            video_links: Vec::new(),
        };
    };

    let verdict_text = get_text(&value, "verdict");
    let verdict = Verdict::parse(&verdict_text).unwrap_or_else(|| {
        warn!(
            "unknown verdict '{}' for question {}, treating as partly correct",
            verdict_text, question.id
        );
        Verdict::PartlyCorrect
    });

    let score_band = score_band(value.get("score_band"));
    if score_band.points() > question.marks {
        warn!(
            "score band '{}' exceeds {} marks for question {}",
            score_band, question.marks, question.id
        );
    }

    let video_queries = get_text_list(&value, "video_queries");

    Feedback {
        verdict,
        score_band,
        feedback: get_text(&value, "feedback"),
        model_answer: get_text(&value, "model_answer"),
        why: get_text(&value, "why"),
        misconceptions: get_text_list(&value, "misconceptions"),
        next_steps: get_text_list(&value, "next_steps"),
        video_links: video_links(&video_queries),
        video_queries,
    }
}

pub fn normalize_summary(raw: &str) -> Summary {
    let Some(value) = decode_object(raw) else {
        warn!("summary could not be parsed, keeping raw reply");
        return Summary {
            overall_summary: UNPARSED_SUMMARY.to_string(),
            raw: Some(raw.to_string()),
            ..Summary::default()
        };
    };

    Summary {
        overall_summary: get_text(&value, "overall_summary"),
        strengths: get_text_list(&value, "strengths"),
        gaps: get_text_list(&value, "gaps"),
        misconceptions_to_fix: get_text_list(&value, "misconceptions_to_fix"),
        key_learning_points: get_text_list(&value, "key_learning_points"),
        recommended_next_topics: get_text_list(&value, "recommended_next_topics"),
        subject: None,
        raw: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::AnswerType;

    fn question(marks: u32) -> Question {
        Question {
            id: "Q1".into(),
            topic: "Atomic structure".into(),
            marks,
            prompt: "Describe the gold foil experiment.".into(),
            answer_type: AnswerType::Multiline,
        }
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }

    #[test]
    fn video_url_joins_words_with_plus() {
        let url = video_search_url("gold foil experiment");
        assert!(url.ends_with("search_query=gold+foil+experiment"));
        assert_eq!(
            video_search_url("  atoms \t and\n ions "),
            format!("{VIDEO_SEARCH_URL}atoms+and+ions")
        );
    }

    #[test]
    fn parses_a_fenced_reply() {
        let raw = r#"```json
{
  "verdict": "Correct",
  "score_band": "2",
  "feedback": "Well done.",
  "model_answer": "Alpha particles...",
  "why": "Because...",
  "misconceptions": [],
  "next_steps": ["Review isotopes"],
  "video_queries": ["gold foil experiment", "rutherford model"]
}
```"#;

        let feedback = normalize_feedback(raw, &question(2));

        assert_eq!(feedback.verdict, Verdict::Correct);
        assert_eq!(feedback.score_band, ScoreBand::Text("2".into()));
        assert_eq!(feedback.next_steps, vec!["Review isotopes"]);
        assert_eq!(feedback.video_links.len(), 2);
        assert_eq!(feedback.video_links[1].query, "rutherford model");
        assert!(feedback.video_links[1].url.ends_with("rutherford+model"));
    }

    #[test]
    fn absent_lists_default_to_empty() {
        let raw = r#"{"verdict": "Incorrect", "score_band": 0, "feedback": "f"}"#;

        let feedback = normalize_feedback(raw, &question(1));

        assert_eq!(feedback.verdict, Verdict::Incorrect);
        assert_eq!(feedback.score_band, ScoreBand::Number(0.into()));
        assert!(feedback.misconceptions.is_empty());
        assert!(feedback.video_links.is_empty());
        assert_eq!(feedback.model_answer, "");
    }

    #[test]
    fn video_links_stop_at_six() {
        let queries: Vec<String> = (0..8).map(|i| format!("\"q {i}\"")).collect();
        let raw = format!(
            r#"{{"verdict": "Correct", "video_queries": [{}]}}"#,
            queries.join(",")
        );

        let feedback = normalize_feedback(&raw, &question(1));

        assert_eq!(feedback.video_queries.len(), 8);
        assert_eq!(feedback.video_links.len(), MAX_VIDEO_LINKS);
    }

    #[test]
    fn out_of_range_bands_pass_through_unclamped() {
        let raw = r#"{"verdict": "Correct", "score_band": "5"}"#;

        let feedback = normalize_feedback(raw, &question(2));

        assert_eq!(feedback.score_band.points(), 5);
    }

    #[test]
    fn malformed_replies_fall_back() {
        for raw in [
            "I think the student is mostly right.",
            r#"{"verdict": "Correct", "score_band": "#,
            "{}",
            "[1, 2]",
            "",
        ] {
            let feedback = normalize_feedback(raw, &question(2));

            assert_eq!(feedback.verdict, Verdict::PartlyCorrect);
            assert_eq!(feedback.score_band.points(), 0);
            assert_eq!(feedback.why, raw);
            assert!(feedback.misconceptions.is_empty());
            assert!(feedback.next_steps.is_empty());
            assert!(feedback.video_queries.is_empty());
            assert!(feedback.video_links.is_empty());
        }
    }

    #[test]
    fn summary_parses_and_falls_back() {
        let parsed = normalize_summary(
            r#"{"overall_summary": "Good", "strengths": ["atoms"], "gaps": "ions"}"#,
        );
        assert_eq!(parsed.overall_summary, "Good");
        assert_eq!(parsed.strengths, vec!["atoms"]);
        assert_eq!(parsed.gaps, vec!["ions"]);
        assert!(parsed.key_learning_points.is_empty());
        assert_eq!(parsed.raw, None);

        let fallback = normalize_summary("Here is your summary: good job");
        assert_eq!(fallback.overall_summary, UNPARSED_SUMMARY);
        assert_eq!(fallback.raw.as_deref(), Some("Here is your summary: good job"));
        assert!(fallback.strengths.is_empty());
        assert!(fallback.recommended_next_topics.is_empty());
    }
}
