use crate::bank::Question;
use crate::session::AttemptLogEntry;

/// System and user messages for one grading call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

const FEEDBACK_SYSTEM: &str = "You are a strict but supportive Cambridge lower-secondary science teacher. \
Give accurate science explanations for the student's level. \
Be clear, step-by-step, and correct misconceptions. \
Do NOT assume the student has prior knowledge beyond their level.";

const SUMMARY_SYSTEM: &str = "You are an expert Cambridge science tutor and assessment designer. \
You will analyze student responses and produce a compact, actionable learning plan.";

pub fn feedback_prompt(question: &Question, student_answer: &str, grade_level: &str) -> Prompt {
    let user = format!(
        r#"Create feedback for a student.

Context:
- Level: {grade_level}
- Topic: {topic}
- Question ({id}, {marks} marks): {prompt}
- Student answer: {student_answer}

Output MUST be valid JSON with exactly these keys:
{{
  "verdict": "Correct|Partly correct|Incorrect",
  "score_band": "0-{marks} (integer as string)",
  "feedback": "Brief, supportive feedback in 3-6 lines",
  "model_answer": "A clear, exam-style ideal answer",
  "why": "Detailed explanation suitable for the level, step-by-step",
  "misconceptions": ["..."],
  "next_steps": ["..."],
  "video_queries": ["3-5 YouTube search queries the student can use"]
}}

Rules:
- Keep the model answer concise but complete for the marks.
- In 'why', explain the science in detail but in simple language.
- If the student is wrong, correct them clearly and kindly.
- video_queries should be specific (e.g., 'Rutherford gold foil experiment explained for kids')."#,
        topic = question.topic,
        id = question.id,
        marks = question.marks,
        prompt = question.prompt,
    );

    Prompt {
        system: FEEDBACK_SYSTEM.to_string(),
        user,
    }
}

pub fn summary_prompt(
    attempt_log: &[AttemptLogEntry],
    grade_level: &str,
) -> Result<Prompt, serde_json::Error> {
    let log = serde_json::to_string_pretty(attempt_log)?;
    let user = format!(
        r#"Analyze the student's full quiz attempt and produce a summary for {grade_level}.

Here is the attempt log as JSON:
{log}

Output MUST be valid JSON with exactly these keys:
{{
  "overall_summary": "3-6 lines, plain language",
  "strengths": ["..."],
  "gaps": ["..."],
  "misconceptions_to_fix": ["..."],
  "key_learning_points": ["..."],
  "recommended_next_topics": ["..."]
}}

Rules:
- Be specific: reference patterns in the student's answers (e.g., 'confuses concentration with amount')."#
    );

    Ok(Prompt {
        system: SUMMARY_SYSTEM.to_string(),
        user,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::AnswerType;

    #[test]
    fn feedback_prompt_embeds_the_question_and_answer() {
        let question = Question {
            id: "Q7".into(),
            topic: "Acids".into(),
            marks: 3,
            prompt: "What is a pH indicator?".into(),
            answer_type: AnswerType::Text,
        };

        let prompt = feedback_prompt(&question, "litmus", "Grade 7 Cambridge");

        assert!(prompt.user.contains("- Level: Grade 7 Cambridge"));
        assert!(prompt.user.contains("Question (Q7, 3 marks): What is a pH indicator?"));
        assert!(prompt.user.contains("- Student answer: litmus"));
        assert!(prompt.user.contains("\"score_band\": \"0-3 (integer as string)\""));
        assert_eq!(prompt, feedback_prompt(&question, "litmus", "Grade 7 Cambridge"));
    }

    #[test]
    fn summary_prompt_embeds_the_log() {
        let prompt = summary_prompt(&[], "Grade 8").unwrap();
        assert!(prompt.user.contains("summary for Grade 8"));
        assert!(prompt.user.contains("attempt log as JSON:\n[]"));
    }
}
