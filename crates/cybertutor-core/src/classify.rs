//! Proficiency classification prompt and reply validation.
//!
//! The classifier backend only produces free text. This module owns the
//! prompt it is sent and the strict parsing of what comes back.

use thiserror::Error;

use crate::model::{Proficiency, SurveyResponse};

/// Number of topics the survey classifies.
pub const SURVEY_TOPIC_COUNT: usize = 5;

/// Default survey topics, in the order labels are returned.
pub const DEFAULT_SURVEY_TOPICS: [&str; SURVEY_TOPIC_COUNT] = [
    "Network Security",
    "Cryptography",
    "Web Application Security",
    "Social Engineering",
    "Malware Analysis",
];

/// Labels applied whenever classification cannot produce a valid answer.
pub const FALLBACK_LABELS: [Proficiency; SURVEY_TOPIC_COUNT] =
    [Proficiency::Beginner; SURVEY_TOPIC_COUNT];

/// Why a classifier reply was rejected.
#[derive(Debug, Error, PartialEq)]
pub enum ClassificationError {
    #[error("invalid classifier output: expected {expected} labels, got {actual}")]
    WrongCount { expected: usize, actual: usize },

    #[error("invalid classifier output: unknown label '{0}'")]
    UnknownLabel(String),
}

/// Render survey responses as a `Q:`/`A:` transcript.
pub fn build_transcript(responses: &[SurveyResponse]) -> String {
    responses
        .iter()
        .map(|r| format!("Q: {}\nA: {}", r.question.trim(), r.answer.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Build the classifier prompt for a transcript.
pub fn build_prompt(topics: &[String; SURVEY_TOPIC_COUNT], transcript: &str) -> String {
    format!(
        "You are assessing a learner's cybersecurity background from a short survey.\n\
         Classify their proficiency in each of these topics, in this exact order: {}.\n\
         Reply with exactly {} comma-separated labels, each one of: beginner, intermediate, expert.\n\
         Do not include any other text.\n\n\
         Survey transcript:\n{}",
        topics.join(", "),
        SURVEY_TOPIC_COUNT,
        transcript
    )
}

/// Parse a reply like `beginner, expert, intermediate, beginner, beginner`.
///
/// Surrounding whitespace, a trailing period, and letter case are tolerated;
/// anything else is rejected.
pub fn parse_labels(reply: &str) -> Result<[Proficiency; SURVEY_TOPIC_COUNT], ClassificationError> {
    let trimmed = reply.trim().trim_end_matches('.');
    let parts: Vec<&str> = if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split(',').map(str::trim).collect()
    };

    if parts.len() != SURVEY_TOPIC_COUNT {
        return Err(ClassificationError::WrongCount {
            expected: SURVEY_TOPIC_COUNT,
            actual: parts.len(),
        });
    }

    let mut labels = FALLBACK_LABELS;
    for (slot, part) in labels.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .map_err(|_| ClassificationError::UnknownLabel(part.to_string()))?;
    }
    Ok(labels)
}
