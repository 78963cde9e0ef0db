//! Core data model types for cybertutor.
//!
//! These are the typed records the engine works with. Each one maps onto a
//! single document in the external store; see [`crate::records`] for the
//! collection layout and the decoding boundary.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A per-topic skill label.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Proficiency {
    #[default]
    Beginner,
    Intermediate,
    Expert,
}

impl Proficiency {
    /// All labels in ascending order.
    pub const ALL: [Proficiency; 3] = [
        Proficiency::Beginner,
        Proficiency::Intermediate,
        Proficiency::Expert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Proficiency::Beginner => "beginner",
            Proficiency::Intermediate => "intermediate",
            Proficiency::Expert => "expert",
        }
    }
}

impl fmt::Display for Proficiency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Proficiency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "beginner" => Ok(Proficiency::Beginner),
            "intermediate" => Ok(Proficiency::Intermediate),
            "expert" => Ok(Proficiency::Expert),
            other => Err(format!("unknown proficiency: {other}")),
        }
    }
}

/// A/B experiment cohort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperimentGroup {
    /// Sees the non-adaptive baseline content.
    Control,
    /// Sees content adapted to their proficiency.
    Experimental,
}

impl fmt::Display for ExperimentGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExperimentGroup::Control => write!(f, "control"),
            ExperimentGroup::Experimental => write!(f, "experimental"),
        }
    }
}

/// Preferred presentation format for learning content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentFormat {
    #[default]
    Text,
    Video,
}

impl fmt::Display for ContentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentFormat::Text => write!(f, "text"),
            ContentFormat::Video => write!(f, "video"),
        }
    }
}

impl FromStr for ContentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(ContentFormat::Text),
            "video" => Ok(ContentFormat::Video),
            other => Err(format!("unknown content format: {other}")),
        }
    }
}

/// A learner account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Fixed for the lifetime of the account.
    pub group: ExperimentGroup,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub survey_completed: bool,
    #[serde(default)]
    pub content_preference: ContentFormat,
    #[serde(default)]
    pub superuser: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A top-level subject area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order: i64,
}

/// What a chapter contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterKind {
    Text,
    Video,
    Assessment,
}

impl fmt::Display for ChapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChapterKind::Text => write!(f, "text"),
            ChapterKind::Video => write!(f, "video"),
            ChapterKind::Assessment => write!(f, "assessment"),
        }
    }
}

/// A content unit within a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub topic_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub kind: ChapterKind,
    /// Bodies keyed by proficiency label ("beginner", "intermediate", "expert").
    #[serde(default)]
    pub content: BTreeMap<String, String>,
    pub order: i64,
    /// Minimum topic level needed to enter this chapter.
    #[serde(default)]
    pub required_level: u32,
}

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub topic_id: String,
    pub chapter_id: String,
    pub prompt: String,
    /// Choice key (single lowercase letter) to choice text.
    pub choices: BTreeMap<String, String>,
    pub correct: String,
    pub difficulty: Proficiency,
}

/// Per-(user, topic) proficiency. `None` until a classification completes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProficiencyRecord {
    #[serde(default)]
    pub label: Option<Proficiency>,
}

/// Per-(user, topic) mastery counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelRecord {
    #[serde(default)]
    pub level: u32,
}

/// One assessment attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    /// Percentage of correct answers.
    pub score: f64,
    pub passed: bool,
    /// Elapsed time as `minutes:seconds`.
    pub elapsed: String,
    pub submitted_at: DateTime<Utc>,
}

/// Per-(user, chapter) completion state and attempt history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub attempt_count: u32,
    /// Attempts keyed `attempt1`, `attempt2`, ...
    #[serde(default)]
    pub attempts: BTreeMap<String, Attempt>,
}

impl Progress {
    pub fn state(&self) -> ChapterState {
        if self.complete {
            ChapterState::Complete
        } else if self.attempts.is_empty() {
            ChapterState::NotStarted
        } else {
            ChapterState::InProgress
        }
    }

    /// Attempts in submission order (numeric suffix, not lexical key order).
    pub fn attempts_in_order(&self) -> Vec<(&str, &Attempt)> {
        let mut attempts: Vec<(&str, &Attempt)> = self
            .attempts
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        attempts.sort_by_key(|(k, _)| attempt_number(k).unwrap_or(u32::MAX));
        attempts
    }
}

/// Key for the `n`th attempt.
pub fn attempt_key(n: u32) -> String {
    format!("attempt{n}")
}

fn attempt_number(key: &str) -> Option<u32> {
    key.strip_prefix("attempt").and_then(|n| n.parse().ok())
}

/// Per-chapter progress state, derived from a [`Progress`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterState {
    NotStarted,
    InProgress,
    Complete,
}

impl fmt::Display for ChapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChapterState::NotStarted => write!(f, "not started"),
            ChapterState::InProgress => write!(f, "in progress"),
            ChapterState::Complete => write!(f, "complete"),
        }
    }
}

/// A survey question and the learner's free-text answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyResponse {
    pub question: String,
    pub answer: String,
}
