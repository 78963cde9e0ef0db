//! Assessment scoring and question selection.
//!
//! Everything here is a pure function of its inputs. Randomness is passed in
//! so callers (and tests) control the source.

use std::collections::{BTreeMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::{Proficiency, Question};

/// Minimum percentage of correct answers needed to pass.
pub const PASS_THRESHOLD_PERCENT: f64 = 70.0;

/// Default number of questions drawn for one assessment.
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// Result of scoring one assessment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub percentage_correct: f64,
    pub passed: bool,
}

pub fn is_passing(percentage_correct: f64) -> bool {
    percentage_correct >= PASS_THRESHOLD_PERCENT
}

/// Score selected choice keys against the answer key.
///
/// Both maps are keyed by slot name. Slots missing from `responses` count as
/// wrong. An empty answer key scores 0% and fails.
pub fn score_assessment(
    responses: &BTreeMap<String, String>,
    answer_key: &BTreeMap<String, String>,
) -> Score {
    let total = answer_key.len();
    if total == 0 {
        return Score {
            percentage_correct: 0.0,
            passed: false,
        };
    }

    let matches = answer_key
        .iter()
        .filter(|(slot, correct)| responses.get(*slot) == Some(*correct))
        .count();

    let percentage_correct = (matches as f64 * 100.0) / total as f64;
    Score {
        percentage_correct,
        passed: is_passing(percentage_correct),
    }
}

/// Draw up to `sample_size` distinct questions at the learner's difficulty.
///
/// A missing proficiency selects beginner questions. Questions sharing an id
/// are only considered once.
pub fn select_assessment_questions<R: Rng + ?Sized>(
    questions: &[Question],
    proficiency: Option<Proficiency>,
    sample_size: usize,
    rng: &mut R,
) -> Vec<Question> {
    let difficulty = proficiency.unwrap_or_default();
    let mut seen = HashSet::new();
    let pool: Vec<&Question> = questions
        .iter()
        .filter(|q| q.difficulty == difficulty)
        .filter(|q| seen.insert(q.id.as_str()))
        .collect();

    pool.choose_multiple(rng, sample_size)
        .map(|q| (*q).clone())
        .collect()
}

/// An assembled assessment: ordered slots plus the parallel answer key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Assessment {
    /// `(slot name, question)` in presentation order.
    pub slots: Vec<(String, Question)>,
    /// Slot name to correct choice key.
    pub answer_key: BTreeMap<String, String>,
}

impl Assessment {
    pub fn from_questions(questions: Vec<Question>) -> Self {
        let mut slots = Vec::with_capacity(questions.len());
        let mut answer_key = BTreeMap::new();
        for (i, question) in questions.into_iter().enumerate() {
            let slot = format!("question{}", i + 1);
            answer_key.insert(slot.clone(), question.correct.clone());
            slots.push((slot, question));
        }
        Self { slots, answer_key }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

/// Format elapsed seconds as `m:ss`.
pub fn format_elapsed(elapsed_secs: u64) -> String {
    format!("{}:{:02}", elapsed_secs / 60, elapsed_secs % 60)
}
