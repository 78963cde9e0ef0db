//! Content selection by experiment group and proficiency.

use serde::{Deserialize, Serialize};

use crate::model::{Chapter, ChapterKind, ContentFormat, ExperimentGroup, Proficiency};

/// What a learner sees when opening a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterView {
    pub chapter_id: String,
    pub title: String,
    pub kind: ChapterKind,
    /// Which body was chosen, if any.
    pub audience: Option<Proficiency>,
    pub body: String,
    /// A video chapter shown to a learner who prefers text.
    pub format_mismatch: bool,
}

/// Pick the body for a learner.
///
/// Control users always get the baseline (beginner) body. Experimental users
/// get the body for their proficiency, falling back to the baseline. When no
/// labelled body exists the first body in key order is used.
pub fn select_body(
    chapter: &Chapter,
    group: ExperimentGroup,
    proficiency: Option<Proficiency>,
) -> Option<(Option<Proficiency>, &str)> {
    let wanted = match group {
        ExperimentGroup::Control => Proficiency::Beginner,
        ExperimentGroup::Experimental => proficiency.unwrap_or_default(),
    };

    [wanted, Proficiency::Beginner]
        .into_iter()
        .find_map(|p| chapter.content.get(p.as_str()).map(|b| (Some(p), b.as_str())))
        .or_else(|| {
            chapter
                .content
                .iter()
                .next()
                .map(|(key, body)| (key.parse().ok(), body.as_str()))
        })
}

/// Build the view for a chapter.
pub fn present(
    chapter: &Chapter,
    group: ExperimentGroup,
    proficiency: Option<Proficiency>,
    preference: ContentFormat,
) -> ChapterView {
    let (audience, body) = select_body(chapter, group, proficiency)
        .map(|(audience, body)| (audience, body.to_string()))
        .unwrap_or((None, String::new()));

    ChapterView {
        chapter_id: chapter.id.clone(),
        title: chapter.title.clone(),
        kind: chapter.kind,
        audience,
        body,
        format_mismatch: chapter.kind == ChapterKind::Video && preference == ContentFormat::Text,
    }
}
