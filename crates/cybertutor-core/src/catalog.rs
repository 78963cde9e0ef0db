//! TOML content catalogs.
//!
//! Loads topics, chapters, and questions from TOML files and directories for
//! bulk authoring, and validates them before import.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::admin::validate_question;
use crate::model::{Chapter, ChapterKind, Proficiency, Question, Topic};

/// A parsed catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub topics: Vec<CatalogTopic>,
}

#[derive(Debug, Clone)]
pub struct CatalogTopic {
    pub topic: Topic,
    pub chapters: Vec<CatalogChapter>,
}

#[derive(Debug, Clone)]
pub struct CatalogChapter {
    pub chapter: Chapter,
    pub questions: Vec<Question>,
}

impl Catalog {
    pub fn chapter_count(&self) -> usize {
        self.topics.iter().map(|t| t.chapters.len()).sum()
    }

    pub fn question_count(&self) -> usize {
        self.topics
            .iter()
            .flat_map(|t| &t.chapters)
            .map(|c| c.questions.len())
            .sum()
    }

    /// Append another catalog's topics.
    pub fn extend(&mut self, other: Catalog) {
        self.topics.extend(other.topics);
    }
}

/// Intermediate TOML structure for catalog files.
#[derive(Debug, Deserialize)]
struct TomlCatalog {
    #[serde(default)]
    topics: Vec<TomlTopic>,
}

#[derive(Debug, Deserialize)]
struct TomlTopic {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    order: i64,
    #[serde(default)]
    chapters: Vec<TomlChapter>,
}

#[derive(Debug, Deserialize)]
struct TomlChapter {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
    kind: ChapterKind,
    order: i64,
    #[serde(default)]
    required_level: u32,
    #[serde(default)]
    content: BTreeMap<String, String>,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    prompt: String,
    choices: BTreeMap<String, String>,
    correct: String,
    #[serde(default)]
    difficulty: Proficiency,
}

/// Parse a single TOML catalog file.
pub fn parse_catalog(path: &Path) -> Result<Catalog> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file: {}", path.display()))?;

    parse_catalog_str(&content, path)
}

/// Parse a TOML string into a `Catalog` (useful for testing).
pub fn parse_catalog_str(content: &str, source_path: &Path) -> Result<Catalog> {
    let parsed: TomlCatalog = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let topics = parsed
        .topics
        .into_iter()
        .map(|t| {
            let chapters = t
                .chapters
                .into_iter()
                .map(|c| {
                    let questions = c
                        .questions
                        .into_iter()
                        .map(|q| Question {
                            id: q.id,
                            topic_id: t.id.clone(),
                            chapter_id: c.id.clone(),
                            prompt: q.prompt,
                            choices: q.choices,
                            correct: q.correct,
                            difficulty: q.difficulty,
                        })
                        .collect();
                    CatalogChapter {
                        chapter: Chapter {
                            id: c.id,
                            topic_id: t.id.clone(),
                            title: c.title,
                            description: c.description,
                            kind: c.kind,
                            content: c.content,
                            order: c.order,
                            required_level: c.required_level,
                        },
                        questions,
                    }
                })
                .collect();
            CatalogTopic {
                topic: Topic {
                    id: t.id,
                    title: t.title,
                    description: t.description,
                    order: t.order,
                },
                chapters,
            }
        })
        .collect();

    Ok(Catalog { topics })
}

/// Recursively load all `.toml` catalogs under a directory into one catalog.
pub fn load_catalog_directory(dir: &Path) -> Result<Catalog> {
    let mut catalog = Catalog::default();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<_>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            catalog.extend(load_catalog_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_catalog(&path) {
                Ok(parsed) => catalog.extend(parsed),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(catalog)
}

/// Load a catalog from a file or a directory.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    if path.is_dir() {
        load_catalog_directory(path)
    } else {
        parse_catalog(path)
    }
}

/// A warning from catalog validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The topic, chapter, or question id the warning is about.
    pub location: Option<String>,
    pub message: String,
}

impl ValidationWarning {
    fn at(location: &str, message: impl Into<String>) -> Self {
        Self {
            location: Some(location.to_string()),
            message: message.into(),
        }
    }
}

/// Validate a catalog for authoring mistakes.
pub fn validate_catalog(catalog: &Catalog) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut topic_ids = HashSet::new();
    let mut topic_orders = HashSet::new();
    let mut chapter_ids = HashSet::new();
    let mut question_ids = HashSet::new();

    for entry in &catalog.topics {
        let topic = &entry.topic;
        if !topic_ids.insert(topic.id.as_str()) {
            warnings.push(ValidationWarning::at(
                &topic.id,
                format!("duplicate topic ID: {}", topic.id),
            ));
        }
        if !topic_orders.insert(topic.order) {
            warnings.push(ValidationWarning::at(
                &topic.id,
                format!("duplicate topic order: {}", topic.order),
            ));
        }

        // Level only grows by completing other chapters of the same topic.
        let reachable = entry.chapters.len().saturating_sub(1) as u32;
        let mut orders: HashMap<i64, &str> = HashMap::new();

        for item in &entry.chapters {
            let chapter = &item.chapter;
            if !chapter_ids.insert(chapter.id.as_str()) {
                warnings.push(ValidationWarning::at(
                    &chapter.id,
                    format!("duplicate chapter ID: {}", chapter.id),
                ));
            }
            if let Some(other) = orders.insert(chapter.order, chapter.id.as_str()) {
                warnings.push(ValidationWarning::at(
                    &chapter.id,
                    format!(
                        "chapter order {} already used by {other} in topic {}",
                        chapter.order, topic.id
                    ),
                ));
            }
            if chapter.required_level > reachable {
                warnings.push(ValidationWarning::at(
                    &chapter.id,
                    format!(
                        "required_level {} exceeds the highest reachable level {reachable}",
                        chapter.required_level
                    ),
                ));
            }

            match chapter.kind {
                ChapterKind::Assessment => {
                    if item.questions.is_empty() {
                        warnings.push(ValidationWarning::at(
                            &chapter.id,
                            "assessment chapter has no questions",
                        ));
                    } else {
                        for level in Proficiency::ALL {
                            if !item.questions.iter().any(|q| q.difficulty == level) {
                                warnings.push(ValidationWarning::at(
                                    &chapter.id,
                                    format!("no {level} questions"),
                                ));
                            }
                        }
                    }
                }
                ChapterKind::Text | ChapterKind::Video => {
                    if !chapter.content.contains_key(Proficiency::Beginner.as_str()) {
                        warnings.push(ValidationWarning::at(
                            &chapter.id,
                            "no beginner body; control group will see a fallback",
                        ));
                    }
                }
            }

            for question in &item.questions {
                if !question_ids.insert(question.id.as_str()) {
                    warnings.push(ValidationWarning::at(
                        &question.id,
                        format!("duplicate question ID: {}", question.id),
                    ));
                }
                if let Err(e) = validate_question(question) {
                    warnings.push(ValidationWarning::at(&question.id, e.to_string()));
                }
            }
        }
    }

    warnings
}
