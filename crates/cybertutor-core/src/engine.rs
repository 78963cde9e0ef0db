//! The progression engine.
//!
//! Turns question responses into durable proficiency and level state, and
//! decides whether a learner may enter the next chapter. Every operation is
//! awaited end to end: a dependent write is acknowledged by the store before
//! the call returns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::try_join_all;
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::instrument;
use uuid::Uuid;

use crate::classify::{
    build_prompt, build_transcript, parse_labels, DEFAULT_SURVEY_TOPICS, FALLBACK_LABELS,
    SURVEY_TOPIC_COUNT,
};
use crate::error::{EngineError, Result, StoreError};
use crate::model::{
    attempt_key, Attempt, Chapter, ChapterState, ContentFormat, ExperimentGroup, LevelRecord,
    Proficiency, ProficiencyRecord, Progress, Question, SurveyResponse, Topic, User,
};
use crate::presentation::{present, ChapterView};
use crate::records::{self, encode, fetch, fetch_all, read_or_default};
use crate::scoring::{
    format_elapsed, select_assessment_questions, Assessment, DEFAULT_SAMPLE_SIZE,
};
use crate::traits::{Document, DocumentStore, ProficiencyClassifier, Query, ReadView, WriteOp};

/// Configuration for the progression engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Questions drawn per assessment.
    pub sample_size: usize,
    /// Upper bound on a single classifier call.
    pub classifier_timeout: Duration,
    /// Extra classifier attempts after the first failure.
    pub classifier_max_retries: u32,
    /// Base delay between classifier attempts (multiplied by the attempt number).
    pub classifier_retry_delay: Duration,
    /// Topic titles the survey classifies, in reply order.
    pub survey_topics: [String; SURVEY_TOPIC_COUNT],
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            classifier_timeout: Duration::from_secs(30),
            classifier_max_retries: 1,
            classifier_retry_delay: Duration::from_millis(500),
            survey_topics: DEFAULT_SURVEY_TOPICS.map(String::from),
        }
    }
}

/// A new account request.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    /// Identity-provider id; generated when absent.
    pub id: Option<String>,
    pub display_name: String,
    pub content_preference: ContentFormat,
    /// Only honoured while no superuser exists yet.
    pub superuser: bool,
}

/// Result of [`ProgressionEngine::record_assessment_outcome`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentOutcome {
    /// Key the attempt was stored under (`attempt<N>`).
    pub attempt_key: String,
    /// This call moved the chapter to complete.
    pub newly_completed: bool,
    /// New topic level, when this call raised it.
    pub level: Option<u32>,
}

/// Where "next chapter" leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Navigation {
    Open(String),
    Locked { required: u32, current: u32 },
    EndOfTopic { topic_id: String },
}

/// Labels written by a survey.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurveyOutcome {
    /// `(topic title, resolved topic id, label)` in survey order.
    pub assignments: Vec<(String, Option<String>, Proficiency)>,
}

/// One row of a learner's overview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicProgress {
    pub topic: Topic,
    pub proficiency: Option<Proficiency>,
    pub level: u32,
    pub completed: usize,
    pub total: usize,
}

/// The progression engine.
pub struct ProgressionEngine {
    store: Arc<dyn DocumentStore>,
    classifier: Arc<dyn ProficiencyClassifier>,
    config: EngineConfig,
    rng: Mutex<Box<dyn RngCore + Send>>,
}

impl ProgressionEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        classifier: Arc<dyn ProficiencyClassifier>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            config,
            rng: Mutex::new(Box::new(StdRng::from_entropy())),
        }
    }

    /// Replace the randomness source used for group assignment and question selection.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Mutex::new(Box::new(rng));
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    fn with_rng_locked<T>(&self, f: impl FnOnce(&mut Box<dyn RngCore + Send>) -> T) -> T {
        let mut guard = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn user(&self, user_id: &str) -> Result<User> {
        fetch(self.store.as_ref(), records::USERS, user_id)
            .await?
            .ok_or_else(|| EngineError::UserNotFound(user_id.to_string()))
    }

    pub async fn topic(&self, topic_id: &str) -> Result<Topic> {
        fetch(self.store.as_ref(), records::TOPICS, topic_id)
            .await?
            .ok_or_else(|| EngineError::TopicNotFound(topic_id.to_string()))
    }

    /// All topics in display order.
    pub async fn topics(&self) -> Result<Vec<Topic>> {
        fetch_all(
            self.store.as_ref(),
            records::TOPICS,
            &Query::all().order_by("order"),
        )
        .await
    }

    /// Chapters of a topic in display order.
    pub async fn chapters(&self, topic_id: &str) -> Result<Vec<Chapter>> {
        fetch_all(
            self.store.as_ref(),
            &records::chapters(topic_id),
            &Query::all().order_by("order"),
        )
        .await
    }

    pub async fn chapter(&self, topic_id: &str, chapter_id: &str) -> Result<Chapter> {
        fetch(self.store.as_ref(), &records::chapters(topic_id), chapter_id)
            .await?
            .ok_or_else(|| EngineError::ChapterNotFound(chapter_id.to_string()))
    }

    /// Locate a chapter by id without knowing its topic.
    pub async fn find_chapter(&self, chapter_id: &str) -> Result<Chapter> {
        for topic in self.topics().await? {
            if let Some(chapter) =
                fetch(self.store.as_ref(), &records::chapters(&topic.id), chapter_id).await?
            {
                return Ok(chapter);
            }
        }
        Err(EngineError::ChapterNotFound(chapter_id.to_string()))
    }

    pub async fn proficiency(&self, user_id: &str, topic_id: &str) -> Result<Option<Proficiency>> {
        let record: Option<ProficiencyRecord> =
            fetch(self.store.as_ref(), &records::proficiency(user_id), topic_id).await?;
        Ok(record.and_then(|r| r.label))
    }

    /// Current topic level; a missing record reads as 0.
    pub async fn level(&self, user_id: &str, topic_id: &str) -> Result<u32> {
        let record: Option<LevelRecord> =
            fetch(self.store.as_ref(), &records::levels(user_id), topic_id).await?;
        Ok(record.map(|r| r.level).unwrap_or(0))
    }

    /// Progress for a chapter; a missing record reads as not started.
    pub async fn progress(&self, user_id: &str, chapter_id: &str) -> Result<Progress> {
        let record: Option<Progress> =
            fetch(self.store.as_ref(), &records::progress(user_id), chapter_id).await?;
        Ok(record.unwrap_or_default())
    }

    pub async fn chapter_state(&self, user_id: &str, chapter_id: &str) -> Result<ChapterState> {
        Ok(self.progress(user_id, chapter_id).await?.state())
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    /// Create an account with a randomly assigned experiment group and
    /// default proficiency, level, and progress records for existing content.
    #[instrument(skip(self, request), fields(name = %request.display_name))]
    pub async fn register_user(&self, request: NewUser) -> Result<User> {
        let id = request
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let group = self.with_rng_locked(|rng| {
            if rng.gen_bool(0.5) {
                ExperimentGroup::Experimental
            } else {
                ExperimentGroup::Control
            }
        });

        let user = User {
            id: id.clone(),
            group,
            display_name: request.display_name,
            survey_completed: false,
            content_preference: request.content_preference,
            superuser: request.superuser,
            created_at: Some(Utc::now()),
        };

        let topics = self.topics().await?;
        let chapters = try_join_all(topics.iter().map(|t| self.chapters(&t.id))).await?;

        let mut ops = vec![WriteOp::Set {
            collection: records::USERS.to_string(),
            id: id.clone(),
            doc: encode(records::USERS, &id, &user)?,
        }];
        for topic in &topics {
            ops.push(WriteOp::Set {
                collection: records::proficiency(&id),
                id: topic.id.clone(),
                doc: encode("proficiency", &topic.id, &ProficiencyRecord::default())?,
            });
            ops.push(WriteOp::Set {
                collection: records::levels(&id),
                id: topic.id.clone(),
                doc: encode("levels", &topic.id, &LevelRecord::default())?,
            });
        }
        for chapter in chapters.iter().flatten() {
            ops.push(WriteOp::Set {
                collection: records::progress(&id),
                id: chapter.id.clone(),
                doc: encode("progress", &chapter.id, &Progress::default())?,
            });
        }

        let op_count = ops.len();
        let superuser = request.superuser;
        let mut refusal = None;
        self.store
            .transact(Box::new(|view: &dyn ReadView| {
                if view.get(records::USERS, &id).is_some() {
                    refusal = Some(EngineError::AlreadyExists(format!("user {id}")));
                    return Ok(Vec::new());
                }
                if superuser
                    && !view
                        .query(records::USERS, &Query::all().eq("superuser", true))
                        .is_empty()
                {
                    refusal = Some(EngineError::Forbidden(id.clone()));
                    return Ok(Vec::new());
                }
                Ok(ops)
            }))
            .await
            .map_err(log_write_failure("register user"))?;
        if let Some(e) = refusal {
            return Err(e);
        }

        tracing::info!(user = %id, %group, records = op_count, "registered user");
        Ok(user)
    }

    // -----------------------------------------------------------------------
    // Assessments
    // -----------------------------------------------------------------------

    /// Assemble an assessment for a chapter at the learner's difficulty.
    ///
    /// Empty when the owning topic cannot be resolved or no questions match.
    #[instrument(skip(self, chapter), fields(chapter = %chapter.id))]
    pub async fn assemble_assessment(&self, user_id: &str, chapter: &Chapter) -> Result<Assessment> {
        if self.store.get(records::TOPICS, &chapter.topic_id).await?.is_none() {
            tracing::warn!(topic = %chapter.topic_id, "topic missing, no assessment");
            return Ok(Assessment::default());
        }

        let proficiency = self.proficiency(user_id, &chapter.topic_id).await?;
        let bank: Vec<Question> = fetch_all(
            self.store.as_ref(),
            records::QUESTIONS,
            &Query::all()
                .eq("topic_id", chapter.topic_id.as_str())
                .eq("chapter_id", chapter.id.as_str()),
        )
        .await?;

        let selected = self.with_rng_locked(|rng| {
            select_assessment_questions(&bank, proficiency, self.config.sample_size, rng)
        });
        if selected.is_empty() {
            tracing::warn!(
                difficulty = %proficiency.unwrap_or_default(),
                "no questions at learner difficulty"
            );
        }
        Ok(Assessment::from_questions(selected))
    }

    /// Append an attempt and, on the first pass, complete the chapter and
    /// raise the topic level.
    ///
    /// Every write of one call commits as a single transaction; after a
    /// failed write nothing has changed and the call can be repeated.
    /// Fails with [`EngineError::UserNotFound`] before any write when the
    /// user does not exist.
    #[instrument(skip(self, chapter), fields(chapter = %chapter.id))]
    pub async fn record_assessment_outcome(
        &self,
        user_id: &str,
        chapter: &Chapter,
        percentage_correct: f64,
        passed: bool,
        elapsed_secs: u64,
    ) -> Result<AssessmentOutcome> {
        self.user(user_id).await?;

        let progress_collection = records::progress(user_id);
        let levels_collection = records::levels(user_id);
        let attempt = encode(
            &progress_collection,
            &chapter.id,
            &Attempt {
                score: percentage_correct,
                passed,
                elapsed: format_elapsed(elapsed_secs),
                submitted_at: Utc::now(),
            },
        )?;

        let mut outcome = None;
        self.store
            .transact(Box::new(|view: &dyn ReadView| {
                let progress: Progress =
                    read_or_default(view, &progress_collection, &chapter.id)?;
                let number = checked_next(
                    u64::from(progress.attempt_count),
                    &progress_collection,
                    &chapter.id,
                    "attempt_count",
                )?;
                let key = attempt_key(number);

                let mut attempts = Document::new();
                attempts.insert(key.clone(), Value::Object(attempt));
                let mut patch = Document::new();
                patch.insert("attempts".into(), Value::Object(attempts));

                let mut ops = vec![
                    WriteOp::Increment {
                        collection: progress_collection.clone(),
                        id: chapter.id.clone(),
                        field: "attempt_count".into(),
                        delta: 1,
                    },
                    WriteOp::Merge {
                        collection: progress_collection.clone(),
                        id: chapter.id.clone(),
                        doc: patch,
                    },
                ];

                let mut level = None;
                if passed && !progress.complete {
                    let current: LevelRecord =
                        read_or_default(view, &levels_collection, &chapter.topic_id)?;
                    level = Some(checked_next(
                        u64::from(current.level),
                        &levels_collection,
                        &chapter.topic_id,
                        "level",
                    )?);
                    ops.push(WriteOp::Merge {
                        collection: progress_collection.clone(),
                        id: chapter.id.clone(),
                        doc: object(json!({ "complete": true })),
                    });
                    ops.push(WriteOp::Increment {
                        collection: levels_collection.clone(),
                        id: chapter.topic_id.clone(),
                        field: "level".into(),
                        delta: 1,
                    });
                }

                outcome = Some(AssessmentOutcome {
                    attempt_key: key,
                    newly_completed: level.is_some(),
                    level,
                });
                Ok(ops)
            }))
            .await
            .map_err(log_write_failure("record attempt"))?;

        let outcome = outcome.ok_or_else(|| EngineError::InvalidDocument {
            collection: progress_collection.clone(),
            id: chapter.id.clone(),
            message: "attempt was not planned".into(),
        })?;
        if let Some(level) = outcome.level {
            tracing::info!(user = user_id, level, "chapter completed");
        }
        Ok(outcome)
    }

    /// Atomically add one to the learner's level for a topic.
    pub async fn increase_level(&self, user_id: &str, topic_id: &str) -> Result<u32> {
        let collection = records::levels(user_id);
        let level = self
            .store
            .increment(&collection, topic_id, "level", 1)
            .await
            .map_err(log_write_failure("increase level"))?;
        to_u32(&collection, topic_id, level)
    }

    // -----------------------------------------------------------------------
    // Navigation
    // -----------------------------------------------------------------------

    /// The chapter at `current_order + 1`, or `EndOfTopic`.
    async fn chapter_after(&self, topic_id: &str, current_order: i64) -> Result<Chapter> {
        let end_of_topic = || EngineError::EndOfTopic {
            topic_id: topic_id.to_string(),
            order: current_order,
        };
        let order = current_order.checked_add(1).ok_or_else(end_of_topic)?;
        let mut candidates: Vec<Chapter> = fetch_all(
            self.store.as_ref(),
            &records::chapters(topic_id),
            &Query::all().eq("order", order),
        )
        .await?;

        if candidates.len() > 1 {
            tracing::warn!(
                topic = topic_id,
                order,
                count = candidates.len(),
                "duplicate chapter order, using lowest id"
            );
            candidates.sort_by(|a, b| a.id.cmp(&b.id));
        }

        candidates
            .into_iter()
            .next()
            .ok_or_else(end_of_topic)
    }

    /// Id of the chapter after `current_order`, or `None` when its level gate is closed.
    pub async fn resolve_next_chapter(
        &self,
        current_order: i64,
        topic_id: &str,
        user_level: u32,
    ) -> Result<Option<String>> {
        let next = self.chapter_after(topic_id, current_order).await?;
        if next.required_level > user_level {
            tracing::debug!(
                chapter = %next.id,
                required = next.required_level,
                user_level,
                "gate closed"
            );
            return Ok(None);
        }
        Ok(Some(next.id))
    }

    /// Resolve the learner's next step after `chapter`.
    pub async fn navigate_next(&self, user_id: &str, chapter: &Chapter) -> Result<Navigation> {
        self.user(user_id).await?;
        let current = self.level(user_id, &chapter.topic_id).await?;

        match self.chapter_after(&chapter.topic_id, chapter.order).await {
            Ok(next) if next.required_level > current => Ok(Navigation::Locked {
                required: next.required_level,
                current,
            }),
            Ok(next) => Ok(Navigation::Open(next.id)),
            Err(EngineError::EndOfTopic { topic_id, .. }) => {
                Ok(Navigation::EndOfTopic { topic_id })
            }
            Err(e) => Err(e),
        }
    }

    /// Render a chapter for the learner, refusing entry below its level.
    pub async fn present_chapter(&self, user_id: &str, chapter: &Chapter) -> Result<ChapterView> {
        let user = self.user(user_id).await?;
        let current = self.level(user_id, &chapter.topic_id).await?;
        if chapter.required_level > current {
            return Err(EngineError::Locked {
                required: chapter.required_level,
                current,
            });
        }
        let proficiency = self.proficiency(user_id, &chapter.topic_id).await?;
        Ok(present(
            chapter,
            user.group,
            proficiency,
            user.content_preference,
        ))
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    /// Ask the classifier for one label per survey topic.
    ///
    /// Never fails: timeouts, backend errors, and malformed replies fall back
    /// to all-beginner after the configured retries.
    #[instrument(skip_all, fields(classifier = self.classifier.name()))]
    pub async fn classify_proficiency(&self, transcript: &str) -> [Proficiency; SURVEY_TOPIC_COUNT] {
        let prompt = build_prompt(&self.config.survey_topics, transcript);

        for attempt in 0..=self.config.classifier_max_retries {
            if attempt > 0 {
                tokio::time::sleep(self.config.classifier_retry_delay * attempt).await;
            }
            match tokio::time::timeout(
                self.config.classifier_timeout,
                self.classifier.classify(&prompt),
            )
            .await
            {
                Ok(Ok(reply)) => match parse_labels(&reply) {
                    Ok(labels) => return labels,
                    Err(e) => tracing::warn!(attempt, "{e}"),
                },
                Ok(Err(e)) => tracing::warn!(attempt, "classifier failed: {e:#}"),
                Err(_) => tracing::warn!(
                    attempt,
                    "classifier timed out after {:?}",
                    self.config.classifier_timeout
                ),
            }
        }

        tracing::warn!("classification unavailable, assigning beginner to every topic");
        FALLBACK_LABELS
    }

    /// Classify survey answers and persist the labels before returning.
    #[instrument(skip(self, responses), fields(responses = responses.len()))]
    pub async fn apply_survey(
        &self,
        user_id: &str,
        responses: &[SurveyResponse],
    ) -> Result<SurveyOutcome> {
        self.user(user_id).await?;

        let labels = self.classify_proficiency(&build_transcript(responses)).await;

        let by_title: HashMap<String, String> = self
            .topics()
            .await?
            .into_iter()
            .map(|t| (t.title.to_lowercase(), t.id))
            .collect();

        let mut ops = Vec::new();
        let mut assignments = Vec::with_capacity(SURVEY_TOPIC_COUNT);
        for (title, label) in self.config.survey_topics.iter().zip(labels) {
            let topic_id = by_title.get(&title.to_lowercase()).cloned();
            match &topic_id {
                Some(id) => ops.push(WriteOp::Merge {
                    collection: records::proficiency(user_id),
                    id: id.clone(),
                    doc: encode(
                        "proficiency",
                        id,
                        &ProficiencyRecord { label: Some(label) },
                    )?,
                }),
                None => tracing::warn!(topic = %title, "survey topic has no matching topic"),
            }
            assignments.push((title.clone(), topic_id, label));
        }
        ops.push(WriteOp::Merge {
            collection: records::USERS.to_string(),
            id: user_id.to_string(),
            doc: object(json!({ "survey_completed": true })),
        });

        self.store
            .batch_write(ops)
            .await
            .map_err(log_write_failure("apply survey"))?;

        tracing::info!(user = user_id, "survey applied");
        Ok(SurveyOutcome { assignments })
    }

    // -----------------------------------------------------------------------
    // Overview
    // -----------------------------------------------------------------------

    /// Per-topic summary for a learner, in topic order.
    pub async fn progress_overview(&self, user_id: &str) -> Result<Vec<TopicProgress>> {
        self.user(user_id).await?;
        let topics = self.topics().await?;

        try_join_all(topics.into_iter().map(|topic| async move {
            let chapters = self.chapters(&topic.id).await?;
            let proficiency = self.proficiency(user_id, &topic.id).await?;
            let level = self.level(user_id, &topic.id).await?;
            let mut completed = 0;
            for chapter in &chapters {
                if self.progress(user_id, &chapter.id).await?.complete {
                    completed += 1;
                }
            }
            Ok::<_, EngineError>(TopicProgress {
                topic,
                proficiency,
                level,
                completed,
                total: chapters.len(),
            })
        }))
        .await
    }
}

fn log_write_failure(operation: &'static str) -> impl FnOnce(StoreError) -> StoreError {
    move |e| {
        tracing::error!("{operation} failed: {e}");
        e
    }
}

fn to_u32(collection: &str, id: &str, value: i64) -> Result<u32> {
    u32::try_from(value).map_err(|_| EngineError::InvalidDocument {
        collection: collection.to_string(),
        id: id.to_string(),
        message: format!("counter out of range: {value}"),
    })
}

/// `current + 1` as a stored counter, rejecting values past `u32::MAX`.
fn checked_next(
    current: u64,
    collection: &str,
    id: &str,
    field: &str,
) -> std::result::Result<u32, StoreError> {
    u32::try_from(current + 1).map_err(|_| StoreError::TypeMismatch {
        collection: collection.to_string(),
        id: id.to_string(),
        field: field.to_string(),
        message: format!("counter {current} is at its maximum"),
    })
}

fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

