//! Content authoring: topics, chapters, and questions.
//!
//! Every write resolves the acting user through the [`IdentityProvider`] and
//! requires the stored `superuser` flag, so authorization does not depend on
//! what a front end chooses to hide.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::{EngineError, Result};
use crate::model::{Chapter, ChapterKind, Question, Topic, User};
use crate::records::{self, encode, fetch, fetch_all};
use crate::traits::{DocumentStore, IdentityProvider, Query, ReadView, WriteOp};

/// Partial topic update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TopicPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

/// Partial chapter update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChapterPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChapterKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_level: Option<u32>,
}

/// Counts written by [`ContentAdmin::import_catalog`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub topics: usize,
    pub chapters: usize,
    pub questions: usize,
}

/// Check a question's shape: non-empty prompt, single-letter lowercase
/// choice keys, and a correct key that names one of the choices.
pub fn validate_question(question: &Question) -> Result<()> {
    let invalid = |message: String| EngineError::InvalidQuestion {
        id: question.id.clone(),
        message,
    };

    if question.prompt.trim().is_empty() {
        return Err(invalid("prompt is empty".into()));
    }
    if question.choices.len() < 2 {
        return Err(invalid("needs at least two choices".into()));
    }
    if let Some(bad) = question
        .choices
        .keys()
        .find(|k| !(k.len() == 1 && k.chars().all(|c| c.is_ascii_lowercase())))
    {
        return Err(invalid(format!(
            "choice key '{bad}' is not a single lowercase letter"
        )));
    }
    if !question.choices.contains_key(&question.correct) {
        return Err(invalid(format!(
            "correct key '{}' is not one of the choices",
            question.correct
        )));
    }
    Ok(())
}

/// Authorized content writes.
pub struct ContentAdmin {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl ContentAdmin {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    async fn authorize(&self) -> Result<User> {
        let user_id = self
            .identity
            .current_user_id()
            .ok_or(EngineError::Unauthenticated)?;
        let user: User = fetch(self.store.as_ref(), records::USERS, &user_id)
            .await?
            .ok_or_else(|| EngineError::UserNotFound(user_id.clone()))?;
        if !user.superuser {
            tracing::warn!(user = %user_id, "refused content write");
            return Err(EngineError::Forbidden(user_id));
        }
        Ok(user)
    }

    async fn ensure_topic(&self, topic_id: &str) -> Result<()> {
        match self.store.get(records::TOPICS, topic_id).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::TopicNotFound(topic_id.to_string())),
        }
    }

    async fn ensure_order_free(&self, topic_id: &str, order: i64, except: Option<&str>) -> Result<()> {
        let taken = self
            .store
            .query(&records::chapters(topic_id), &Query::all().eq("order", order))
            .await?;
        if taken.iter().any(|(id, _)| Some(id.as_str()) != except) {
            return Err(EngineError::Conflict(format!(
                "topic {topic_id} already has a chapter at order {order}"
            )));
        }
        Ok(())
    }

    /// Deletes for every learner's records that refer to removed content.
    async fn learner_record_deletes(
        &self,
        topic_id: Option<&str>,
        chapter_ids: &[String],
    ) -> Result<Vec<WriteOp>> {
        let mut ops = Vec::new();
        for (user_id, _) in self.store.list(records::USERS).await? {
            if let Some(topic_id) = topic_id {
                for collection in [records::proficiency(&user_id), records::levels(&user_id)] {
                    ops.push(WriteOp::Delete {
                        collection,
                        id: topic_id.to_string(),
                    });
                }
            }
            for chapter_id in chapter_ids {
                ops.push(WriteOp::Delete {
                    collection: records::progress(&user_id),
                    id: chapter_id.clone(),
                });
            }
        }
        Ok(ops)
    }

    // -----------------------------------------------------------------------
    // Topics
    // -----------------------------------------------------------------------

    #[instrument(skip(self, topic), fields(title = %topic.title))]
    pub async fn create_topic(&self, mut topic: Topic) -> Result<Topic> {
        self.authorize().await?;
        if topic.id.is_empty() {
            topic.id = Uuid::new_v4().to_string();
        }
        if self.store.get(records::TOPICS, &topic.id).await?.is_some() {
            return Err(EngineError::AlreadyExists(format!("topic {}", topic.id)));
        }
        let doc = encode(records::TOPICS, &topic.id, &topic)?;
        self.store.set(records::TOPICS, &topic.id, doc).await?;
        tracing::info!(topic = %topic.id, "created topic");
        Ok(topic)
    }

    pub async fn update_topic(&self, topic_id: &str, patch: TopicPatch) -> Result<Topic> {
        self.authorize().await?;
        self.ensure_topic(topic_id).await?;
        let doc = encode(records::TOPICS, topic_id, &patch)?;
        self.store.set_merge(records::TOPICS, topic_id, doc).await?;
        fetch(self.store.as_ref(), records::TOPICS, topic_id)
            .await?
            .ok_or_else(|| EngineError::TopicNotFound(topic_id.to_string()))
    }

    /// Delete a topic with its chapters, their questions, and every
    /// learner's records for them in one batch.
    pub async fn delete_topic(&self, topic_id: &str) -> Result<()> {
        self.authorize().await?;
        self.ensure_topic(topic_id).await?;

        let chapters_collection = records::chapters(topic_id);
        let chapters = self.store.list(&chapters_collection).await?;
        let questions = self
            .store
            .query(records::QUESTIONS, &Query::all().eq("topic_id", topic_id))
            .await?;

        let chapter_ids: Vec<String> = chapters.into_iter().map(|(id, _)| id).collect();
        let mut ops = self
            .learner_record_deletes(Some(topic_id), &chapter_ids)
            .await?;
        ops.extend(chapter_ids.into_iter().map(|id| WriteOp::Delete {
            collection: chapters_collection.clone(),
            id,
        }));
        ops.extend(questions.into_iter().map(|(id, _)| WriteOp::Delete {
            collection: records::QUESTIONS.to_string(),
            id,
        }));
        ops.push(WriteOp::Delete {
            collection: records::TOPICS.to_string(),
            id: topic_id.to_string(),
        });

        self.store.batch_write(ops).await?;
        tracing::info!(topic = topic_id, "deleted topic");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Chapters
    // -----------------------------------------------------------------------

    #[instrument(skip(self, chapter), fields(topic = %chapter.topic_id, order = chapter.order))]
    pub async fn create_chapter(&self, mut chapter: Chapter) -> Result<Chapter> {
        self.authorize().await?;
        self.ensure_topic(&chapter.topic_id).await?;
        self.ensure_order_free(&chapter.topic_id, chapter.order, None)
            .await?;
        if chapter.id.is_empty() {
            chapter.id = Uuid::new_v4().to_string();
        }

        let collection = records::chapters(&chapter.topic_id);
        if self.store.get(&collection, &chapter.id).await?.is_some() {
            return Err(EngineError::AlreadyExists(format!("chapter {}", chapter.id)));
        }
        let doc = encode(&collection, &chapter.id, &chapter)?;
        self.store.set(&collection, &chapter.id, doc).await?;
        tracing::info!(chapter = %chapter.id, "created chapter");
        Ok(chapter)
    }

    pub async fn update_chapter(
        &self,
        topic_id: &str,
        chapter_id: &str,
        patch: ChapterPatch,
    ) -> Result<Chapter> {
        self.authorize().await?;
        let collection = records::chapters(topic_id);
        if self.store.get(&collection, chapter_id).await?.is_none() {
            return Err(EngineError::ChapterNotFound(chapter_id.to_string()));
        }
        if let Some(order) = patch.order {
            self.ensure_order_free(topic_id, order, Some(chapter_id))
                .await?;
        }
        let doc = encode(&collection, chapter_id, &patch)?;
        self.store.set_merge(&collection, chapter_id, doc).await?;
        fetch(self.store.as_ref(), &collection, chapter_id)
            .await?
            .ok_or_else(|| EngineError::ChapterNotFound(chapter_id.to_string()))
    }

    /// Delete a chapter, its questions, and learners' progress on it in one batch.
    pub async fn delete_chapter(&self, topic_id: &str, chapter_id: &str) -> Result<()> {
        self.authorize().await?;
        let collection = records::chapters(topic_id);
        if self.store.get(&collection, chapter_id).await?.is_none() {
            return Err(EngineError::ChapterNotFound(chapter_id.to_string()));
        }
        let questions = self
            .store
            .query(records::QUESTIONS, &Query::all().eq("chapter_id", chapter_id))
            .await?;

        let mut ops = self
            .learner_record_deletes(None, &[chapter_id.to_string()])
            .await?;
        ops.extend(questions.into_iter().map(|(id, _)| WriteOp::Delete {
            collection: records::QUESTIONS.to_string(),
            id,
        }));
        ops.push(WriteOp::Delete {
            collection,
            id: chapter_id.to_string(),
        });
        self.store.batch_write(ops).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Questions
    // -----------------------------------------------------------------------

    pub async fn create_question(&self, mut question: Question) -> Result<Question> {
        self.authorize().await?;
        if question.id.is_empty() {
            question.id = Uuid::new_v4().to_string();
        }
        validate_question(&question)?;

        let chapters_collection = records::chapters(&question.topic_id);
        if self
            .store
            .get(&chapters_collection, &question.chapter_id)
            .await?
            .is_none()
        {
            return Err(EngineError::ChapterNotFound(question.chapter_id.clone()));
        }
        if self
            .store
            .get(records::QUESTIONS, &question.id)
            .await?
            .is_some()
        {
            return Err(EngineError::AlreadyExists(format!("question {}", question.id)));
        }

        let doc = encode(records::QUESTIONS, &question.id, &question)?;
        self.store.set(records::QUESTIONS, &question.id, doc).await?;
        Ok(question)
    }

    pub async fn delete_question(&self, question_id: &str) -> Result<()> {
        self.authorize().await?;
        self.store.delete(records::QUESTIONS, question_id).await?;
        Ok(())
    }

    /// Questions for a chapter, for authoring views.
    pub async fn questions(&self, chapter_id: &str) -> Result<Vec<Question>> {
        fetch_all(
            self.store.as_ref(),
            records::QUESTIONS,
            &Query::all().eq("chapter_id", chapter_id),
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Catalog import
    // -----------------------------------------------------------------------

    /// Write a whole catalog as one transaction.
    ///
    /// Questions, ids, and chapter orders are all checked before anything is
    /// written. On any problem the store is left unchanged, so a corrected
    /// catalog can simply be imported again.
    #[instrument(skip_all, fields(topics = catalog.topics.len()))]
    pub async fn import_catalog(&self, catalog: &Catalog) -> Result<ImportSummary> {
        self.authorize().await?;

        let mut topic_ids = HashSet::new();
        let mut chapter_ids = HashSet::new();
        let mut question_ids = HashSet::new();
        let mut summary = ImportSummary::default();
        let mut ops = Vec::new();

        for entry in &catalog.topics {
            let topic = &entry.topic;
            if !topic_ids.insert(topic.id.as_str()) {
                return Err(EngineError::AlreadyExists(format!("topic {}", topic.id)));
            }
            ops.push(WriteOp::Set {
                collection: records::TOPICS.to_string(),
                id: topic.id.clone(),
                doc: encode(records::TOPICS, &topic.id, topic)?,
            });
            summary.topics += 1;

            let collection = records::chapters(&topic.id);
            let mut orders = HashSet::new();
            for item in &entry.chapters {
                let chapter = &item.chapter;
                if !orders.insert(chapter.order) {
                    return Err(EngineError::Conflict(format!(
                        "topic {} already has a chapter at order {}",
                        topic.id, chapter.order
                    )));
                }
                if !chapter_ids.insert(chapter.id.as_str()) {
                    return Err(EngineError::AlreadyExists(format!("chapter {}", chapter.id)));
                }
                ops.push(WriteOp::Set {
                    collection: collection.clone(),
                    id: chapter.id.clone(),
                    doc: encode(&collection, &chapter.id, chapter)?,
                });
                summary.chapters += 1;

                for question in &item.questions {
                    validate_question(question)?;
                    if !question_ids.insert(question.id.as_str()) {
                        return Err(EngineError::AlreadyExists(format!(
                            "question {}",
                            question.id
                        )));
                    }
                    ops.push(WriteOp::Set {
                        collection: records::QUESTIONS.to_string(),
                        id: question.id.clone(),
                        doc: encode(records::QUESTIONS, &question.id, question)?,
                    });
                    summary.questions += 1;
                }
            }
        }

        let mut clash = None;
        self.store
            .transact(Box::new(|view: &dyn ReadView| {
                clash = topic_ids
                    .iter()
                    .find(|id| view.get(records::TOPICS, id).is_some())
                    .map(|id| format!("topic {id}"))
                    .or_else(|| {
                        question_ids
                            .iter()
                            .find(|id| view.get(records::QUESTIONS, id).is_some())
                            .map(|id| format!("question {id}"))
                    });
                if clash.is_some() {
                    return Ok(Vec::new());
                }
                Ok(ops)
            }))
            .await?;
        if let Some(existing) = clash {
            return Err(EngineError::AlreadyExists(existing));
        }

        tracing::info!(
            topics = summary.topics,
            chapters = summary.chapters,
            questions = summary.questions,
            "imported catalog"
        );
        Ok(summary)
    }
}
