//! Progression engine behaviour against the in-memory store.
//!
//! These run the engine, content authoring, and classifier fallback together
//! with a scripted classifier, so no network access is needed.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

use cybertutor_core::admin::{ChapterPatch, ContentAdmin, ImportSummary};
use cybertutor_core::catalog::parse_catalog_str;
use cybertutor_core::classify::FALLBACK_LABELS;
use cybertutor_core::engine::{NewUser, Navigation};
use cybertutor_core::model::{
    Chapter, ChapterKind, ChapterState, ContentFormat, ExperimentGroup, Proficiency,
    SurveyResponse,
};
use cybertutor_core::records;
use cybertutor_core::traits::{
    Document, DocumentStore, ProficiencyClassifier, Query, ReadView, StaticIdentity,
    TransactionPlan, WriteOp,
};
use cybertutor_core::{EngineConfig, EngineError, ProgressionEngine, StoreError};
use cybertutor_providers::mock::{MockClassifier, Scripted};
use cybertutor_store::MemoryStore;

const COURSE: &str = r#"
[[topics]]
id = "t1"
title = "Network Security"
order = 1

[[topics.chapters]]
id = "c1"
title = "Firewalls"
kind = "text"
order = 1
content = { beginner = "basic", expert = "deep" }

[[topics.chapters]]
id = "c2"
title = "Firewall check"
kind = "assessment"
order = 2

[[topics.chapters.questions]]
id = "b1"
prompt = "b1?"
correct = "a"
difficulty = "beginner"
choices = { a = "yes", b = "no" }

[[topics.chapters.questions]]
id = "b2"
prompt = "b2?"
correct = "a"
difficulty = "beginner"
choices = { a = "yes", b = "no" }

[[topics.chapters.questions]]
id = "b3"
prompt = "b3?"
correct = "a"
difficulty = "beginner"
choices = { a = "yes", b = "no" }

[[topics.chapters.questions]]
id = "i1"
prompt = "i1?"
correct = "b"
difficulty = "intermediate"
choices = { a = "yes", b = "no" }

[[topics.chapters.questions]]
id = "e1"
prompt = "e1?"
correct = "b"
difficulty = "expert"
choices = { a = "yes", b = "no" }

[[topics.chapters.questions]]
id = "e2"
prompt = "e2?"
correct = "a"
difficulty = "expert"
choices = { a = "yes", b = "no" }

[[topics.chapters]]
id = "c3"
title = "Segmentation"
kind = "text"
order = 3
required_level = 2
content = { beginner = "zones" }

[[topics]]
id = "t2"
title = "Cryptography"
order = 2

[[topics.chapters]]
id = "k1"
title = "Ciphers"
kind = "video"
order = 1
content = { beginner = "https://videos.example/ciphers" }
"#;

const VALID_REPLY: &str = "expert, intermediate, beginner, beginner, expert";

struct Fixture {
    store: Arc<MemoryStore>,
    classifier: Arc<MockClassifier>,
    engine: Arc<ProgressionEngine>,
}

impl Fixture {
    async fn new(classifier: MockClassifier) -> Self {
        Self::with_config(classifier, test_config()).await
    }

    async fn with_config(classifier: MockClassifier, config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let classifier = Arc::new(classifier);
        let engine = ProgressionEngine::new(
            store.clone(),
            classifier.clone() as Arc<dyn ProficiencyClassifier>,
            config,
        )
        .with_rng(StdRng::seed_from_u64(42));

        let fixture = Self {
            store,
            classifier,
            engine: Arc::new(engine),
        };
        fixture
            .engine
            .register_user(NewUser {
                id: Some("admin".into()),
                display_name: "Admin".into(),
                superuser: true,
                ..Default::default()
            })
            .await
            .unwrap();
        let catalog = parse_catalog_str(COURSE, Path::new("course.toml")).unwrap();
        fixture.admin("admin").import_catalog(&catalog).await.unwrap();
        fixture
    }

    fn admin(&self, user: &str) -> ContentAdmin {
        ContentAdmin::new(
            self.store.clone(),
            Arc::new(StaticIdentity::signed_in(user)),
        )
    }

    async fn learner(&self, id: &str) -> String {
        self.engine
            .register_user(NewUser {
                id: Some(id.into()),
                display_name: id.into(),
                ..Default::default()
            })
            .await
            .unwrap()
            .id
    }

    async fn chapter(&self, id: &str) -> Chapter {
        self.engine.find_chapter(id).await.unwrap()
    }

    async fn set_label(&self, user: &str, topic: &str, label: &str) {
        let mut doc = Document::new();
        doc.insert("label".into(), json!(label));
        self.store
            .set_merge(&records::proficiency(user), topic, doc)
            .await
            .unwrap();
    }
}

/// Delegates to a [`MemoryStore`]. When armed, the next transaction runs its
/// plan and then fails before anything is applied.
struct FailingStore {
    inner: Arc<MemoryStore>,
    fail_next: AtomicBool,
}

#[async_trait]
impl DocumentStore for FailingStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn query(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        self.inner.query(collection, query).await
    }

    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError> {
        self.inner.set(collection, id, doc).await
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
    ) -> Result<(), StoreError> {
        self.inner.set_merge(collection, id, doc).await
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError> {
        self.inner.increment(collection, id, field, delta).await
    }

    async fn test_and_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
    ) -> Result<bool, StoreError> {
        self.inner.test_and_set(collection, id, field).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.inner.delete(collection, id).await
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        self.inner.batch_write(ops).await
    }

    async fn transact<'a>(&self, plan: TransactionPlan<'a>) -> Result<(), StoreError> {
        if !self.fail_next.swap(false, Ordering::SeqCst) {
            return self.inner.transact(plan).await;
        }
        self.inner
            .transact(Box::new(move |view: &dyn ReadView| {
                plan(view)?;
                Err(StoreError::Io(std::io::Error::other("disk full")))
            }))
            .await
    }
}

fn bare_engine(store: Arc<dyn DocumentStore>) -> ProgressionEngine {
    ProgressionEngine::new(
        store,
        Arc::new(MockClassifier::with_fixed_reply(VALID_REPLY)),
        test_config(),
    )
}

fn test_config() -> EngineConfig {
    EngineConfig {
        sample_size: 2,
        classifier_timeout: Duration::from_secs(1),
        classifier_max_retries: 1,
        classifier_retry_delay: Duration::ZERO,
        ..EngineConfig::default()
    }
}

// --- Levels and completion ---

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_level_increases_are_all_applied() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let user = fx.learner("ada").await;

    let tasks = (0..25).map(|_| {
        let engine = Arc::clone(&fx.engine);
        let user = user.clone();
        tokio::spawn(async move { engine.increase_level(&user, "t1").await.unwrap() })
    });
    let results: HashSet<u32> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.len(), 25);
    assert_eq!(fx.engine.level(&user, "t1").await.unwrap(), 25);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_passes_raise_level_once() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let user = fx.learner("ada").await;
    let quiz = fx.chapter("c2").await;

    let tasks = (0..2).map(|_| {
        let engine = Arc::clone(&fx.engine);
        let user = user.clone();
        let quiz = quiz.clone();
        tokio::spawn(async move {
            engine
                .record_assessment_outcome(&user, &quiz, 100.0, true, 30)
                .await
                .unwrap()
        })
    });
    let outcomes: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.newly_completed).count(), 1);
    assert_eq!(fx.engine.level(&user, "t1").await.unwrap(), 1);

    let keys: HashSet<String> = outcomes.into_iter().map(|o| o.attempt_key).collect();
    assert_eq!(
        keys,
        HashSet::from(["attempt1".to_string(), "attempt2".to_string()])
    );
}

#[tokio::test]
async fn first_pass_completes_with_one_attempt() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let user = fx.learner("ada").await;
    let quiz = fx.chapter("c2").await;

    let before = fx.engine.progress(&user, "c2").await.unwrap();
    assert!(!before.complete);
    assert!(before.attempts.is_empty());
    assert_eq!(before.state(), ChapterState::NotStarted);

    let outcome = fx
        .engine
        .record_assessment_outcome(&user, &quiz, 80.0, true, 75)
        .await
        .unwrap();
    assert!(outcome.newly_completed);
    assert_eq!(outcome.level, Some(1));

    let after = fx.engine.progress(&user, "c2").await.unwrap();
    assert!(after.complete);
    assert_eq!(after.attempts.keys().collect::<Vec<_>>(), vec!["attempt1"]);
    assert_eq!(after.attempts["attempt1"].elapsed, "1:15");
    assert_eq!(after.attempts["attempt1"].score, 80.0);
}

#[tokio::test]
async fn complete_is_terminal() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let user = fx.learner("ada").await;
    let quiz = fx.chapter("c2").await;

    let failed = fx
        .engine
        .record_assessment_outcome(&user, &quiz, 40.0, false, 10)
        .await
        .unwrap();
    assert!(!failed.newly_completed);
    assert_eq!(
        fx.engine.chapter_state(&user, "c2").await.unwrap(),
        ChapterState::InProgress
    );

    fx.engine
        .record_assessment_outcome(&user, &quiz, 90.0, true, 10)
        .await
        .unwrap();
    fx.engine
        .record_assessment_outcome(&user, &quiz, 10.0, false, 10)
        .await
        .unwrap();

    let progress = fx.engine.progress(&user, "c2").await.unwrap();
    assert_eq!(progress.state(), ChapterState::Complete);
    assert_eq!(progress.attempt_count, 3);
    let order: Vec<&str> = progress
        .attempts_in_order()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(order, vec!["attempt1", "attempt2", "attempt3"]);
    assert_eq!(fx.engine.level(&user, "t1").await.unwrap(), 1);
}

#[tokio::test]
async fn unknown_user_records_nothing() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let quiz = fx.chapter("c2").await;

    let err = fx
        .engine
        .record_assessment_outcome("ghost", &quiz, 100.0, true, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UserNotFound(_)));
    assert!(fx
        .store
        .get(&records::progress("ghost"), "c2")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn failed_pass_changes_nothing_and_can_be_retried() {
    let memory = Arc::new(MemoryStore::new());
    let store = Arc::new(FailingStore {
        inner: memory.clone(),
        fail_next: AtomicBool::new(false),
    });
    let engine = bare_engine(store.clone());
    engine
        .register_user(NewUser {
            id: Some("admin".into()),
            superuser: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let catalog = parse_catalog_str(COURSE, Path::new("course.toml")).unwrap();
    ContentAdmin::new(memory.clone(), Arc::new(StaticIdentity::signed_in("admin")))
        .import_catalog(&catalog)
        .await
        .unwrap();
    engine
        .register_user(NewUser {
            id: Some("ada".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    let quiz = engine.find_chapter("c2").await.unwrap();

    store.fail_next.store(true, Ordering::SeqCst);
    let err = engine
        .record_assessment_outcome("ada", &quiz, 100.0, true, 30)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(StoreError::Io(_))));

    let progress = engine.progress("ada", "c2").await.unwrap();
    assert!(!progress.complete);
    assert_eq!(progress.attempt_count, 0);
    assert!(progress.attempts.is_empty());
    assert_eq!(engine.level("ada", "t1").await.unwrap(), 0);

    let outcome = engine
        .record_assessment_outcome("ada", &quiz, 100.0, true, 30)
        .await
        .unwrap();
    assert!(outcome.newly_completed);
    assert_eq!(outcome.level, Some(1));
    assert_eq!(outcome.attempt_key, "attempt1");
    assert_eq!(engine.level("ada", "t1").await.unwrap(), 1);
    assert_eq!(engine.progress("ada", "c2").await.unwrap().attempt_count, 1);
}

// --- Navigation ---

#[tokio::test]
async fn last_possible_order_is_end_of_topic() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;

    let err = fx
        .engine
        .resolve_next_chapter(i64::MAX, "t1", 0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::EndOfTopic { order: i64::MAX, .. }
    ));
}

#[tokio::test]
async fn next_chapter_is_gated_by_level() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;

    assert_eq!(fx.engine.resolve_next_chapter(2, "t1", 1).await.unwrap(), None);
    assert_eq!(
        fx.engine.resolve_next_chapter(2, "t1", 2).await.unwrap(),
        Some("c3".to_string())
    );
    assert!(matches!(
        fx.engine.resolve_next_chapter(3, "t1", 5).await,
        Err(EngineError::EndOfTopic { .. })
    ));
}

#[tokio::test]
async fn navigation_and_presentation_follow_level() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let user = fx.learner("ada").await;
    let quiz = fx.chapter("c2").await;
    let gated = fx.chapter("c3").await;

    assert_eq!(
        fx.engine.navigate_next(&user, &quiz).await.unwrap(),
        Navigation::Locked {
            required: 2,
            current: 0
        }
    );
    assert!(matches!(
        fx.engine.present_chapter(&user, &gated).await,
        Err(EngineError::Locked {
            required: 2,
            current: 0
        })
    ));

    fx.engine.increase_level(&user, "t1").await.unwrap();
    fx.engine.increase_level(&user, "t1").await.unwrap();

    assert_eq!(
        fx.engine.navigate_next(&user, &quiz).await.unwrap(),
        Navigation::Open("c3".into())
    );
    assert_eq!(
        fx.engine.navigate_next(&user, &gated).await.unwrap(),
        Navigation::EndOfTopic {
            topic_id: "t1".into()
        }
    );
    assert_eq!(
        fx.engine.present_chapter(&user, &gated).await.unwrap().body,
        "zones"
    );
}

#[tokio::test]
async fn duplicate_order_resolves_to_lowest_id() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let mut twin = fx.chapter("c3").await;
    twin.id = "a-twin".into();
    twin.required_level = 0;
    let doc = records::encode("chapters", &twin.id, &twin).unwrap();
    fx.store
        .set(&records::chapters("t1"), &twin.id, doc)
        .await
        .unwrap();

    assert_eq!(
        fx.engine.resolve_next_chapter(2, "t1", 0).await.unwrap(),
        Some("a-twin".to_string())
    );
}

// --- Assessments ---

#[tokio::test]
async fn assessment_matches_learner_difficulty() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let user = fx.learner("ada").await;
    let quiz = fx.chapter("c2").await;

    let beginner = fx.engine.assemble_assessment(&user, &quiz).await.unwrap();
    assert_eq!(beginner.len(), 2);
    assert!(beginner
        .slots
        .iter()
        .all(|(_, q)| q.difficulty == Proficiency::Beginner));
    assert_eq!(beginner.answer_key.len(), 2);
    assert!(beginner.answer_key.contains_key("question1"));

    fx.set_label(&user, "t1", "expert").await;
    let expert = fx.engine.assemble_assessment(&user, &quiz).await.unwrap();
    let ids: HashSet<&str> = expert.slots.iter().map(|(_, q)| q.id.as_str()).collect();
    assert_eq!(ids, HashSet::from(["e1", "e2"]));
}

#[tokio::test]
async fn assessment_for_missing_topic_is_empty() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let user = fx.learner("ada").await;
    let mut orphan = fx.chapter("c2").await;
    orphan.topic_id = "gone".into();

    assert!(fx
        .engine
        .assemble_assessment(&user, &orphan)
        .await
        .unwrap()
        .is_empty());
}

// --- Classification and survey ---

#[tokio::test]
async fn malformed_replies_fall_back_to_beginner() {
    for reply in [
        "beginner, expert, beginner, beginner",
        "beginner, expert, beginner, beginner, wizard",
        "",
    ] {
        let fx = Fixture::new(MockClassifier::with_fixed_reply(reply)).await;
        assert_eq!(
            fx.engine.classify_proficiency("Q: hi\nA: hello").await,
            FALLBACK_LABELS
        );
        assert_eq!(fx.classifier.call_count(), 2);
    }
}

#[tokio::test]
async fn classifier_failure_is_retried() {
    let fx = Fixture::new(MockClassifier::failing_then(1, VALID_REPLY)).await;
    let labels = fx.engine.classify_proficiency("Q: a\nA: b").await;
    assert_eq!(labels[0], Proficiency::Expert);
    assert_eq!(labels[1], Proficiency::Intermediate);
    assert_eq!(fx.classifier.call_count(), 2);

    let prompt = fx.classifier.last_prompt().unwrap();
    assert!(prompt.contains("Network Security, Cryptography"));
    assert!(prompt.contains("Q: a\nA: b"));
}

#[tokio::test(start_paused = true)]
async fn slow_classifier_times_out() {
    let classifier = MockClassifier::scripted(
        vec![
            Scripted::Delay(Duration::from_secs(120), VALID_REPLY.into()),
            Scripted::Delay(Duration::from_secs(120), VALID_REPLY.into()),
        ],
        VALID_REPLY,
    );
    let fx = Fixture::new(classifier).await;
    assert_eq!(
        fx.engine.classify_proficiency("Q: a\nA: b").await,
        FALLBACK_LABELS
    );
}

#[tokio::test]
async fn survey_persists_labels_before_returning() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let user = fx.learner("ada").await;

    let outcome = fx
        .engine
        .apply_survey(
            &user,
            &[SurveyResponse {
                question: "Have you used Wireshark?".into(),
                answer: "Daily".into(),
            }],
        )
        .await
        .unwrap();

    assert_eq!(outcome.assignments.len(), 5);
    assert_eq!(
        outcome.assignments[0],
        (
            "Network Security".to_string(),
            Some("t1".to_string()),
            Proficiency::Expert
        )
    );
    assert_eq!(outcome.assignments[2].1, None);

    assert_eq!(
        fx.engine.proficiency(&user, "t1").await.unwrap(),
        Some(Proficiency::Expert)
    );
    assert_eq!(
        fx.engine.proficiency(&user, "t2").await.unwrap(),
        Some(Proficiency::Intermediate)
    );
    assert!(fx.engine.user(&user).await.unwrap().survey_completed);
}

// --- Accounts and presentation ---

#[tokio::test]
async fn registration_creates_default_records() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let user = fx.learner("ada").await;

    let levels = fx
        .store
        .query(&records::levels(&user), &Default::default())
        .await
        .unwrap();
    let labels = fx
        .store
        .query(&records::proficiency(&user), &Default::default())
        .await
        .unwrap();
    let progress = fx
        .store
        .query(&records::progress(&user), &Default::default())
        .await
        .unwrap();
    assert_eq!(levels.len(), 2);
    assert_eq!(labels.len(), 2);
    assert_eq!(progress.len(), 4);
    assert_eq!(fx.engine.proficiency(&user, "t1").await.unwrap(), None);

    assert!(matches!(
        fx.engine
            .register_user(NewUser {
                id: Some("ada".into()),
                ..Default::default()
            })
            .await,
        Err(EngineError::AlreadyExists(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations_do_not_duplicate() {
    let engine = Arc::new(bare_engine(Arc::new(MemoryStore::new())));

    let tasks = (0..10).map(|i| {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .register_user(NewUser {
                    id: Some(format!("root{i}")),
                    superuser: true,
                    ..Default::default()
                })
                .await
        })
    });
    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, EngineError::Forbidden(_))));

    let tasks = (0..10).map(|i| {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .register_user(NewUser {
                    id: Some("ada".into()),
                    display_name: format!("Ada {i}"),
                    ..Default::default()
                })
                .await
        })
    });
    let results: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    let winner = results
        .iter()
        .find_map(|r| r.as_ref().ok())
        .map(|u| u.display_name.clone())
        .unwrap();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(engine.user("ada").await.unwrap().display_name, winner);
}

#[tokio::test]
async fn both_groups_are_assigned() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let mut groups = HashSet::new();
    for i in 0..16 {
        let id = fx.learner(&format!("u{i}")).await;
        groups.insert(fx.engine.user(&id).await.unwrap().group);
    }
    assert_eq!(groups.len(), 2);
}

#[tokio::test]
async fn control_group_always_sees_baseline() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let intro = fx.chapter("c1").await;

    for i in 0..16 {
        let id = fx.learner(&format!("u{i}")).await;
        fx.set_label(&id, "t1", "expert").await;
        let group = fx.engine.user(&id).await.unwrap().group;
        let view = fx.engine.present_chapter(&id, &intro).await.unwrap();
        match group {
            ExperimentGroup::Control => assert_eq!(view.body, "basic"),
            ExperimentGroup::Experimental => assert_eq!(view.body, "deep"),
        }
    }
}

#[tokio::test]
async fn video_preference_mismatch_is_flagged() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let video = fx.chapter("k1").await;
    assert_eq!(video.kind, ChapterKind::Video);

    let reader = fx.learner("reader").await;
    let watcher = fx
        .engine
        .register_user(NewUser {
            id: Some("watcher".into()),
            display_name: "Watcher".into(),
            content_preference: ContentFormat::Video,
            superuser: false,
        })
        .await
        .unwrap()
        .id;

    assert!(fx.engine.present_chapter(&reader, &video).await.unwrap().format_mismatch);
    assert!(!fx.engine.present_chapter(&watcher, &video).await.unwrap().format_mismatch);
}

#[tokio::test]
async fn progress_overview_lists_topics_in_order() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let user = fx.learner("ada").await;
    let quiz = fx.chapter("c2").await;
    fx.engine
        .record_assessment_outcome(&user, &quiz, 100.0, true, 5)
        .await
        .unwrap();

    let rows = fx.engine.progress_overview(&user).await.unwrap();
    let titles: Vec<&str> = rows.iter().map(|r| r.topic.title.as_str()).collect();
    assert_eq!(titles, vec!["Network Security", "Cryptography"]);
    assert_eq!((rows[0].level, rows[0].completed, rows[0].total), (1, 1, 3));
    assert_eq!((rows[1].level, rows[1].completed, rows[1].total), (0, 0, 1));
}

#[tokio::test]
async fn malformed_documents_are_quarantined() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let mut bad = Document::new();
    bad.insert("title".into(), json!("Broken"));
    bad.insert("order".into(), json!("first"));
    fx.store.set(records::TOPICS, "bad", bad).await.unwrap();

    let topics = fx.engine.topics().await.unwrap();
    assert_eq!(topics.len(), 2);
    assert!(matches!(
        fx.engine.topic("bad").await,
        Err(EngineError::InvalidDocument { .. })
    ));
}

// --- Content authoring ---

#[tokio::test]
async fn learners_cannot_author_content() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let user = fx.learner("ada").await;

    let err = fx
        .admin(&user)
        .delete_topic("t1")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let anonymous = ContentAdmin::new(fx.store.clone(), Arc::new(StaticIdentity::anonymous()));
    assert!(matches!(
        anonymous.delete_topic("t1").await,
        Err(EngineError::Unauthenticated)
    ));
    assert!(fx.engine.topic("t1").await.is_ok());
}

#[tokio::test]
async fn chapter_orders_stay_unique() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let admin = fx.admin("admin");

    let err = admin
        .update_chapter(
            "t1",
            "c3",
            ChapterPatch {
                order: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    let moved = admin
        .update_chapter(
            "t1",
            "c3",
            ChapterPatch {
                order: Some(7),
                required_level: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!((moved.order, moved.required_level), (7, 1));
    assert_eq!(moved.title, "Segmentation");
}

#[tokio::test]
async fn deleting_a_topic_removes_its_content() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let admin = fx.admin("admin");

    assert_eq!(admin.questions("c2").await.unwrap().len(), 6);
    admin.delete_topic("t1").await.unwrap();

    assert!(matches!(
        fx.engine.topic("t1").await,
        Err(EngineError::TopicNotFound(_))
    ));
    assert!(fx.engine.chapters("t1").await.unwrap().is_empty());
    assert!(admin.questions("c2").await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_content_removes_learner_records() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let admin = fx.admin("admin");
    let user = fx.learner("ada").await;
    let quiz = fx.chapter("c2").await;
    fx.engine
        .record_assessment_outcome(&user, &quiz, 100.0, true, 5)
        .await
        .unwrap();

    admin.delete_chapter("t2", "k1").await.unwrap();
    assert!(fx
        .store
        .get(&records::progress(&user), "k1")
        .await
        .unwrap()
        .is_none());

    admin.delete_topic("t1").await.unwrap();
    let ids = |docs: Vec<(String, Document)>| -> Vec<String> {
        docs.into_iter().map(|(id, _)| id).collect()
    };
    assert_eq!(
        ids(fx.store.list(&records::levels(&user)).await.unwrap()),
        vec!["t2"]
    );
    assert_eq!(
        ids(fx.store.list(&records::proficiency(&user)).await.unwrap()),
        vec!["t2"]
    );
    assert!(fx
        .store
        .list(&records::progress(&user))
        .await
        .unwrap()
        .is_empty());
}

const WEB_COURSE: &str = r#"
[[topics]]
id = "t3"
title = "Web Security"
order = 3

[[topics.chapters]]
id = "w1"
title = "Injection"
kind = "assessment"
order = 1

[[topics.chapters.questions]]
id = "w-q1"
prompt = "Which input is trusted?"
correct = "a"
difficulty = "beginner"
choices = { a = "none", b = "all" }

[[topics.chapters.questions]]
id = "w-q2"
prompt = "Which header sets a content security policy?"
correct = "z"
difficulty = "beginner"
choices = { a = "Content-Security-Policy", b = "X-Frame-Options" }
"#;

#[tokio::test]
async fn rejected_import_writes_nothing() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let admin = fx.admin("admin");

    let broken = parse_catalog_str(WEB_COURSE, Path::new("web.toml")).unwrap();
    let err = admin.import_catalog(&broken).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidQuestion { ref id, .. } if id == "w-q2"));

    assert!(matches!(
        fx.engine.topic("t3").await,
        Err(EngineError::TopicNotFound(_))
    ));
    assert!(fx.engine.chapters("t3").await.unwrap().is_empty());
    assert!(admin.questions("w1").await.unwrap().is_empty());
    assert_eq!(fx.engine.topics().await.unwrap().len(), 2);

    let fixed = WEB_COURSE.replace(r#"correct = "z""#, r#"correct = "a""#);
    let catalog = parse_catalog_str(&fixed, Path::new("web.toml")).unwrap();
    assert_eq!(
        admin.import_catalog(&catalog).await.unwrap(),
        ImportSummary {
            topics: 1,
            chapters: 1,
            questions: 2,
        }
    );

    let err = admin.import_catalog(&catalog).await.unwrap_err();
    assert!(matches!(err, EngineError::AlreadyExists(_)));
    assert_eq!(admin.questions("w1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn import_rejects_duplicate_chapter_orders() {
    let fx = Fixture::new(MockClassifier::with_fixed_reply(VALID_REPLY)).await;
    let clashing = format!(
        "{}\n{}",
        WEB_COURSE.replace(r#"correct = "z""#, r#"correct = "a""#),
        r#"
[[topics.chapters]]
id = "w2"
title = "Cross-site scripting"
kind = "text"
order = 1
content = { beginner = "escape output" }
"#
    );
    let catalog = parse_catalog_str(&clashing, Path::new("web.toml")).unwrap();

    let err = fx.admin("admin").import_catalog(&catalog).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
    assert!(fx.engine.chapters("t3").await.unwrap().is_empty());
}
