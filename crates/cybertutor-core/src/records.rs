//! Collection layout and the typed decoding boundary.
//!
//! | Record      | Collection                  | Id         |
//! |-------------|-----------------------------|------------|
//! | User        | `users`                     | user id    |
//! | Topic       | `topics`                    | topic id   |
//! | Chapter     | `topics/{topic}/chapters`   | chapter id |
//! | Question    | `questions`                 | question id|
//! | Proficiency | `users/{user}/proficiency`  | topic id   |
//! | Level       | `users/{user}/levels`       | topic id   |
//! | Progress    | `users/{user}/progress`     | chapter id |
//!
//! Direct reads of a malformed document fail with
//! [`EngineError::InvalidDocument`]; malformed documents inside query results
//! are quarantined (logged and skipped) so one bad record cannot poison a list.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{EngineError, Result, StoreError};
use crate::traits::{Document, DocumentStore, Query, ReadView};

pub const USERS: &str = "users";
pub const TOPICS: &str = "topics";
pub const QUESTIONS: &str = "questions";

pub fn chapters(topic_id: &str) -> String {
    format!("topics/{topic_id}/chapters")
}

pub fn proficiency(user_id: &str) -> String {
    format!("users/{user_id}/proficiency")
}

pub fn levels(user_id: &str) -> String {
    format!("users/{user_id}/levels")
}

pub fn progress(user_id: &str) -> String {
    format!("users/{user_id}/progress")
}

/// Decode a document into a typed record. `id` is injected when the body
/// does not carry one.
pub fn decode<T: DeserializeOwned>(collection: &str, id: &str, mut doc: Document) -> Result<T> {
    doc.entry("id")
        .or_insert_with(|| Value::String(id.to_string()));
    serde_json::from_value(Value::Object(doc)).map_err(|e| EngineError::InvalidDocument {
        collection: collection.to_string(),
        id: id.to_string(),
        message: e.to_string(),
    })
}

/// Encode a typed record into a document body.
pub fn encode<T: Serialize>(collection: &str, id: &str, record: &T) -> Result<Document> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(EngineError::InvalidDocument {
            collection: collection.to_string(),
            id: id.to_string(),
            message: format!("record encoded to non-object value: {other}"),
        }),
        Err(e) => Err(EngineError::InvalidDocument {
            collection: collection.to_string(),
            id: id.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Fetch and decode one record. `Ok(None)` when the document is missing.
pub async fn fetch<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<T>> {
    match store.get(collection, id).await? {
        Some(doc) => decode(collection, id, doc).map(Some),
        None => {
            tracing::debug!(collection, id, "document missing");
            Ok(None)
        }
    }
}

/// Decode a record read inside a transaction. A missing document reads as
/// the default record.
pub fn read_or_default<T: DeserializeOwned + Default>(
    view: &dyn ReadView,
    collection: &str,
    id: &str,
) -> Result<T, StoreError> {
    match view.get(collection, id) {
        Some(doc) => Ok(serde_json::from_value(Value::Object(doc))?),
        None => Ok(T::default()),
    }
}

/// Run a query and decode every match, skipping malformed documents.
pub async fn fetch_all<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    query: &Query,
) -> Result<Vec<T>> {
    let docs = store.query(collection, query).await?;
    let mut records = Vec::with_capacity(docs.len());
    for (id, doc) in docs {
        match decode(collection, &id, doc) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("quarantined {collection}/{id}: {e}"),
        }
    }
    Ok(records)
}
