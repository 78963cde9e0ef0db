//! Collaborator traits: document store, identity, and proficiency classifier.
//!
//! The engine never talks to a concrete backend. Store implementations live
//! in `cybertutor-store`, classifier implementations in `cybertutor-providers`.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// A schemaless document: field name to JSON value.
pub type Document = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// Document store
// ---------------------------------------------------------------------------

/// Equality query with optional ordering.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// `(field, value)` pairs; all must match.
    pub filters: Vec<(String, Value)>,
    /// Field to sort ascending by. Documents missing the field sort first.
    pub order_by: Option<String>,
}

impl Query {
    /// A query that matches every document in the collection.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.filters.push((field.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by = Some(field.to_string());
        self
    }

    /// Returns `true` if `doc` satisfies every filter.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters
            .iter()
            .all(|(field, value)| doc.get(field) == Some(value))
    }
}

/// One write inside a [`DocumentStore::batch_write`].
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Replace the whole document.
    Set {
        collection: String,
        id: String,
        doc: Document,
    },
    /// Deep-merge fields into the document, creating it if missing.
    Merge {
        collection: String,
        id: String,
        doc: Document,
    },
    Delete { collection: String, id: String },
    /// Add `delta` to an integer field; missing documents and fields start from 0.
    Increment {
        collection: String,
        id: String,
        field: String,
        delta: i64,
    },
}

/// Consistent read access inside [`DocumentStore::transact`].
pub trait ReadView {
    fn get(&self, collection: &str, id: &str) -> Option<Document>;

    fn query(&self, collection: &str, query: &Query) -> Vec<(String, Document)>;
}

/// Plans a transaction's writes from what it reads. Returning no operations
/// commits nothing.
pub type TransactionPlan<'a> =
    Box<dyn FnOnce(&dyn ReadView) -> Result<Vec<WriteOp>, StoreError> + Send + 'a>;

/// Remote document database contract.
///
/// Implementations must serialize concurrent writes to the same document,
/// and merge writes must not clobber fields they do not mention.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch one document by id.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Return `(id, document)` pairs matching `query`.
    async fn query(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<(String, Document)>, StoreError>;

    /// Every document in a collection.
    async fn list(&self, collection: &str) -> Result<Vec<(String, Document)>, StoreError> {
        self.query(collection, &Query::all()).await
    }

    /// Replace a document.
    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError>;

    /// Deep-merge fields into a document, creating it if missing.
    async fn set_merge(&self, collection: &str, id: &str, doc: Document)
        -> Result<(), StoreError>;

    /// Atomically add `delta` to an integer field and return the new value.
    /// Missing documents and fields start from 0.
    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError>;

    /// Atomically set a boolean field to `true`. Returns `true` only for the
    /// call that changed it from unset/false.
    async fn test_and_set(&self, collection: &str, id: &str, field: &str)
        -> Result<bool, StoreError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Apply all operations or none.
    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError>;

    /// Run `plan` against the current state and apply its writes, all or
    /// none, with no other write in between.
    async fn transact<'a>(&self, plan: TransactionPlan<'a>) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Resolves the acting user.
pub trait IdentityProvider: Send + Sync {
    fn current_user_id(&self) -> Option<String>;
}

/// Identity fixed at construction (e.g. from a CLI flag).
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(Option<String>);

impl StaticIdentity {
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self(Some(user_id.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_user_id(&self) -> Option<String> {
        self.0.clone()
    }
}

// ---------------------------------------------------------------------------
// Proficiency classifier
// ---------------------------------------------------------------------------

/// Text-generation backend that labels learner proficiency.
///
/// The classifier only returns free text; parsing and validation belong to
/// [`crate::classify`].
#[async_trait]
pub trait ProficiencyClassifier: Send + Sync {
    /// Human-readable backend name (e.g. "anthropic").
    fn name(&self) -> &str;

    async fn classify(&self, prompt: &str) -> anyhow::Result<String>;
}
