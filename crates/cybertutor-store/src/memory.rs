//! In-process document store.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use cybertutor_core::error::StoreError;
use cybertutor_core::traits::{Document, DocumentStore, Query, TransactionPlan, WriteOp};

use crate::snapshot::Snapshot;

/// A [`DocumentStore`] that lives in memory and is lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.inner.read().await.get(collection, id))
    }

    async fn query(
        &self,
        collection: &str,
        query: &Query,
    ) -> Result<Vec<(String, Document)>, StoreError> {
        Ok(self.inner.read().await.query(collection, query))
    }

    async fn set(&self, collection: &str, id: &str, doc: Document) -> Result<(), StoreError> {
        trace!(collection, id, "set");
        self.inner.write().await.set(collection, id, doc);
        Ok(())
    }

    async fn set_merge(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
    ) -> Result<(), StoreError> {
        trace!(collection, id, "merge");
        self.inner.write().await.merge(collection, id, doc);
        Ok(())
    }

    async fn increment(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError> {
        self.inner
            .write()
            .await
            .increment(collection, id, field, delta)
    }

    async fn test_and_set(
        &self,
        collection: &str,
        id: &str,
        field: &str,
    ) -> Result<bool, StoreError> {
        self.inner.write().await.test_and_set(collection, id, field)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.inner.write().await.delete(collection, id);
        Ok(())
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        trace!(ops = ops.len(), "batch");
        self.inner.write().await.apply_all(ops)
    }

    async fn transact<'a>(&self, plan: TransactionPlan<'a>) -> Result<(), StoreError> {
        self.inner.write().await.transact(plan)
    }
}
