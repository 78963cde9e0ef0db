//! The collection map shared by both stores, and the write semantics.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use cybertutor_core::error::StoreError;
use cybertutor_core::traits::{Document, Query, ReadView, TransactionPlan, WriteOp};

/// Every collection, keyed by path, then document id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    #[serde(default)]
    collections: BTreeMap<String, BTreeMap<String, Document>>,
}

impl Snapshot {
    pub(crate) fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections.get(collection)?.get(id).cloned()
    }

    pub(crate) fn query(&self, collection: &str, query: &Query) -> Vec<(String, Document)> {
        let Some(docs) = self.collections.get(collection) else {
            return Vec::new();
        };

        let mut matches: Vec<(String, Document)> = docs
            .iter()
            .filter(|(_, doc)| query.matches(doc))
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect();

        if let Some(field) = &query.order_by {
            matches.sort_by(|(_, a), (_, b)| compare_values(a.get(field), b.get(field)));
        }
        matches
    }

    fn doc_mut(&mut self, collection: &str, id: &str) -> &mut Document {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .entry(id.to_string())
            .or_default()
    }

    pub(crate) fn set(&mut self, collection: &str, id: &str, doc: Document) {
        *self.doc_mut(collection, id) = doc;
    }

    pub(crate) fn merge(&mut self, collection: &str, id: &str, patch: Document) {
        deep_merge(self.doc_mut(collection, id), patch);
    }

    pub(crate) fn delete(&mut self, collection: &str, id: &str) {
        if let Some(docs) = self.collections.get_mut(collection) {
            docs.remove(id);
            if docs.is_empty() {
                self.collections.remove(collection);
            }
        }
    }

    pub(crate) fn increment(
        &mut self,
        collection: &str,
        id: &str,
        field: &str,
        delta: i64,
    ) -> Result<i64, StoreError> {
        let doc = self.doc_mut(collection, id);
        let current = match doc.get(field) {
            None | Some(Value::Null) => 0,
            Some(value) => value.as_i64().ok_or_else(|| StoreError::TypeMismatch {
                collection: collection.to_string(),
                id: id.to_string(),
                field: field.to_string(),
                message: format!("expected integer, found {value}"),
            })?,
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| StoreError::TypeMismatch {
                collection: collection.to_string(),
                id: id.to_string(),
                field: field.to_string(),
                message: format!("adding {delta} to {current} overflows"),
            })?;
        doc.insert(field.to_string(), Value::from(next));
        Ok(next)
    }

    pub(crate) fn test_and_set(
        &mut self,
        collection: &str,
        id: &str,
        field: &str,
    ) -> Result<bool, StoreError> {
        let doc = self.doc_mut(collection, id);
        match doc.get(field) {
            Some(Value::Bool(true)) => Ok(false),
            None | Some(Value::Null) | Some(Value::Bool(false)) => {
                doc.insert(field.to_string(), Value::Bool(true));
                Ok(true)
            }
            Some(other) => Err(StoreError::TypeMismatch {
                collection: collection.to_string(),
                id: id.to_string(),
                field: field.to_string(),
                message: format!("expected boolean, found {other}"),
            }),
        }
    }

    fn apply(&mut self, op: WriteOp) -> Result<(), StoreError> {
        match op {
            WriteOp::Set {
                collection,
                id,
                doc,
            } => self.set(&collection, &id, doc),
            WriteOp::Merge {
                collection,
                id,
                doc,
            } => self.merge(&collection, &id, doc),
            WriteOp::Delete { collection, id } => self.delete(&collection, &id),
            WriteOp::Increment {
                collection,
                id,
                field,
                delta,
            } => {
                self.increment(&collection, &id, &field, delta)?;
            }
        }
        Ok(())
    }

    /// Apply `ops` in order. On any failure the snapshot is left as it was.
    pub(crate) fn apply_all(&mut self, ops: Vec<WriteOp>) -> Result<(), StoreError> {
        if ops.is_empty() {
            return Ok(());
        }
        let mut next = self.clone();
        for op in ops {
            next.apply(op)?;
        }
        *self = next;
        Ok(())
    }

    pub(crate) fn transact(&mut self, plan: TransactionPlan<'_>) -> Result<(), StoreError> {
        let ops = plan(&*self)?;
        self.apply_all(ops)
    }
}

impl ReadView for Snapshot {
    fn get(&self, collection: &str, id: &str) -> Option<Document> {
        Snapshot::get(self, collection, id)
    }

    fn query(&self, collection: &str, query: &Query) -> Vec<(String, Document)> {
        Snapshot::query(self, collection, query)
    }
}

/// Merge `patch` into `target`. Nested objects merge field by field; any
/// other value replaces what was there.
pub(crate) fn deep_merge(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming)
            }
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

/// Ordering for `order_by`: missing values first, then numbers, strings, booleans.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
