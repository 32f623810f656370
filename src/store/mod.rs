//! Document store abstraction.
//!
//! The [`DocumentStore`] trait is the only way the rest of the crate touches
//! persisted data. Documents are JSON objects grouped into named collections
//! (see [`collections`](crate::models::collections)) and addressed by an
//! opaque string id, the same model the platform's managed document database
//! exposes. Two backends ship with the crate:
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`SqliteStore`] | Default, file-backed via sqlx |
//! | [`InMemoryStore`] | Tests and ephemeral runs |
//!
//! The store also caches catalog embedding vectors so semantic matching does
//! not re-embed unchanged items on every query.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// A stored document together with its id.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub data: Value,
}

impl Record {
    /// Flattens into `{ "id": ..., ...data }`, the shape list endpoints return.
    pub fn into_json(self) -> Value {
        with_id(&self.id, self.data)
    }
}

/// Prepends `id` to a document body.
pub fn with_id(id: &str, data: Value) -> Value {
    let mut out = Map::new();
    out.insert("id".to_string(), Value::String(id.to_string()));
    if let Value::Object(fields) = data {
        for (k, v) in fields {
            if k != "id" {
                out.insert(k, v);
            }
        }
    }
    Value::Object(out)
}

/// Equality filter on a top-level document field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: Value,
}

impl FieldFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, doc: &Value) -> bool {
        let actual = doc.get(&self.field).unwrap_or(&Value::Null);
        match (actual, &self.value) {
            (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
            (a, b) => a == b,
        }
    }
}

/// An embedding vector cached for a catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEmbedding {
    pub content_hash: String,
    pub vector: Vec<f32>,
}

/// Abstract document storage.
///
/// All bodies passed in must be JSON objects. `update` is a shallow merge of
/// top-level fields and reports whether the document existed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store a new document under a generated id and return the id.
    async fn insert(&self, collection: &str, data: &Value) -> Result<String>;

    /// Create or overwrite the document at `id`.
    async fn put(&self, collection: &str, id: &str, data: &Value) -> Result<()>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Merge `patch` into an existing document. Returns `false` if there was
    /// no document to update.
    async fn update(&self, collection: &str, id: &str, patch: &Value) -> Result<bool>;

    /// All documents in a collection, oldest first, optionally filtered.
    async fn list(&self, collection: &str, filter: Option<&FieldFilter>) -> Result<Vec<Record>>;

    async fn get_embedding(&self, key: &str, model: &str) -> Result<Option<CachedEmbedding>>;

    async fn put_embedding(
        &self,
        key: &str,
        model: &str,
        content_hash: &str,
        vector: &[f32],
    ) -> Result<()>;
}

pub(crate) fn ensure_object(data: &Value) -> Result<&Map<String, Value>> {
    match data {
        Value::Object(map) => Ok(map),
        _ => bail!("document body must be a JSON object"),
    }
}

pub(crate) fn merge_into(target: &mut Value, patch: &Map<String, Value>) {
    if let Value::Object(fields) = target {
        for (k, v) in patch {
            fields.insert(k.clone(), v.clone());
        }
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Fetch and deserialize a single document.
pub async fn fetch<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    id: &str,
) -> Result<Option<T>> {
    match store.get(collection, id).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// List and deserialize a collection. Documents that do not fit `T` are
/// skipped with a warning.
pub async fn list_as<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: &str,
    filter: Option<&FieldFilter>,
) -> Result<Vec<(String, T)>> {
    let records = store.list(collection, filter).await?;
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        match serde_json::from_value::<T>(record.data) {
            Ok(doc) => out.push((record.id, doc)),
            Err(e) => tracing::warn!(collection, id = %record.id, error = %e, "skipping malformed document"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_with_id_prepends_and_overrides() {
        let v = with_id("abc", json!({"id": "stale", "name": "milk"}));
        assert_eq!(v, json!({"id": "abc", "name": "milk"}));
    }

    #[test]
    fn test_filter_number_equality_ignores_repr() {
        let f = FieldFilter::eq("price", json!(2));
        assert!(f.matches(&json!({"price": 2.0})));
        assert!(!f.matches(&json!({"price": 3})));
        assert!(!f.matches(&json!({})));
    }
}
