//! In-memory [`DocumentStore`] for tests and ephemeral runs.
//!
//! Collections are insertion-ordered `Vec`s behind `std::sync::RwLock`.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use super::{
    ensure_object, merge_into, new_id, CachedEmbedding, DocumentStore, FieldFilter, Record,
};

#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<Record>>>,
    embeddings: RwLock<HashMap<(String, String), CachedEmbedding>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("in-memory store lock poisoned")
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert(&self, collection: &str, data: &Value) -> Result<String> {
        let id = new_id();
        self.put(collection, &id, data).await?;
        Ok(id)
    }

    async fn put(&self, collection: &str, id: &str, data: &Value) -> Result<()> {
        ensure_object(data)?;
        let mut collections = self.collections.write().map_err(poisoned)?;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.iter_mut().find(|r| r.id == id) {
            Some(existing) => existing.data = data.clone(),
            None => docs.push(Record {
                id: id.to_string(),
                data: data.clone(),
            }),
        }
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|r| r.id == id))
            .map(|r| r.data.clone()))
    }

    async fn update(&self, collection: &str, id: &str, patch: &Value) -> Result<bool> {
        let patch = ensure_object(patch)?;
        let mut collections = self.collections.write().map_err(poisoned)?;
        let Some(record) = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|r| r.id == id))
        else {
            return Ok(false);
        };
        merge_into(&mut record.data, patch);
        Ok(true)
    }

    async fn list(&self, collection: &str, filter: Option<&FieldFilter>) -> Result<Vec<Record>> {
        let collections = self.collections.read().map_err(poisoned)?;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|r| filter.map_or(true, |f| f.matches(&r.data)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_embedding(&self, key: &str, model: &str) -> Result<Option<CachedEmbedding>> {
        let embeddings = self.embeddings.read().map_err(poisoned)?;
        Ok(embeddings
            .get(&(key.to_string(), model.to_string()))
            .cloned())
    }

    async fn put_embedding(
        &self,
        key: &str,
        model: &str,
        content_hash: &str,
        vector: &[f32],
    ) -> Result<()> {
        let mut embeddings = self.embeddings.write().map_err(poisoned)?;
        embeddings.insert(
            (key.to_string(), model.to_string()),
            CachedEmbedding {
                content_hash: content_hash.to_string(),
                vector: vector.to_vec(),
            },
        );
        Ok(())
    }
}
