//! SQLite-backed [`DocumentStore`].
//!
//! Each document is one row of the `documents` table keyed by
//! `(collection, id)`, with the body serialized to `data_json`. Field filters
//! are evaluated in SQL with `json_extract`. Run
//! [`migrate::apply`](crate::migrate::apply) before use.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, vec_to_blob};

use super::{
    ensure_object, merge_into, new_id, CachedEmbedding, DocumentStore, FieldFilter, Record,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn json_path(field: &str) -> Result<String> {
    if field.is_empty()
        || !field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        bail!("invalid filter field: {}", field);
    }
    Ok(format!("$.{}", field))
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<Record> {
    let id: String = row.get("id");
    let data_json: String = row.get("data_json");
    Ok(Record {
        id,
        data: serde_json::from_str(&data_json)?,
    })
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, collection: &str, data: &Value) -> Result<String> {
        let id = new_id();
        self.put(collection, &id, data).await?;
        Ok(id)
    }

    async fn put(&self, collection: &str, id: &str, data: &Value) -> Result<()> {
        ensure_object(data)?;
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data_json, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                data_json = excluded.data_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(serde_json::to_string(data)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT data_json FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let data_json: String = row.get("data_json");
                Ok(Some(serde_json::from_str(&data_json)?))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, collection: &str, id: &str, patch: &Value) -> Result<bool> {
        let patch = ensure_object(patch)?;
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT data_json FROM documents WHERE collection = ? AND id = ?")
            .bind(collection)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(false);
        };

        let data_json: String = row.get("data_json");
        let mut doc: Value = serde_json::from_str(&data_json)?;
        merge_into(&mut doc, patch);

        sqlx::query(
            "UPDATE documents SET data_json = ?, updated_at = ? WHERE collection = ? AND id = ?",
        )
        .bind(serde_json::to_string(&doc)?)
        .bind(chrono::Utc::now().timestamp())
        .bind(collection)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list(&self, collection: &str, filter: Option<&FieldFilter>) -> Result<Vec<Record>> {
        let rows = match filter {
            None => {
                sqlx::query(
                    "SELECT id, data_json FROM documents WHERE collection = ? ORDER BY created_at, rowid",
                )
                .bind(collection)
                .fetch_all(&self.pool)
                .await?
            }
            Some(filter) => {
                let path = json_path(&filter.field)?;
                if filter.value.is_null() {
                    sqlx::query(
                        "SELECT id, data_json FROM documents WHERE collection = ? AND json_extract(data_json, ?) IS NULL ORDER BY created_at, rowid",
                    )
                    .bind(collection)
                    .bind(path)
                    .fetch_all(&self.pool)
                    .await?
                } else {
                    let sql = "SELECT id, data_json FROM documents WHERE collection = ? AND json_extract(data_json, ?) = ? ORDER BY created_at, rowid";
                    let query = sqlx::query(sql).bind(collection).bind(path);
                    let query = match &filter.value {
                        Value::String(s) => query.bind(s.clone()),
                        Value::Bool(b) => query.bind(*b as i64),
                        Value::Number(n) => match n.as_i64() {
                            Some(i) => query.bind(i),
                            None => query.bind(n.as_f64().unwrap_or(0.0)),
                        },
                        _ => bail!("unsupported filter value for field {}", filter.field),
                    };
                    query.fetch_all(&self.pool).await?
                }
            }
        };

        rows.iter().map(row_to_record).collect()
    }

    async fn get_embedding(&self, key: &str, model: &str) -> Result<Option<CachedEmbedding>> {
        let row =
            sqlx::query("SELECT content_hash, vector FROM embeddings WHERE key = ? AND model = ?")
                .bind(key)
                .bind(model)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|row| {
            let blob: Vec<u8> = row.get("vector");
            CachedEmbedding {
                content_hash: row.get("content_hash"),
                vector: blob_to_vec(&blob),
            }
        }))
    }

    async fn put_embedding(
        &self,
        key: &str,
        model: &str,
        content_hash: &str,
        vector: &[f32],
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO embeddings (key, model, content_hash, dims, vector, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(key, model) DO UPDATE SET
                content_hash = excluded.content_hash,
                dims = excluded.dims,
                vector = excluded.vector,
                created_at = excluded.created_at
            "#,
        )
        .bind(key)
        .bind(model)
        .bind(content_hash)
        .bind(vector.len() as i64)
        .bind(vec_to_blob(vector))
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::{db, migrate};
    use serde_json::json;
    use tempfile::TempDir;

    async fn open_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal();
        config.db.path = tmp.path().join("grocer.sqlite");
        let pool = db::connect(&config).await.unwrap();
        migrate::apply(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    #[tokio::test]
    async fn test_insert_get_update() {
        let (_tmp, store) = open_store().await;
        let id = store
            .insert("items", &json!({"name": "milk", "price": 1.5}))
            .await
            .unwrap();

        let doc = store.get("items", &id).await.unwrap().unwrap();
        assert_eq!(doc["name"], "milk");

        assert!(store
            .update("items", &id, &json!({"price": 2.0}))
            .await
            .unwrap());
        let doc = store.get("items", &id).await.unwrap().unwrap();
        assert_eq!(doc["name"], "milk");
        assert_eq!(doc["price"], 2.0);

        assert!(!store
            .update("items", "missing", &json!({"price": 1}))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_list_filters_by_field() {
        let (_tmp, store) = open_store().await;
        store
            .put("users", "p1", &json!({"name": "Shop", "userType": "provider"}))
            .await
            .unwrap();
        store
            .put("users", "c1", &json!({"name": "Ana", "userType": "consumer"}))
            .await
            .unwrap();
        store
            .put("items", "i1", &json!({"name": "tea", "userType": "provider"}))
            .await
            .unwrap();

        let filter = FieldFilter::eq("userType", "provider");
        let providers = store.list("users", Some(&filter)).await.unwrap();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].id, "p1");

        let all = store.list("users", None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_rejects_non_object_body() {
        let (_tmp, store) = open_store().await;
        assert!(store.insert("items", &json!([1, 2])).await.is_err());
    }

    #[tokio::test]
    async fn test_embedding_cache_roundtrip() {
        let (_tmp, store) = open_store().await;
        assert!(store.get_embedding("i1", "m").await.unwrap().is_none());
        store
            .put_embedding("i1", "m", "h1", &[0.5, -1.0])
            .await
            .unwrap();
        store
            .put_embedding("i1", "m", "h2", &[1.0, 0.0])
            .await
            .unwrap();
        let cached = store.get_embedding("i1", "m").await.unwrap().unwrap();
        assert_eq!(cached.content_hash, "h2");
        assert_eq!(cached.vector, vec![1.0, 0.0]);
    }

    #[test]
    fn test_json_path_rejects_injection() {
        assert!(json_path("userType").is_ok());
        assert!(json_path("a') OR 1=1 --").is_err());
        assert!(json_path("").is_err());
    }
}
