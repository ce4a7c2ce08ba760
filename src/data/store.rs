//! Document store
//!
//! The persistence contract of the federation core: named collections
//! of JSON documents keyed by slug, with single-document reads,
//! merge-writes, create-if-absent, array union/remove, transactions,
//! and a key-only projection query over the embedded actor id.
//!
//! Backed by a single SQLite table through sqlx; SQLite transactions
//! provide the read-modify-write atomicity the multi-document updates
//! rely on.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::error::AppError;

/// Collections used by the federation core.
pub const FOLLOWERS: &str = "followers";
pub const REPLIES: &str = "replies";
pub const LIKES: &str = "likes";
pub const SHARES: &str = "shares";

const CREATE_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    key        TEXT NOT NULL,
    body       TEXT NOT NULL,
    PRIMARY KEY (collection, key)
)";

const CREATE_ACTOR_INDEX: &str = "\
CREATE INDEX IF NOT EXISTS idx_documents_actor
    ON documents (collection, json_extract(body, '$.Actor.Id'))";

/// Document store handle; cheap to clone through `Arc` in app state.
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    /// Open (and create if needed) the store at `path`.
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_ACTOR_INDEX).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// In-memory store for tests.
    pub async fn connect_in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(AppError::Database)?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_ACTOR_INDEX).execute(&pool).await?;
        Ok(Self { pool })
    }

    /// Read one document.
    pub async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>, AppError> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| parse_body(row.get::<String, _>(0)))
            .transpose()
    }

    /// Write one document, replacing any existing body.
    pub async fn set(&self, collection: &str, key: &str, doc: &Value) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO documents (collection, key, body) VALUES (?, ?, ?)
             ON CONFLICT (collection, key) DO UPDATE SET body = excluded.body",
        )
        .bind(collection)
        .bind(key)
        .bind(doc.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete one document. Deleting an absent document succeeds.
    pub async fn delete(&self, collection: &str, key: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// All documents of a collection, ordered by key.
    pub async fn list(&self, collection: &str) -> Result<Vec<Value>, AppError> {
        let rows = sqlx::query("SELECT body FROM documents WHERE collection = ? ORDER BY key")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| parse_body(row.get::<String, _>(0)))
            .collect()
    }

    /// Documents for a list of keys; absent keys are skipped.
    pub async fn get_many(
        &self,
        collection: &str,
        keys: &[String],
    ) -> Result<Vec<Value>, AppError> {
        let mut docs = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(doc) = self.get(collection, key).await? {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    /// Projection query: the keys of every document in `collection`
    /// whose embedded `Actor.Id` equals `actor_id`. Bodies are not
    /// materialized.
    pub async fn keys_for_actor(
        &self,
        collection: &str,
        actor_id: &str,
    ) -> Result<Vec<String>, AppError> {
        let rows = sqlx::query(
            "SELECT key FROM documents
             WHERE collection = ? AND json_extract(body, '$.Actor.Id') = ?",
        )
        .bind(collection)
        .bind(actor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get::<String, _>(0)).collect())
    }

    /// Bulk-rewrite the embedded `Actor` of the given documents.
    ///
    /// One batch per call; the batch commits (flushes) before
    /// returning, so callers invoke this once per collection.
    pub async fn rewrite_actor(
        &self,
        collection: &str,
        keys: &[String],
        actor: &Value,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        for key in keys {
            sqlx::query(
                "UPDATE documents SET body = json_set(body, '$.Actor', json(?))
                 WHERE collection = ? AND key = ?",
            )
            .bind(actor.to_string())
            .bind(collection)
            .bind(key)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Begin a transaction for a multi-document update.
    pub async fn begin(&self) -> Result<StoreTx<'_>, AppError> {
        Ok(StoreTx {
            tx: self.pool.begin().await?,
        })
    }
}

/// An open store transaction.
///
/// Dropping without [`StoreTx::commit`] rolls everything back.
pub struct StoreTx<'a> {
    tx: Transaction<'a, Sqlite>,
}

impl StoreTx<'_> {
    pub async fn get(&mut self, collection: &str, key: &str) -> Result<Option<Value>, AppError> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await?;

        row.map(|row| parse_body(row.get::<String, _>(0)))
            .transpose()
    }

    /// Create a document; fails with `AlreadyDone` if the key exists.
    ///
    /// This is the idempotency guard on concurrent inserts.
    pub async fn create(
        &mut self,
        collection: &str,
        key: &str,
        doc: &Value,
    ) -> Result<(), AppError> {
        let result = sqlx::query("INSERT INTO documents (collection, key, body) VALUES (?, ?, ?)")
            .bind(collection)
            .bind(key)
            .bind(doc.to_string())
            .execute(&mut *self.tx)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                AppError::AlreadyDone(format!("document {collection}/{key} already exists")),
            ),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn set(&mut self, collection: &str, key: &str, doc: &Value) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO documents (collection, key, body) VALUES (?, ?, ?)
             ON CONFLICT (collection, key) DO UPDATE SET body = excluded.body",
        )
        .bind(collection)
        .bind(key)
        .bind(doc.to_string())
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    /// Merge-write: deep-merge `patch` into the document, creating it
    /// when absent. Objects merge recursively, everything else is
    /// overwritten.
    pub async fn merge(
        &mut self,
        collection: &str,
        key: &str,
        patch: &Value,
    ) -> Result<(), AppError> {
        let mut doc = self
            .get(collection, key)
            .await?
            .unwrap_or_else(|| Value::Object(Default::default()));
        deep_merge(&mut doc, patch);
        self.set(collection, key, &doc).await
    }

    /// Add `value` to the string array at `path`, creating the
    /// document and intermediate objects as needed. Values already
    /// present are not duplicated.
    pub async fn array_union(
        &mut self,
        collection: &str,
        key: &str,
        path: &[&str],
        value: &str,
    ) -> Result<(), AppError> {
        let mut doc = self
            .get(collection, key)
            .await?
            .unwrap_or_else(|| Value::Object(Default::default()));

        let items = array_at(&mut doc, path)?;
        if !items.iter().any(|item| item.as_str() == Some(value)) {
            items.push(Value::String(value.to_string()));
        }

        self.set(collection, key, &doc).await
    }

    /// Remove `value` from the string array at `path`.
    ///
    /// Returns false when the document does not exist.
    pub async fn array_remove(
        &mut self,
        collection: &str,
        key: &str,
        path: &[&str],
        value: &str,
    ) -> Result<bool, AppError> {
        let Some(mut doc) = self.get(collection, key).await? else {
            return Ok(false);
        };

        let items = array_at(&mut doc, path)?;
        items.retain(|item| item.as_str() != Some(value));

        self.set(collection, key, &doc).await?;
        Ok(true)
    }

    pub async fn delete(&mut self, collection: &str, key: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn commit(self) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn parse_body(body: String) -> Result<Value, AppError> {
    serde_json::from_str(&body)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt document body: {e}")))
}

fn deep_merge(doc: &mut Value, patch: &Value) {
    match (doc, patch) {
        (Value::Object(doc), Value::Object(patch)) => {
            for (key, value) in patch {
                deep_merge(doc.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (doc, patch) => *doc = patch.clone(),
    }
}

/// Navigate to the array at `path`, creating missing objects and the
/// array itself along the way.
fn array_at<'a>(doc: &'a mut Value, path: &[&str]) -> Result<&'a mut Vec<Value>, AppError> {
    let mut current = doc;
    for segment in path {
        if !current.is_object() {
            *current = Value::Object(Default::default());
        }
        current = current
            .as_object_mut()
            .expect("just ensured object")
            .entry(segment.to_string())
            .or_insert(Value::Null);
    }
    if !current.is_array() {
        *current = Value::Array(Vec::new());
    }
    current
        .as_array_mut()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("not an array")))
}
