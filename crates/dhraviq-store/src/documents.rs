//! JSON document storage grouped by collection.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tracing::instrument;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Minimal document-store contract used by the repositories.
///
/// Implementations must be safe to share across concurrent requests.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document. Fails with `Conflict` if the id is taken.
    async fn create(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError>;

    /// Write a document. With `merge`, top-level fields of `doc` overwrite
    /// the stored ones and every other stored field is kept; without it the
    /// document is replaced.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        doc: Value,
        merge: bool,
    ) -> Result<(), StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError>;
}

/// Shallow merge of `patch` into `base`. Non-object values replace.
pub fn merge_documents(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base), Value::Object(patch)) => {
            for (key, value) in patch {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (_, patch) => patch,
    }
}

/// `DocumentStore` over the embedded SQLite database.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    db: Database,
}

impl SqliteDocumentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> Result<u64, StoreError> {
        self.db.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                [collection],
                |row| row.get(0),
            )?;
            Ok(n as u64)
        })
    }
}

fn read_body(
    conn: &rusqlite::Connection,
    collection: &str,
    id: &str,
) -> Result<Option<Value>, StoreError> {
    let mut stmt = conn.prepare("SELECT body FROM documents WHERE collection = ?1 AND id = ?2")?;
    let mut rows = stmt.query([collection, id])?;
    match rows.next()? {
        Some(row) => {
            let raw: String = row_helpers::get(row, 0, "documents", "body")?;
            Ok(Some(row_helpers::parse_json(&raw, "documents", "body")?))
        }
        None => Ok(None),
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    #[instrument(skip(self, doc))]
    async fn create(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        let body = serde_json::to_string(&doc)?;
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO documents (collection, id, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![collection, id, body, now],
            )?;
            if inserted == 0 {
                return Err(StoreError::Conflict(format!("{collection}/{id}")));
            }
            Ok(())
        })
    }

    #[instrument(skip(self, doc))]
    async fn set(
        &self,
        collection: &str,
        id: &str,
        doc: Value,
        merge: bool,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let body = match (merge, read_body(&tx, collection, id)?) {
                (true, Some(existing)) => merge_documents(existing, doc),
                _ => doc,
            };
            let body = serde_json::to_string(&body)?;

            tx.execute(
                "INSERT INTO documents (collection, id, body, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(collection, id) DO UPDATE SET body = ?3, updated_at = ?4",
                rusqlite::params![collection, id, body, now],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    #[instrument(skip(self))]
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        self.db.with_conn(|conn| read_body(conn, collection, id))
    }
}
