use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::documents::DocumentStore;
use crate::error::StoreError;

pub const COLLECTION: &str = "health_checks";
const DOCUMENT_ID: &str = "check";

/// Round-trips a single overwritten document to prove the store is writable
/// and readable.
#[derive(Clone)]
pub struct HealthCheckRepo {
    store: Arc<dyn DocumentStore>,
}

impl HealthCheckRepo {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Write a fresh timestamp, then read the document back.
    ///
    /// Concurrent checks share the document, so the value read may be
    /// another check's write; any well-formed timestamp counts.
    pub async fn round_trip(&self) -> Result<(), StoreError> {
        let timestamp = Utc::now().to_rfc3339();
        self.store
            .set(COLLECTION, DOCUMENT_ID, json!({ "timestamp": timestamp }), false)
            .await?;

        let doc = self
            .store
            .get(COLLECTION, DOCUMENT_ID)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{COLLECTION}/{DOCUMENT_ID}")))?;

        let stored = doc["timestamp"].as_str().unwrap_or_default();
        DateTime::parse_from_rfc3339(stored).map_err(|e| StoreError::CorruptRow {
            table: COLLECTION,
            column: "timestamp",
            detail: format!("{stored:?}: {e}"),
        })?;
        Ok(())
    }
}
