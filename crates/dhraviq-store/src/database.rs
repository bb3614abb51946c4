use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::schema;

/// Handle to the document database. Clones share one connection; the lock is
/// held only for the duration of a `with_conn` closure.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    location: PathBuf,
}

impl Database {
    /// Open (creating parent directories and schema as needed).
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .map_err(|e| StoreError::Io(format!("{}: {e}", dir.display())))?;
        }
        let db = Self::prepare(Connection::open(path)?, path.to_owned())?;
        info!(path = %path.display(), "document database opened");
        Ok(db)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::prepare(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn prepare(conn: Connection, location: PathBuf) -> Result<Self, StoreError> {
        conn.execute_batch(schema::PRAGMAS)
            .map_err(|e| StoreError::Database(format!("pragmas: {e}")))?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location,
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        f(&self.conn.lock())
    }

    pub fn path(&self) -> &Path {
        &self.location
    }
}

fn migrate(conn: &Connection) -> Result<(), StoreError> {
    let current: u32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current >= schema::SCHEMA_VERSION {
        return Ok(());
    }
    debug!(from = current, to = schema::SCHEMA_VERSION, "migrating document schema");
    conn.execute_batch(schema::DOCUMENTS_V1)
        .map_err(|e| StoreError::Database(format!("schema: {e}")))?;
    conn.pragma_update(None, "user_version", schema::SCHEMA_VERSION)?;
    Ok(())
}
