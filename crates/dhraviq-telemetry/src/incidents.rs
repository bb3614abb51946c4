//! Incident log: WARN and ERROR events persisted to SQLite so an operator can
//! look up what happened behind a correlation id returned to a caller.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::{span, Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

const DEFAULT_LIMIT: u32 = 100;

const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
CREATE TABLE IF NOT EXISTS incidents (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp      TEXT NOT NULL,
    level          TEXT NOT NULL,
    target         TEXT NOT NULL,
    message        TEXT NOT NULL,
    fields         TEXT,
    correlation_id TEXT,
    agent          TEXT
);
CREATE INDEX IF NOT EXISTS idx_incidents_correlation ON incidents(correlation_id);
CREATE INDEX IF NOT EXISTS idx_incidents_timestamp ON incidents(timestamp);
";

// NULL parameters disable their filter.
const QUERY: &str = "
SELECT id, timestamp, level, target, message, fields, correlation_id, agent
FROM incidents
WHERE (?1 IS NULL OR correlation_id = ?1)
  AND (?2 IS NULL OR agent = ?2)
  AND (?3 IS NULL OR level = ?3)
  AND (?4 IS NULL OR timestamp >= ?4)
ORDER BY id DESC
LIMIT ?5
";

/// A persisted warn+ event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IncidentRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    pub fields: Option<String>,
    pub correlation_id: Option<String>,
    pub agent: Option<String>,
}

/// Filters for incident lookups. Empty query returns the latest incidents.
#[derive(Clone, Debug, Default)]
pub struct IncidentQuery {
    pub correlation_id: Option<String>,
    pub agent: Option<String>,
    pub level: Option<String>,
    pub since: Option<String>,
    pub limit: Option<u32>,
}

pub struct IncidentSink {
    conn: Mutex<Connection>,
}

impl IncidentSink {
    pub fn open(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(dir) = db_path.parent() {
            // Connection::open reports the real failure if this didn't work.
            let _ = std::fs::create_dir_all(dir);
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // Write failures are dropped: logging about a failed log write would
    // recurse into this layer.
    fn insert(&self, incident: &Incident) {
        let _ = self.conn.lock().execute(
            "INSERT INTO incidents (timestamp, level, target, message, fields, correlation_id, agent)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                incident.timestamp,
                incident.level,
                incident.target,
                incident.message,
                incident.fields,
                incident.tags.correlation_id,
                incident.tags.agent,
            ],
        );
    }

    /// Newest first.
    pub fn query(&self, q: &IncidentQuery) -> Result<Vec<IncidentRecord>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(QUERY)?;
        let rows = stmt.query_map(
            params![
                q.correlation_id,
                q.agent,
                q.level.as_deref().map(str::to_uppercase),
                q.since,
                q.limit.unwrap_or(DEFAULT_LIMIT),
            ],
            |row| {
                Ok(IncidentRecord {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    level: row.get(2)?,
                    target: row.get(3)?,
                    message: row.get(4)?,
                    fields: row.get(5)?,
                    correlation_id: row.get(6)?,
                    agent: row.get(7)?,
                })
            },
        )?;
        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM incidents", [], |row| row.get(0))
    }
}

/// Request-scoped identifiers an incident is filed under.
#[derive(Clone, Debug, Default)]
struct Tags {
    correlation_id: Option<String>,
    agent: Option<String>,
}

impl Tags {
    fn is_empty(&self) -> bool {
        self.correlation_id.is_none() && self.agent.is_none()
    }

    fn is_complete(&self) -> bool {
        self.correlation_id.is_some() && self.agent.is_some()
    }

    /// Fill gaps from an enclosing span; values already set win.
    fn inherit(&mut self, outer: &Tags) {
        if self.correlation_id.is_none() {
            self.correlation_id.clone_from(&outer.correlation_id);
        }
        if self.agent.is_none() {
            self.agent.clone_from(&outer.agent);
        }
    }
}

struct Incident {
    timestamp: String,
    level: String,
    target: String,
    message: String,
    fields: Option<String>,
    tags: Tags,
}

#[derive(Default)]
struct Collector {
    message: Option<String>,
    tags: Tags,
    extra: Map<String, Value>,
}

impl Collector {
    fn put(&mut self, field: &Field, value: Value) {
        match (field.name(), value) {
            ("message", Value::String(s)) => self.message = Some(s),
            ("correlation_id", Value::String(s)) => self.tags.correlation_id = Some(s),
            ("agent", Value::String(s)) => self.tags.agent = Some(s),
            (name, v) => {
                self.extra.insert(name.to_string(), v);
            }
        }
    }
}

impl Visit for Collector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let text = format!("{value:?}");
        let text = if field.name() == "message" {
            text
        } else {
            text.trim_matches('"').to_string()
        };
        self.put(field, Value::String(text));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }
}

/// `tracing` layer writing WARN and ERROR events to an [`IncidentSink`].
pub struct IncidentLayer {
    sink: Arc<IncidentSink>,
}

impl IncidentLayer {
    pub fn new(sink: Arc<IncidentSink>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for IncidentLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut collector = Collector::default();
        attrs.record(&mut collector);
        if collector.tags.is_empty() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(collector.tags);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > Level::WARN {
            return;
        }

        let mut collector = Collector::default();
        event.record(&mut collector);

        if !collector.tags.is_complete() {
            for span in ctx.event_scope(event).into_iter().flatten() {
                if let Some(outer) = span.extensions().get::<Tags>() {
                    collector.tags.inherit(outer);
                }
            }
        }

        let fields = (!collector.extra.is_empty())
            .then(|| serde_json::to_string(&collector.extra).ok())
            .flatten();

        self.sink.insert(&Incident {
            timestamp: Utc::now().to_rfc3339(),
            level: level.as_str().to_string(),
            target: event.metadata().target().to_string(),
            message: collector.message.unwrap_or_default(),
            fields,
            tags: collector.tags,
        });
    }
}
