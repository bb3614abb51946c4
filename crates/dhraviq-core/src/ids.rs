//! Prefixed identifiers (`sess_<uuid>`, `req_<uuid>`). The uuid is v7, so
//! freshly minted ids of one kind sort by creation time.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

/// Marks which kind of id a value is and which prefix new ones get.
pub trait IdKind {
    const PREFIX: &'static str;
}

pub struct Id<K> {
    value: String,
    kind: PhantomData<fn() -> K>,
}

impl<K: IdKind> Id<K> {
    pub fn new() -> Self {
        Self::from_raw(format!("{}_{}", K::PREFIX, Uuid::now_v7()))
    }
}

impl<K> Id<K> {
    /// Wrap an existing value without checking its prefix.
    pub fn from_raw(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<K: IdKind> Default for Id<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for Id<K> {
    fn clone(&self) -> Self {
        Self::from_raw(self.value.clone())
    }
}

impl<K> PartialEq for Id<K> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<K> Eq for Id<K> {}

impl<K> Hash for Id<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl<K> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.value, f)
    }
}

impl<K> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl<K> AsRef<str> for Id<K> {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

impl<K> Serialize for Id<K> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

impl<'de, K> Deserialize<'de> for Id<K> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from_raw)
    }
}

#[derive(Debug)]
pub enum Session {}

impl IdKind for Session {
    const PREFIX: &'static str = "sess";
}

/// Persisted fan-out session.
pub type SessionId = Id<Session>;

#[derive(Debug)]
pub enum Correlation {}

impl IdKind for Correlation {
    const PREFIX: &'static str = "req";
}

/// Per-request id echoed to callers and attached to log events.
pub type CorrelationId = Id<Correlation>;
