//! Explicitly constructed collaborator handles.
//!
//! A client that failed to initialise at startup is carried as
//! `Dependency::Unavailable` rather than a missing global, so every consumer
//! has to decide what "not there" means for it.

use std::fmt;
use std::sync::Arc;

pub enum Dependency<T: ?Sized> {
    Available(Arc<T>),
    Unavailable { reason: String },
}

impl<T: ?Sized> Dependency<T> {
    pub fn available(inner: Arc<T>) -> Self {
        Self::Available(inner)
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn get(&self) -> Result<&Arc<T>, &str> {
        match self {
            Self::Available(inner) => Ok(inner),
            Self::Unavailable { reason } => Err(reason),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl<T: ?Sized> Clone for Dependency<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Available(inner) => Self::Available(Arc::clone(inner)),
            Self::Unavailable { reason } => Self::Unavailable {
                reason: reason.clone(),
            },
        }
    }
}

impl<T: ?Sized> fmt::Debug for Dependency<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(_) => f.write_str("Available"),
            Self::Unavailable { reason } => f
                .debug_struct("Unavailable")
                .field("reason", reason)
                .finish(),
        }
    }
}
