use std::fmt::Display;

use thiserror::Error;

/// Which kind of entity a lookup failed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Kizami,
    Tag,
}

impl Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entity::Kizami => write!(f, "kizami"),
            Entity::Tag => write!(f, "tag"),
        }
    }
}

/// Errors surfaced by the core. The CLI turns any of them into a non-zero exit status.
#[derive(Debug, Error)]
pub enum KizamiError {
    /// Rejected input: empty description, malformed month or timestamp, inverted interval.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: i64 },

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("database migration failed: {0}")]
    Migration(String),
}

impl KizamiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kizami_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: Entity::Kizami,
            id,
        }
    }

    pub fn tag_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: Entity::Tag,
            id,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T, E = KizamiError> = std::result::Result<T, E>;
