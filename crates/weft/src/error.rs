//! Error types for weft.

use crate::entity_id::EntityId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("entity {0} was not found")]
    EntityNotFound(EntityId),

    #[error("entity {0} has no {1} component")]
    ComponentNotFound(EntityId, &'static str),

    #[error("invalid entity id: {0}")]
    InvalidEntityId(String),

    #[cfg(feature = "serde")]
    #[error("unknown component type in snapshot: {0}")]
    UnknownSnapshotComponent(String),

    #[cfg(feature = "serde")]
    #[error("snapshot references entity {0} outside its entity list")]
    DanglingSnapshotEntity(EntityId),

    #[cfg(feature = "serde")]
    #[error("snapshot serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
