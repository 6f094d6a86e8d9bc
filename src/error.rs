//! Component-local error types. Each error enum matches the fallible surface of one
//! component in the design (room state, registry, persistence, wire protocol); the
//! session layer is the single place these get turned into user-facing text.

use thiserror::Error;

/// Errors raised while applying a command to a room's in-memory state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("readonly role cannot perform this action")]
    ReadonlyRole,
    #[error("element id '{0}' already exists")]
    DuplicateElement(String),
    #[error("layer id '{0}' already exists")]
    DuplicateLayer(String),
    #[error("cannot delete the last layer in a room")]
    LastLayer,
    #[error("wrong password")]
    WrongPassword,
}

/// Errors raised by the room registry (lookup, creation, deletion).
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid room name '{0}': must be 3-50 chars matching [A-Za-z0-9-]+")]
    InvalidName(String),
    #[error("room '{0}' does not exist")]
    NotFound(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Errors from the snapshot persistence layer.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("io error writing snapshot for '{room}': {source}")]
    Io {
        room: String,
        #[source]
        source: std::io::Error,
    },
    #[error("snapshot for '{0}' is corrupt")]
    Corrupt(String),
}

/// Errors raised while decoding an inbound WebSocket frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame exceeds maximum size of {max} bytes")]
    TooLarge { max: usize },
    #[error("frame is not valid UTF-8 JSON: {0}")]
    Malformed(String),
    #[error("missing or unknown frame type: {0}")]
    UnknownType(String),
}
