//! Error types for minimongo

use thiserror::Error;

/// Result type alias for minimongo operations
pub type Result<T> = std::result::Result<T, MinimongoError>;

/// Server error code for a duplicate key on a unique index
#[cfg(feature = "mongodb-errors")]
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Unified error type for all minimongo operations
#[derive(Error, Debug, Clone)]
pub enum MinimongoError {
    #[error("MongoDB error: {0}")]
    MongoDB(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// A model or the global defaults are missing required settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Attribute-style access to a field that does not exist
    #[error("Attribute error: {0}")]
    Attribute(String),

    /// Item-style access to a key that does not exist
    #[error("Key error: {0}")]
    Key(String),

    /// A document reference that does not belong to the collection it was
    /// dereferenced through, or that cannot be built
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Operation not available on an interface model
    #[error("Interface error: {0}")]
    Interface(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Unique index violation (duplicate key)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Server selection or socket timeout - retryable
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Transient error that may succeed on retry
    #[error("Transient error: {0}")]
    Transient(String),
}

impl MinimongoError {
    /// Returns true if this error is potentially retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MinimongoError::Timeout(_) | MinimongoError::Transient(_)
        )
    }

    /// Returns true if this is a constraint violation error
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, MinimongoError::Conflict(_))
    }

    /// Returns true for the two "missing field" kinds
    pub fn is_missing_field(&self) -> bool {
        matches!(
            self,
            MinimongoError::Attribute(_) | MinimongoError::Key(_)
        )
    }
}

impl From<serde_json::Error> for MinimongoError {
    fn from(err: serde_json::Error) -> Self {
        MinimongoError::Serialization(err.to_string())
    }
}

// MongoDB-specific error conversions (when mongodb-errors feature is enabled)
#[cfg(feature = "mongodb-errors")]
impl From<mongodb::error::Error> for MinimongoError {
    fn from(err: mongodb::error::Error) -> Self {
        use mongodb::error::{ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR};

        if err.contains_label(TRANSIENT_TRANSACTION_ERROR) {
            return MinimongoError::Transient(err.to_string());
        }

        match err.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(write_err))
                if write_err.code == DUPLICATE_KEY_CODE =>
            {
                MinimongoError::Conflict(err.to_string())
            }
            ErrorKind::Command(command_err) if command_err.code == DUPLICATE_KEY_CODE => {
                MinimongoError::Conflict(err.to_string())
            }
            ErrorKind::ServerSelection { .. } => MinimongoError::Timeout(err.to_string()),
            ErrorKind::Io(_) => MinimongoError::Connection(err.to_string()),
            ErrorKind::Authentication { .. } => MinimongoError::Connection(err.to_string()),
            ErrorKind::InvalidArgument { .. } => MinimongoError::Validation(err.to_string()),
            ErrorKind::BsonSerialization(_) => MinimongoError::Serialization(err.to_string()),
            ErrorKind::BsonDeserialization(_) => MinimongoError::Deserialization(err.to_string()),
            _ => MinimongoError::MongoDB(err.to_string()),
        }
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::ser::Error> for MinimongoError {
    fn from(err: bson::ser::Error) -> Self {
        MinimongoError::Serialization(format!("BSON serialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::de::Error> for MinimongoError {
    fn from(err: bson::de::Error) -> Self {
        MinimongoError::Deserialization(format!("BSON deserialization error: {}", err))
    }
}

#[cfg(feature = "mongodb-errors")]
impl From<bson::oid::Error> for MinimongoError {
    fn from(err: bson::oid::Error) -> Self {
        MinimongoError::Validation(format!("Invalid ObjectId: {}", err))
    }
}
