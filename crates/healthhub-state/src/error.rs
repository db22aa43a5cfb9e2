//! Error types for healthhub-state

use thiserror::Error;

/// Errors raised while connecting to or preparing a backend
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Query(err.to_string())
    }
}

/// Errors returned by the storage traits.
///
/// Every backend converts its native errors into one of these variants at
/// the trait boundary; nothing backend-specific leaks above this layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The requested row does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A compare-and-set lost against a concurrent writer
    #[error("version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict { id: String, expected: u64, actual: u64 },

    /// Insert of a row whose identifier already exists
    #[error("{entity} already exists: {id}")]
    Duplicate { entity: String, id: String },

    /// The backend could not be reached
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with an error
    #[error("backend error: {0}")]
    Backend(String),

    /// A row could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl StorageError {
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        StorageError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display_names_entity() {
        let err = StorageError::not_found("patient", "p-1");
        assert_eq!(err.to_string(), "patient not found: p-1");
    }

    #[test]
    fn test_version_conflict_display() {
        let err = StorageError::VersionConflict {
            id: "a-1".to_string(),
            expected: 2,
            actual: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected 2"));
        assert!(msg.contains("found 3"));
    }
}
