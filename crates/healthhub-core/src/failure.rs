//! Typed business failures.
//!
//! A [`Failure`] is data: interpreters return it inside an `EffectResult`,
//! programs inspect it and decide how to continue. Infrastructure faults
//! that end a run without consulting the program live in
//! [`crate::runner::RunError`] instead.

use healthhub_state::{AppointmentStatus, StorageError};
use serde::{Deserialize, Serialize};

/// Failure kinds, closed over the error taxonomy HealthHub exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The requested record does not exist
    NotFound,
    /// Input rejected by a business rule
    Validation,
    /// The appointment transition table forbids this move
    InvalidTransition {
        current: AppointmentStatus,
        attempted: AppointmentStatus,
    },
    /// A concurrent writer won, or the record already exists
    Conflict,
    /// The relational store could not serve the request
    BackendUnavailable,
    /// The audit record for a protected access could not be persisted
    AuditUnavailable,
    /// The notification transport rejected a publish
    Unavailable,
    /// The interpreter did not answer within the step timeout
    Timeout,
}

impl FailureKind {
    /// Stable snake_case name, as exposed on the wire and in audit records.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::NotFound => "not_found",
            FailureKind::Validation => "validation",
            FailureKind::InvalidTransition { .. } => "invalid_transition",
            FailureKind::Conflict => "conflict",
            FailureKind::BackendUnavailable => "backend_unavailable",
            FailureKind::AuditUnavailable => "audit_unavailable",
            FailureKind::Unavailable => "unavailable",
            FailureKind::Timeout => "timeout",
        }
    }

    /// Kinds caused by infrastructure rather than by the caller's request.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            FailureKind::BackendUnavailable
                | FailureKind::AuditUnavailable
                | FailureKind::Unavailable
                | FailureKind::Timeout
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business failure with a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(FailureKind::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Conflict, message)
    }

    pub fn invalid_transition(current: AppointmentStatus, attempted: AppointmentStatus) -> Self {
        Self::new(
            FailureKind::InvalidTransition { current, attempted },
            format!("cannot move appointment from {current} to {attempted}"),
        )
    }

    pub fn audit_unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::AuditUnavailable, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unavailable, message)
    }

    pub fn timeout(effect: &str, limit_ms: u64) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("{effect} did not complete within {limit_ms}ms"),
        )
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<StorageError> for Failure {
    fn from(err: StorageError) -> Self {
        let kind = match &err {
            StorageError::NotFound { .. } => FailureKind::NotFound,
            StorageError::VersionConflict { .. } | StorageError::Duplicate { .. } => {
                FailureKind::Conflict
            }
            StorageError::Unavailable(_)
            | StorageError::Backend(_)
            | StorageError::Serialization(_) => FailureKind::BackendUnavailable,
        };
        Failure::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_mapping() {
        let cases = [
            (StorageError::not_found("patient", "p"), FailureKind::NotFound),
            (
                StorageError::VersionConflict {
                    id: "a".into(),
                    expected: 1,
                    actual: 2,
                },
                FailureKind::Conflict,
            ),
            (
                StorageError::Duplicate {
                    entity: "patient".into(),
                    id: "p".into(),
                },
                FailureKind::Conflict,
            ),
            (
                StorageError::Unavailable("down".into()),
                FailureKind::BackendUnavailable,
            ),
            (
                StorageError::Backend("bad query".into()),
                FailureKind::BackendUnavailable,
            ),
            (
                StorageError::Serialization("eof".into()),
                FailureKind::BackendUnavailable,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(Failure::from(err).kind, expected);
        }
    }

    #[test]
    fn test_wire_names() {
        let kind = FailureKind::InvalidTransition {
            current: AppointmentStatus::Completed,
            attempted: AppointmentStatus::Confirmed,
        };
        assert_eq!(kind.as_str(), "invalid_transition");
        assert_eq!(FailureKind::AuditUnavailable.as_str(), "audit_unavailable");
        assert!(FailureKind::Timeout.is_server_error());
        assert!(!FailureKind::Conflict.is_server_error());
    }

    #[test]
    fn test_invalid_transition_message() {
        let f = Failure::invalid_transition(
            AppointmentStatus::Completed,
            AppointmentStatus::Confirmed,
        );
        assert_eq!(
            f.to_string(),
            "invalid_transition: cannot move appointment from completed to confirmed"
        );
    }
}
