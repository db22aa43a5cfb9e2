//! Storage trait definitions for HealthHub
//!
//! These traits are the backend handles the interpreters are built from:
//! - `ClinicalStore`: patients, appointments, prescriptions, lab results
//! - `AuditLog`: append-only audit records
//! - `NotificationBus`: ephemeral channel-keyed pub/sub
//!
//! All traits are async and backend-agnostic. Implementations must be safe
//! for concurrent use by many in-flight requests. In-memory fakes live in
//! the `fakes` module.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::StorageError;
use crate::records::*;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ClinicalStore
// ---------------------------------------------------------------------------

/// Relational store for protected clinical data.
///
/// Guarantees:
/// - Every method is one logically atomic backend operation.
/// - `compare_and_set_appointment_status` only writes when the stored
///   version equals `expected_version`; on success the version is bumped by
///   one and the updated row is returned.
/// - Missing rows are reported as `StorageError::NotFound`.
#[async_trait]
pub trait ClinicalStore: Send + Sync {
    async fn insert_patient(&self, patient: Patient) -> StorageResult<Patient>;

    async fn get_patient(&self, id: &PatientId) -> StorageResult<Patient>;

    async fn insert_appointment(&self, appointment: Appointment) -> StorageResult<Appointment>;

    async fn get_appointment(&self, id: &AppointmentId) -> StorageResult<Appointment>;

    /// Atomically move an appointment to `new_status` if nobody else changed
    /// it since `expected_version` was read. Does not consult the transition
    /// table; callers validate the transition first.
    async fn compare_and_set_appointment_status(
        &self,
        id: &AppointmentId,
        expected_version: u64,
        new_status: AppointmentStatus,
        note: Option<String>,
    ) -> StorageResult<Appointment>;

    async fn insert_prescription(&self, prescription: Prescription) -> StorageResult<Prescription>;

    async fn get_prescription(&self, id: &PrescriptionId) -> StorageResult<Prescription>;

    async fn insert_interaction(&self, interaction: MedicationInteraction) -> StorageResult<()>;

    /// All known interactions between any two of `medications`.
    async fn find_interactions(
        &self,
        medications: &[String],
    ) -> StorageResult<Vec<MedicationInteraction>>;

    async fn insert_lab_result(&self, result: LabResult) -> StorageResult<LabResult>;

    async fn get_lab_result(&self, id: &LabResultId) -> StorageResult<LabResult>;
}

// ---------------------------------------------------------------------------
// AuditLog
// ---------------------------------------------------------------------------

/// Append-only audit log.
///
/// Guarantees:
/// - `append` persists exactly one record with a server-assigned id,
///   timestamp and digest, and returns it.
/// - Records are never updated or deleted; the trait exposes no way to.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> StorageResult<AuditRecord>;

    /// Records for one resource, oldest first.
    async fn list_for_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> StorageResult<Vec<AuditRecord>>;

    /// Records written for one request, oldest first.
    async fn list_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> StorageResult<Vec<AuditRecord>>;
}

// ---------------------------------------------------------------------------
// NotificationBus
// ---------------------------------------------------------------------------

/// One message delivered on a notification channel.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NotificationMessage {
    pub channel: String,
    pub message_type: String,
    pub payload: serde_json::Value,
}

/// Ephemeral pub/sub transport.
///
/// Messages are not persisted and are delivered at most once to each
/// subscriber present at publish time.
#[async_trait]
pub trait NotificationBus: Send + Sync {
    /// Hand a message to the transport. Returns the number of subscribers it
    /// reached (zero is a valid, accepted delivery).
    async fn publish(&self, message: NotificationMessage) -> StorageResult<usize>;

    /// Subscribe to a channel. Only messages published after this call are
    /// received.
    async fn subscribe(
        &self,
        channel: &str,
    ) -> StorageResult<broadcast::Receiver<NotificationMessage>>;
}
