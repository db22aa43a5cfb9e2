//! HealthHub State: clinical records, audit log and notification backends
//!
//! This crate is the backend layer the HealthHub interpreters are built
//! from. It owns every byte of I/O against the relational store, the audit
//! store and the pub/sub transport; nothing above it talks to a backend
//! directly.
//!
//! ## Key Components
//!
//! - `ClinicalStore`, `AuditLog`, `NotificationBus`: backend traits
//! - `SurrealHandle`: SurrealDB connection and schema setup
//! - `SurrealClinicalStore`, `SurrealAuditLog`: SurrealDB implementations
//! - `BroadcastNotificationBus`: in-process pub/sub on tokio broadcast channels
//! - `fakes`: in-memory stores and fault-injecting wrappers for tests

mod bus;
mod error;
pub mod fakes;
mod handle;
pub mod migrations;
pub mod records;
mod schema;
pub mod storage_traits;
mod surreal_store;

pub use bus::{BroadcastNotificationBus, DEFAULT_CHANNEL_CAPACITY};
pub use error::{StateError, StorageError};
pub use handle::{CloudConfig, SurrealHandle};
pub use records::{
    ActorId, Appointment, AppointmentId, AppointmentStatus, AuditEntry, AuditId, AuditOutcome,
    AuditRecord, ContentDigest, CorrelationId, DoctorId, InteractionSeverity, LabResult,
    LabResultId, MedicationInteraction, Patient, PatientId, Prescription, PrescriptionId,
};
pub use storage_traits::{
    AuditLog, ClinicalStore, NotificationBus, NotificationMessage, StorageResult,
};
pub use surreal_store::{SurrealAuditLog, SurrealClinicalStore};

/// Result type for connection and schema setup
pub type Result<T> = std::result::Result<T, StateError>;
