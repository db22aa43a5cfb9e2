//! Domain records persisted by the HealthHub backends.
//!
//! These are plain data: identifiers, clinical rows, the appointment status
//! machine and the append-only audit record. Backends store and return them;
//! nothing here performs I/O.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a new random identifier
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s).map($name)
            }
        }
    };
}

uuid_id!(
    /// Patient identifier
    PatientId
);
uuid_id!(
    /// Doctor identifier
    DoctorId
);
uuid_id!(
    /// Appointment identifier
    AppointmentId
);
uuid_id!(
    /// Prescription identifier
    PrescriptionId
);
uuid_id!(
    /// Lab result identifier
    LabResultId
);
uuid_id!(
    /// Server-assigned audit record identifier
    AuditId
);
uuid_id!(
    /// Ties together every audit record written on behalf of one request
    CorrelationId
);

/// Authenticated actor identity, as supplied by the auth middleware.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl ActorId {
    pub fn new(id: impl Into<String>) -> Self {
        ActorId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Content digest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private so the string is always lowercase hex
/// produced by `from_bytes`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Wrap a digest read back from a backend without recomputing it.
    pub(crate) fn from_stored(hex: String) -> Self {
        ContentDigest(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Patients
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: PatientId,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub blood_type: Option<String>,
    pub allergies: Vec<String>,
    /// Medications the patient is currently taking, by generic name
    pub current_medications: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    pub fn new(first_name: &str, last_name: &str, date_of_birth: NaiveDate) -> Self {
        Self {
            patient_id: PatientId::new(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            date_of_birth,
            blood_type: None,
            allergies: Vec::new(),
            current_medications: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_medications(mut self, medications: &[&str]) -> Self {
        self.current_medications = medications.iter().map(|m| m.to_string()).collect();
        self
    }
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

/// Appointment lifecycle.
///
/// ```text
/// Requested ──► Confirmed ──► InProgress ──► Completed
///     │             │             │
///     └─────────────┴─────────────┴────────► Cancelled
/// ```
///
/// `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Requested,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    /// The fixed transition table. Terminal states return an empty slice.
    pub fn allowed_targets(self) -> &'static [AppointmentStatus] {
        use AppointmentStatus::*;
        match self {
            Requested => &[Confirmed, Cancelled],
            Confirmed => &[InProgress, Cancelled],
            InProgress => &[Completed, Cancelled],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: AppointmentStatus) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Requested => "requested",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(AppointmentStatus::Requested),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "in_progress" => Some(AppointmentStatus::InProgress),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }

    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Requested,
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub appointment_id: AppointmentId,
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    pub requested_time: DateTime<Utc>,
    pub reason: String,
    pub status: AppointmentStatus,
    /// Free text attached by the last transition (confirmation time, cancel reason, ...)
    pub status_note: Option<String>,
    /// Starts at 1, bumped by every status change
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    /// A freshly requested appointment at version 1.
    pub fn requested(
        patient_id: PatientId,
        doctor_id: DoctorId,
        requested_time: DateTime<Utc>,
        reason: &str,
    ) -> Self {
        let now = Utc::now();
        Self {
            appointment_id: AppointmentId::new(),
            patient_id,
            doctor_id,
            requested_time,
            reason: reason.to_string(),
            status: AppointmentStatus::Requested,
            status_note: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Prescriptions and interactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub prescription_id: PrescriptionId,
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: u32,
    pub refills: u32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Maximum refills a single prescription may carry.
pub const MAX_REFILLS: u32 = 12;

/// Longest prescription course, in days.
pub const MAX_DURATION_DAYS: u32 = 365;

impl Prescription {
    /// Check the fields a prescriber controls. Returns a human-readable reason
    /// for the first rule that fails.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.medication.trim().is_empty() {
            return Err("medication must not be empty".to_string());
        }
        if self.dosage.trim().is_empty() {
            return Err("dosage must not be empty".to_string());
        }
        if self.frequency.trim().is_empty() {
            return Err("frequency must not be empty".to_string());
        }
        if self.duration_days == 0 || self.duration_days > MAX_DURATION_DAYS {
            return Err(format!(
                "duration_days must be between 1 and {MAX_DURATION_DAYS}, got {}",
                self.duration_days
            ));
        }
        if self.refills > MAX_REFILLS {
            return Err(format!(
                "refills must be at most {MAX_REFILLS}, got {}",
                self.refills
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionSeverity {
    Minor,
    Moderate,
    Major,
    Contraindicated,
}

/// A known interaction between two medications. Symmetric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationInteraction {
    pub medication_a: String,
    pub medication_b: String,
    pub severity: InteractionSeverity,
    pub description: String,
}

impl MedicationInteraction {
    pub fn new(a: &str, b: &str, severity: InteractionSeverity, description: &str) -> Self {
        Self {
            medication_a: a.to_string(),
            medication_b: b.to_string(),
            severity,
            description: description.to_string(),
        }
    }

    /// Case-insensitive, order-independent pair match.
    pub fn involves_pair(&self, x: &str, y: &str) -> bool {
        let a = self.medication_a.to_lowercase();
        let b = self.medication_b.to_lowercase();
        let (x, y) = (x.to_lowercase(), y.to_lowercase());
        (a == x && b == y) || (a == y && b == x)
    }
}

// ---------------------------------------------------------------------------
// Lab results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
    pub result_id: LabResultId,
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    pub test_type: String,
    pub result_data: serde_json::Value,
    pub critical: bool,
    pub reviewed_by_doctor: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// Outcome of the access an audit record describes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure { kind: String },
}

impl AuditOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuditOutcome::Success)
    }
}

/// What an interpreter asks the audit log to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: ActorId,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub outcome: AuditOutcome,
    pub correlation_id: CorrelationId,
    pub metadata: Option<serde_json::Value>,
}

/// An immutable, append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: AuditId,
    pub actor: ActorId,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub outcome: AuditOutcome,
    pub correlation_id: CorrelationId,
    pub metadata: Option<serde_json::Value>,
    pub recorded_at: DateTime<Utc>,
    pub digest: ContentDigest,
}

/// Fields covered by the audit digest, in a fixed order.
#[derive(Serialize)]
struct DigestView<'a> {
    audit_id: &'a AuditId,
    actor: &'a ActorId,
    action: &'a str,
    resource_type: &'a str,
    resource_id: &'a str,
    outcome: &'a AuditOutcome,
    correlation_id: &'a CorrelationId,
    metadata: &'a Option<serde_json::Value>,
    recorded_at: &'a DateTime<Utc>,
}

impl AuditRecord {
    /// Stamp an entry with a fresh id, the current time and its digest.
    pub fn seal(entry: AuditEntry) -> Self {
        Self::seal_at(entry, AuditId::new(), Utc::now())
    }

    pub fn seal_at(entry: AuditEntry, audit_id: AuditId, recorded_at: DateTime<Utc>) -> Self {
        let mut record = AuditRecord {
            audit_id,
            actor: entry.actor,
            action: entry.action,
            resource_type: entry.resource_type,
            resource_id: entry.resource_id,
            outcome: entry.outcome,
            correlation_id: entry.correlation_id,
            metadata: entry.metadata,
            recorded_at,
            digest: ContentDigest::from_bytes(&[]),
        };
        record.digest = record.compute_digest();
        record
    }

    pub fn compute_digest(&self) -> ContentDigest {
        let view = DigestView {
            audit_id: &self.audit_id,
            actor: &self.actor,
            action: &self.action,
            resource_type: &self.resource_type,
            resource_id: &self.resource_id,
            outcome: &self.outcome,
            correlation_id: &self.correlation_id,
            metadata: &self.metadata,
            recorded_at: &self.recorded_at,
        };
        // Serializing plain structs and serde_json::Value cannot fail.
        let bytes = serde_json::to_vec(&view).unwrap_or_default();
        ContentDigest::from_bytes(&bytes)
    }

    /// Whether the stored digest still matches the record content.
    pub fn verify(&self) -> bool {
        self.compute_digest() == self.digest
    }
}
