//! SurrealDB row types.
//!
//! Rows carry identifiers as strings and timestamps as native SurrealDB
//! datetimes; conversion to the domain records in [`crate::records`]
//! happens at the store boundary.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::records::*;
use crate::storage_traits::StorageResult;

/// Serialize chrono DateTime as a SurrealDB datetime
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

pub(crate) const PATIENTS: &str = "patients";
pub(crate) const APPOINTMENTS: &str = "appointments";
pub(crate) const PRESCRIPTIONS: &str = "prescriptions";
pub(crate) const INTERACTIONS: &str = "medication_interactions";
pub(crate) const LAB_RESULTS: &str = "lab_results";
pub(crate) const AUDIT_EVENTS: &str = "audit_events";

fn parse_id<T: std::str::FromStr>(entity: &str, raw: &str) -> StorageResult<T> {
    raw.parse::<T>()
        .map_err(|_| StorageError::Serialization(format!("malformed {entity} id: {raw}")))
}

// ---------------------------------------------------------------------------
// Patients
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRow {
    /// SurrealDB record ID
    pub id: Option<surrealdb::sql::Thing>,
    pub patient_id: String,
    pub first_name: String,
    pub last_name: String,
    /// ISO-8601 calendar date
    pub date_of_birth: String,
    pub blood_type: Option<String>,
    pub allergies: Vec<String>,
    pub current_medications: Vec<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<&Patient> for PatientRow {
    fn from(p: &Patient) -> Self {
        PatientRow {
            id: None,
            patient_id: p.patient_id.to_string(),
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            date_of_birth: p.date_of_birth.to_string(),
            blood_type: p.blood_type.clone(),
            allergies: p.allergies.clone(),
            current_medications: p.current_medications.clone(),
            created_at: p.created_at,
        }
    }
}

impl PatientRow {
    pub fn into_record(self) -> StorageResult<Patient> {
        let date_of_birth = NaiveDate::parse_from_str(&self.date_of_birth, "%Y-%m-%d")
            .map_err(|e| StorageError::Serialization(format!("date_of_birth: {e}")))?;
        Ok(Patient {
            patient_id: parse_id("patient", &self.patient_id)?,
            first_name: self.first_name,
            last_name: self.last_name,
            date_of_birth,
            blood_type: self.blood_type,
            allergies: self.allergies,
            current_medications: self.current_medications,
            created_at: self.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentRow {
    pub id: Option<surrealdb::sql::Thing>,
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    #[serde(with = "surreal_datetime")]
    pub requested_time: DateTime<Utc>,
    pub reason: String,
    /// One of `AppointmentStatus::as_str`
    pub status: String,
    pub status_note: Option<String>,
    pub version: u64,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "surreal_datetime")]
    pub updated_at: DateTime<Utc>,
}

impl From<&Appointment> for AppointmentRow {
    fn from(a: &Appointment) -> Self {
        AppointmentRow {
            id: None,
            appointment_id: a.appointment_id.to_string(),
            patient_id: a.patient_id.to_string(),
            doctor_id: a.doctor_id.to_string(),
            requested_time: a.requested_time,
            reason: a.reason.clone(),
            status: a.status.as_str().to_string(),
            status_note: a.status_note.clone(),
            version: a.version,
            created_at: a.created_at,
            updated_at: a.updated_at,
        }
    }
}

impl AppointmentRow {
    pub fn into_record(self) -> StorageResult<Appointment> {
        let status = AppointmentStatus::parse(&self.status).ok_or_else(|| {
            StorageError::Serialization(format!("unknown appointment status: {}", self.status))
        })?;
        Ok(Appointment {
            appointment_id: parse_id("appointment", &self.appointment_id)?,
            patient_id: parse_id("patient", &self.patient_id)?,
            doctor_id: parse_id("doctor", &self.doctor_id)?,
            requested_time: self.requested_time,
            reason: self.reason,
            status,
            status_note: self.status_note,
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Prescriptions and interactions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionRow {
    pub id: Option<surrealdb::sql::Thing>,
    pub prescription_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: u32,
    pub refills: u32,
    pub notes: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<&Prescription> for PrescriptionRow {
    fn from(p: &Prescription) -> Self {
        PrescriptionRow {
            id: None,
            prescription_id: p.prescription_id.to_string(),
            patient_id: p.patient_id.to_string(),
            doctor_id: p.doctor_id.to_string(),
            medication: p.medication.clone(),
            dosage: p.dosage.clone(),
            frequency: p.frequency.clone(),
            duration_days: p.duration_days,
            refills: p.refills,
            notes: p.notes.clone(),
            created_at: p.created_at,
        }
    }
}

impl PrescriptionRow {
    pub fn into_record(self) -> StorageResult<Prescription> {
        Ok(Prescription {
            prescription_id: parse_id("prescription", &self.prescription_id)?,
            patient_id: parse_id("patient", &self.patient_id)?,
            doctor_id: parse_id("doctor", &self.doctor_id)?,
            medication: self.medication,
            dosage: self.dosage,
            frequency: self.frequency,
            duration_days: self.duration_days,
            refills: self.refills,
            notes: self.notes,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRow {
    pub id: Option<surrealdb::sql::Thing>,
    pub medication_a: String,
    pub medication_b: String,
    /// Lowercased names used for lookup
    pub key_a: String,
    pub key_b: String,
    pub severity: InteractionSeverity,
    pub description: String,
}

impl From<&MedicationInteraction> for InteractionRow {
    fn from(ix: &MedicationInteraction) -> Self {
        InteractionRow {
            id: None,
            medication_a: ix.medication_a.clone(),
            medication_b: ix.medication_b.clone(),
            key_a: ix.medication_a.to_lowercase(),
            key_b: ix.medication_b.to_lowercase(),
            severity: ix.severity,
            description: ix.description.clone(),
        }
    }
}

impl From<InteractionRow> for MedicationInteraction {
    fn from(row: InteractionRow) -> Self {
        MedicationInteraction {
            medication_a: row.medication_a,
            medication_b: row.medication_b,
            severity: row.severity,
            description: row.description,
        }
    }
}

// ---------------------------------------------------------------------------
// Lab results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabResultRow {
    pub id: Option<surrealdb::sql::Thing>,
    pub result_id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub test_type: String,
    pub result_data: serde_json::Value,
    pub critical: bool,
    pub reviewed_by_doctor: bool,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<&LabResult> for LabResultRow {
    fn from(r: &LabResult) -> Self {
        LabResultRow {
            id: None,
            result_id: r.result_id.to_string(),
            patient_id: r.patient_id.to_string(),
            doctor_id: r.doctor_id.to_string(),
            test_type: r.test_type.clone(),
            result_data: r.result_data.clone(),
            critical: r.critical,
            reviewed_by_doctor: r.reviewed_by_doctor,
            created_at: r.created_at,
        }
    }
}

impl LabResultRow {
    pub fn into_record(self) -> StorageResult<LabResult> {
        Ok(LabResult {
            result_id: parse_id("lab_result", &self.result_id)?,
            patient_id: parse_id("patient", &self.patient_id)?,
            doctor_id: parse_id("doctor", &self.doctor_id)?,
            test_type: self.test_type,
            result_data: self.result_data,
            critical: self.critical,
            reviewed_by_doctor: self.reviewed_by_doctor,
            created_at: self.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Audit events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRow {
    pub id: Option<surrealdb::sql::Thing>,
    pub audit_id: String,
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    /// "success" | "failure"
    pub outcome: String,
    pub failure_kind: Option<String>,
    pub correlation_id: String,
    pub metadata: Option<serde_json::Value>,
    #[serde(with = "surreal_datetime")]
    pub recorded_at: DateTime<Utc>,
    pub digest: String,
}

impl From<&AuditRecord> for AuditRow {
    fn from(r: &AuditRecord) -> Self {
        let (outcome, failure_kind) = match &r.outcome {
            AuditOutcome::Success => ("success".to_string(), None),
            AuditOutcome::Failure { kind } => ("failure".to_string(), Some(kind.clone())),
        };
        AuditRow {
            id: None,
            audit_id: r.audit_id.to_string(),
            actor: r.actor.0.clone(),
            action: r.action.clone(),
            resource_type: r.resource_type.clone(),
            resource_id: r.resource_id.clone(),
            outcome,
            failure_kind,
            correlation_id: r.correlation_id.to_string(),
            metadata: r.metadata.clone(),
            recorded_at: r.recorded_at,
            digest: r.digest.as_str().to_string(),
        }
    }
}

impl AuditRow {
    pub fn into_record(self) -> StorageResult<AuditRecord> {
        let outcome = match (self.outcome.as_str(), self.failure_kind) {
            ("success", _) => AuditOutcome::Success,
            ("failure", Some(kind)) => AuditOutcome::Failure { kind },
            (other, _) => {
                return Err(StorageError::Serialization(format!(
                    "unknown audit outcome: {other}"
                )))
            }
        };
        let audit_id = parse_id("audit", &self.audit_id)?;
        let correlation_id = parse_id("correlation", &self.correlation_id)?;
        let entry = AuditEntry {
            actor: ActorId(self.actor),
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            outcome,
            correlation_id,
            metadata: self.metadata,
        };
        let mut record = AuditRecord::seal_at(entry, audit_id, self.recorded_at);
        // Keep the digest exactly as written so tampering with the stored
        // row stays detectable through `AuditRecord::verify`.
        record.digest = ContentDigest::from_stored(self.digest);
        Ok(record)
    }
}
