//! Effects and their results.
//!
//! An [`Effect`] is an inert description of one operation. It carries only
//! the data that operation needs and is compared structurally. Every
//! variant belongs to exactly one [`EffectCategory`]; the mapping is an
//! exhaustive match, so a new variant cannot compile until it is routed.

use chrono::{DateTime, Utc};
use healthhub_state::{
    Appointment, AppointmentId, AppointmentStatus, AuditRecord, DoctorId, LabResult, LabResultId,
    MedicationInteraction, Patient, PatientId, Prescription, PrescriptionId,
};
use serde::{Deserialize, Serialize};

use crate::failure::Failure;
use crate::program::ProtocolViolation;

/// Routing category of an effect. One interpreter is registered per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectCategory {
    Healthcare,
    Notification,
}

impl EffectCategory {
    pub const ALL: [EffectCategory; 2] = [EffectCategory::Healthcare, EffectCategory::Notification];

    pub fn as_str(self) -> &'static str {
        match self {
            EffectCategory::Healthcare => "healthcare",
            EffectCategory::Notification => "notification",
        }
    }
}

impl std::fmt::Display for EffectCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input of a prescription about to be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPrescription {
    pub patient_id: PatientId,
    pub doctor_id: DoctorId,
    pub medication: String,
    pub dosage: String,
    pub frequency: String,
    pub duration_days: u32,
    pub refills: u32,
    pub notes: Option<String>,
}

impl NewPrescription {
    /// Stamp with a fresh identifier and creation time.
    pub fn into_prescription(self) -> Prescription {
        Prescription {
            prescription_id: PrescriptionId::new(),
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            medication: self.medication,
            dosage: self.dosage,
            frequency: self.frequency,
            duration_days: self.duration_days,
            refills: self.refills,
            notes: self.notes,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum Effect {
    // Healthcare
    GetPatientById {
        patient_id: PatientId,
    },
    GetAppointmentById {
        appointment_id: AppointmentId,
    },
    CreateAppointment {
        patient_id: PatientId,
        doctor_id: DoctorId,
        requested_time: DateTime<Utc>,
        reason: String,
    },
    /// Compare-and-swap: applies only if the appointment is still at
    /// `expected_version` and the transition table allows `target`.
    TransitionAppointmentStatus {
        appointment_id: AppointmentId,
        expected_version: u64,
        target: AppointmentStatus,
        note: Option<String>,
    },
    CreatePrescription(NewPrescription),
    GetPrescriptionById {
        prescription_id: PrescriptionId,
    },
    CheckMedicationInteractions {
        medications: Vec<String>,
    },
    GetLabResultById {
        result_id: LabResultId,
    },

    // Notification
    PublishWebSocketNotification {
        channel: String,
        message_type: String,
        payload: serde_json::Value,
    },
    LogAuditEvent {
        action: String,
        resource_type: String,
        resource_id: String,
        metadata: Option<serde_json::Value>,
    },
}

impl Effect {
    pub fn category(&self) -> EffectCategory {
        match self {
            Effect::GetPatientById { .. }
            | Effect::GetAppointmentById { .. }
            | Effect::CreateAppointment { .. }
            | Effect::TransitionAppointmentStatus { .. }
            | Effect::CreatePrescription(_)
            | Effect::GetPrescriptionById { .. }
            | Effect::CheckMedicationInteractions { .. }
            | Effect::GetLabResultById { .. } => EffectCategory::Healthcare,
            Effect::PublishWebSocketNotification { .. } | Effect::LogAuditEvent { .. } => {
                EffectCategory::Notification
            }
        }
    }

    /// Stable tag for logs and traces.
    pub fn name(&self) -> &'static str {
        match self {
            Effect::GetPatientById { .. } => "get_patient_by_id",
            Effect::GetAppointmentById { .. } => "get_appointment_by_id",
            Effect::CreateAppointment { .. } => "create_appointment",
            Effect::TransitionAppointmentStatus { .. } => "transition_appointment_status",
            Effect::CreatePrescription(_) => "create_prescription",
            Effect::GetPrescriptionById { .. } => "get_prescription_by_id",
            Effect::CheckMedicationInteractions { .. } => "check_medication_interactions",
            Effect::GetLabResultById { .. } => "get_lab_result_by_id",
            Effect::PublishWebSocketNotification { .. } => "publish_websocket_notification",
            Effect::LogAuditEvent { .. } => "log_audit_event",
        }
    }
}

/// Success payload of an interpreted effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "value", content = "data", rename_all = "snake_case")]
pub enum EffectValue {
    Patient(Patient),
    Appointment(Appointment),
    Prescription(Prescription),
    Interactions(Vec<MedicationInteraction>),
    LabResult(LabResult),
    Published { recipients: usize },
    Audited(AuditRecord),
}

/// Result of interpreting one effect.
pub type EffectResult = Result<EffectValue, Failure>;

impl EffectValue {
    pub fn kind(&self) -> &'static str {
        match self {
            EffectValue::Patient(_) => "patient",
            EffectValue::Appointment(_) => "appointment",
            EffectValue::Prescription(_) => "prescription",
            EffectValue::Interactions(_) => "interactions",
            EffectValue::LabResult(_) => "lab_result",
            EffectValue::Published { .. } => "published",
            EffectValue::Audited(_) => "audited",
        }
    }

    fn mismatch(&self, expected: &'static str) -> ProtocolViolation {
        ProtocolViolation::UnexpectedValue {
            expected,
            found: self.kind(),
        }
    }

    pub fn into_patient(self) -> Result<Patient, ProtocolViolation> {
        match self {
            EffectValue::Patient(p) => Ok(p),
            other => Err(other.mismatch("patient")),
        }
    }

    pub fn into_appointment(self) -> Result<Appointment, ProtocolViolation> {
        match self {
            EffectValue::Appointment(a) => Ok(a),
            other => Err(other.mismatch("appointment")),
        }
    }

    pub fn into_prescription(self) -> Result<Prescription, ProtocolViolation> {
        match self {
            EffectValue::Prescription(p) => Ok(p),
            other => Err(other.mismatch("prescription")),
        }
    }

    pub fn into_interactions(self) -> Result<Vec<MedicationInteraction>, ProtocolViolation> {
        match self {
            EffectValue::Interactions(found) => Ok(found),
            other => Err(other.mismatch("interactions")),
        }
    }

    pub fn into_lab_result(self) -> Result<LabResult, ProtocolViolation> {
        match self {
            EffectValue::LabResult(r) => Ok(r),
            other => Err(other.mismatch("lab_result")),
        }
    }

    pub fn into_recipients(self) -> Result<usize, ProtocolViolation> {
        match self {
            EffectValue::Published { recipients } => Ok(recipients),
            other => Err(other.mismatch("published")),
        }
    }

    pub fn into_audit_record(self) -> Result<AuditRecord, ProtocolViolation> {
        match self {
            EffectValue::Audited(record) => Ok(record),
            other => Err(other.mismatch("audited")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            Effect::GetPatientById {
                patient_id: PatientId::new()
            }
            .category(),
            EffectCategory::Healthcare
        );
        assert_eq!(
            Effect::CheckMedicationInteractions {
                medications: vec!["aspirin".into()]
            }
            .category(),
            EffectCategory::Healthcare
        );
        assert_eq!(
            Effect::LogAuditEvent {
                action: "a".into(),
                resource_type: "r".into(),
                resource_id: "i".into(),
                metadata: None,
            }
            .category(),
            EffectCategory::Notification
        );
    }

    #[test]
    fn test_effects_compare_structurally() {
        let id = AppointmentId::new();
        let a = Effect::TransitionAppointmentStatus {
            appointment_id: id,
            expected_version: 3,
            target: AppointmentStatus::Confirmed,
            note: None,
        };
        let b = a.clone();
        assert_eq!(a, b);
        assert_eq!(a.name(), "transition_appointment_status");
    }

    #[test]
    fn test_effect_serializes_with_tag() {
        let effect = Effect::PublishWebSocketNotification {
            channel: "doctor:1:notifications".into(),
            message_type: "appointment_requested".into(),
            payload: serde_json::json!({}),
        };
        let json = serde_json::to_value(&effect).unwrap();
        assert_eq!(json["effect"], "publish_websocket_notification");
        assert_eq!(json["channel"], "doctor:1:notifications");
    }

    #[test]
    fn test_accessor_mismatch_is_protocol_violation() {
        let value = EffectValue::Published { recipients: 2 };
        let err = value.into_patient().unwrap_err();
        assert_eq!(
            err,
            ProtocolViolation::UnexpectedValue {
                expected: "patient",
                found: "published",
            }
        );
    }
}
