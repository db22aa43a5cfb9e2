//! Healthcare interpreter: clinical reads and writes against the
//! relational store.
//!
//! Every access to a protected resource is audited here, once, after the
//! store operation and before the result is returned. The audit write is
//! part of the operation: if it fails, the caller gets `audit_unavailable`
//! even when the store operation itself succeeded, so an unaudited access
//! is never reported as completed. Programs cannot forget an audit entry
//! because they never issue it.
//!
//! The store operation and its audit append run on their own task. A caller
//! that stops waiting (step timeout, cancellation) detaches from the task
//! instead of dropping it, so a committed write is always followed by its
//! audit record.

use std::sync::Arc;

use async_trait::async_trait;
use healthhub_state::{
    Appointment, AppointmentId, AppointmentStatus, AuditEntry, AuditLog, AuditOutcome,
    ClinicalStore,
};
use serde_json::json;
use tracing::debug;

use super::EffectInterpreter;
use crate::context::EffectContext;
use crate::effect::{Effect, EffectCategory, EffectResult, EffectValue};
use crate::failure::{Failure, FailureKind};
use crate::metrics::METRICS;
use crate::obs;

/// The protected resource an effect touched, for its audit record.
struct Access {
    action: &'static str,
    resource_type: &'static str,
    resource_id: String,
    metadata: Option<serde_json::Value>,
}

impl Access {
    fn new(action: &'static str, resource_type: &'static str, resource_id: impl ToString) -> Self {
        Self {
            action,
            resource_type,
            resource_id: resource_id.to_string(),
            metadata: None,
        }
    }

    fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Clone)]
pub struct HealthcareInterpreter {
    store: Arc<dyn ClinicalStore>,
    audit: Arc<dyn AuditLog>,
}

impl HealthcareInterpreter {
    pub fn new(store: Arc<dyn ClinicalStore>, audit: Arc<dyn AuditLog>) -> Self {
        Self { store, audit }
    }

    /// Run the store operation for `effect`. `None` means the effect does
    /// not touch a protected resource and is not audited.
    async fn execute(&self, effect: &Effect) -> (Option<Access>, EffectResult) {
        match effect {
            Effect::GetPatientById { patient_id } => (
                Some(Access::new("get_patient", "patient", patient_id)),
                self.store
                    .get_patient(patient_id)
                    .await
                    .map(EffectValue::Patient)
                    .map_err(Failure::from),
            ),
            Effect::GetAppointmentById { appointment_id } => (
                Some(Access::new("get_appointment", "appointment", appointment_id)),
                self.store
                    .get_appointment(appointment_id)
                    .await
                    .map(EffectValue::Appointment)
                    .map_err(Failure::from),
            ),
            Effect::CreateAppointment {
                patient_id,
                doctor_id,
                requested_time,
                reason,
            } => {
                let appointment =
                    Appointment::requested(*patient_id, *doctor_id, *requested_time, reason);
                let access =
                    Access::new("create_appointment", "appointment", appointment.appointment_id)
                        .with_metadata(json!({
                            "patient_id": patient_id,
                            "doctor_id": doctor_id,
                        }));
                let result = if reason.trim().is_empty() {
                    Err(Failure::validation("appointment reason must not be empty"))
                } else {
                    self.store
                        .insert_appointment(appointment)
                        .await
                        .map(EffectValue::Appointment)
                        .map_err(Failure::from)
                };
                (Some(access), result)
            }
            Effect::TransitionAppointmentStatus {
                appointment_id,
                expected_version,
                target,
                note,
            } => {
                let access = Access::new("transition_appointment", "appointment", appointment_id)
                    .with_metadata(json!({
                        "expected_version": expected_version,
                        "target": target,
                    }));
                let result = self
                    .transition(appointment_id, *expected_version, *target, note.clone())
                    .await;
                (Some(access), result)
            }
            Effect::CreatePrescription(new) => {
                let prescription = new.clone().into_prescription();
                let access = Access::new(
                    "create_prescription",
                    "prescription",
                    prescription.prescription_id,
                )
                .with_metadata(json!({
                    "patient_id": prescription.patient_id,
                    "medication": prescription.medication,
                }));
                let result = match prescription.validate() {
                    Err(reason) => Err(Failure::validation(reason)),
                    Ok(()) => self
                        .store
                        .insert_prescription(prescription)
                        .await
                        .map(EffectValue::Prescription)
                        .map_err(Failure::from),
                };
                (Some(access), result)
            }
            Effect::GetPrescriptionById { prescription_id } => (
                Some(Access::new("get_prescription", "prescription", prescription_id)),
                self.store
                    .get_prescription(prescription_id)
                    .await
                    .map(EffectValue::Prescription)
                    .map_err(Failure::from),
            ),
            Effect::CheckMedicationInteractions { medications } => (
                None,
                self.store
                    .find_interactions(medications)
                    .await
                    .map(EffectValue::Interactions)
                    .map_err(Failure::from),
            ),
            Effect::GetLabResultById { result_id } => (
                Some(Access::new("get_lab_result", "lab_result", result_id)),
                self.store
                    .get_lab_result(result_id)
                    .await
                    .map(EffectValue::LabResult)
                    .map_err(Failure::from),
            ),
            Effect::PublishWebSocketNotification { .. } | Effect::LogAuditEvent { .. } => (
                None,
                Err(Failure::validation(format!(
                    "{} is not a healthcare effect",
                    effect.name()
                ))),
            ),
        }
    }

    /// Terminal state, then version, then transition table, then
    /// compare-and-set. Only the last one writes.
    ///
    /// A terminal appointment is `invalid_transition` whatever version the
    /// caller read: no retry could ever succeed.
    async fn transition(
        &self,
        appointment_id: &AppointmentId,
        expected_version: u64,
        target: AppointmentStatus,
        note: Option<String>,
    ) -> EffectResult {
        let current = self.store.get_appointment(appointment_id).await?;

        if current.status.is_terminal() {
            return Err(Failure::invalid_transition(current.status, target));
        }
        if current.version != expected_version {
            return Err(Failure::conflict(format!(
                "appointment {appointment_id} changed since it was read \
                 (expected version {expected_version}, found {})",
                current.version
            )));
        }
        if !current.status.can_transition_to(target) {
            return Err(Failure::invalid_transition(current.status, target));
        }

        let updated = self
            .store
            .compare_and_set_appointment_status(appointment_id, expected_version, target, note)
            .await?;
        Ok(EffectValue::Appointment(updated))
    }

    /// Append the audit record for `access`. An append failure replaces
    /// whatever `result` was.
    async fn audited(&self, access: Access, result: EffectResult, ctx: &EffectContext) -> EffectResult {
        let outcome = match &result {
            Ok(_) => AuditOutcome::Success,
            Err(failure) => AuditOutcome::Failure {
                kind: failure.kind.as_str().to_string(),
            },
        };
        let entry = AuditEntry {
            actor: ctx.actor.clone(),
            action: access.action.to_string(),
            resource_type: access.resource_type.to_string(),
            resource_id: access.resource_id.clone(),
            outcome,
            correlation_id: ctx.correlation_id,
            metadata: access.metadata,
        };

        match self.audit.append(entry).await {
            Ok(record) => {
                METRICS.inc_audit_records();
                debug!(audit_id = %record.audit_id, action = access.action, "access audited");
                result
            }
            Err(err) => {
                METRICS.inc_audit_failures();
                obs::emit_audit_unavailable(
                    access.action,
                    access.resource_type,
                    &access.resource_id,
                    &err,
                );
                Err(Failure::audit_unavailable(format!(
                    "{} on {} {} could not be audited: {err}",
                    access.action, access.resource_type, access.resource_id
                )))
            }
        }
    }
}

#[async_trait]
impl EffectInterpreter for HealthcareInterpreter {
    fn category(&self) -> EffectCategory {
        EffectCategory::Healthcare
    }

    async fn interpret(&self, effect: &Effect, ctx: &EffectContext) -> EffectResult {
        let this = self.clone();
        let effect = effect.clone();
        let ctx = ctx.clone();
        let task = tokio::spawn(async move {
            match this.execute(&effect).await {
                (Some(access), result) => this.audited(access, result, &ctx).await,
                (None, result) => result,
            }
        });

        match task.await {
            Ok(result) => result,
            // Re-raise on the caller's side so the runner reports the panic.
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(Failure::new(
                FailureKind::BackendUnavailable,
                format!("healthcare task did not finish: {err}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use healthhub_state::fakes::{FaultyAuditLog, MemoryAuditLog, MemoryClinicalStore};
    use healthhub_state::{ActorId, DoctorId, Patient, PatientId};

    fn ctx() -> EffectContext {
        EffectContext::new(ActorId::new("doctor-1"))
    }

    #[tokio::test]
    async fn test_read_is_audited_with_outcome() {
        let store = Arc::new(MemoryClinicalStore::new());
        let audit = Arc::new(MemoryAuditLog::new());
        let patient = Patient::new("Grace", "Hopper", NaiveDate::from_ymd_opt(1906, 12, 9).unwrap());
        store.insert_patient(patient.clone()).await.unwrap();
        let interp = HealthcareInterpreter::new(store, audit.clone());

        let ok = interp
            .interpret(
                &Effect::GetPatientById {
                    patient_id: patient.patient_id,
                },
                &ctx(),
            )
            .await;
        assert!(ok.is_ok());

        let missing = interp
            .interpret(
                &Effect::GetPatientById {
                    patient_id: PatientId::new(),
                },
                &ctx(),
            )
            .await;
        assert_eq!(missing.unwrap_err().kind, FailureKind::NotFound);

        let records = audit.all();
        assert_eq!(records.len(), 2);
        assert!(records[0].outcome.is_success());
        assert_eq!(
            records[1].outcome,
            AuditOutcome::Failure {
                kind: "not_found".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_interaction_check_is_not_audited() {
        let audit = Arc::new(MemoryAuditLog::new());
        let interp = HealthcareInterpreter::new(Arc::new(MemoryClinicalStore::new()), audit.clone());

        let result = interp
            .interpret(
                &Effect::CheckMedicationInteractions {
                    medications: vec!["aspirin".into(), "warfarin".into()],
                },
                &ctx(),
            )
            .await;
        assert_eq!(result, Ok(EffectValue::Interactions(vec![])));
        assert!(audit.is_empty());
    }

    #[tokio::test]
    async fn test_audit_outage_hides_committed_write() {
        let store = Arc::new(MemoryClinicalStore::new());
        let interp = HealthcareInterpreter::new(store.clone(), Arc::new(FaultyAuditLog::always()));

        let result = interp
            .interpret(
                &Effect::CreateAppointment {
                    patient_id: PatientId::new(),
                    doctor_id: DoctorId::new(),
                    requested_time: Utc::now(),
                    reason: "follow-up".into(),
                },
                &ctx(),
            )
            .await;
        assert_eq!(result.unwrap_err().kind, FailureKind::AuditUnavailable);
    }

    #[tokio::test]
    async fn test_blank_reason_is_validation_failure() {
        let interp = HealthcareInterpreter::new(
            Arc::new(MemoryClinicalStore::new()),
            Arc::new(MemoryAuditLog::new()),
        );
        let result = interp
            .interpret(
                &Effect::CreateAppointment {
                    patient_id: PatientId::new(),
                    doctor_id: DoctorId::new(),
                    requested_time: Utc::now(),
                    reason: "  ".into(),
                },
                &ctx(),
            )
            .await;
        assert_eq!(result.unwrap_err().kind, FailureKind::Validation);
    }

    #[tokio::test]
    async fn test_terminal_state_wins_over_stale_version() {
        let store = Arc::new(MemoryClinicalStore::new());
        let appt = Appointment::requested(PatientId::new(), DoctorId::new(), Utc::now(), "x");
        store.insert_appointment(appt.clone()).await.unwrap();
        store
            .compare_and_set_appointment_status(
                &appt.appointment_id,
                1,
                AppointmentStatus::Cancelled,
                Some("patient called".into()),
            )
            .await
            .unwrap();
        let interp = HealthcareInterpreter::new(store, Arc::new(MemoryAuditLog::new()));

        let result = interp
            .interpret(
                &Effect::TransitionAppointmentStatus {
                    appointment_id: appt.appointment_id,
                    expected_version: 1,
                    target: AppointmentStatus::Confirmed,
                    note: None,
                },
                &ctx(),
            )
            .await;
        assert_eq!(
            result.unwrap_err().kind,
            FailureKind::InvalidTransition {
                current: AppointmentStatus::Cancelled,
                attempted: AppointmentStatus::Confirmed,
            }
        );
    }

    #[tokio::test]
    async fn test_stale_version_is_conflict() {
        let store = Arc::new(MemoryClinicalStore::new());
        let appt = Appointment::requested(PatientId::new(), DoctorId::new(), Utc::now(), "x");
        store.insert_appointment(appt.clone()).await.unwrap();
        let interp = HealthcareInterpreter::new(store, Arc::new(MemoryAuditLog::new()));

        let result = interp
            .interpret(
                &Effect::TransitionAppointmentStatus {
                    appointment_id: appt.appointment_id,
                    expected_version: 7,
                    target: AppointmentStatus::Confirmed,
                    note: None,
                },
                &ctx(),
            )
            .await;
        assert_eq!(result.unwrap_err().kind, FailureKind::Conflict);
    }
}
