use chrono::{DateTime, Utc};
use healthhub_state::{Appointment, AppointmentId, AppointmentStatus, DoctorId, PatientId};
use serde_json::json;

use super::{awaited, doctor_channel, patient_channel, started};
use crate::effect::Effect;
use crate::program::{Program, ProtocolViolation, Resume, Step};

// ---------------------------------------------------------------------------
// ScheduleAppointment
// ---------------------------------------------------------------------------

enum ScheduleState {
    Start,
    AwaitingPatient,
    AwaitingCreate,
    AwaitingPublish(Appointment),
    Done,
}

/// Request an appointment for an existing patient and tell the doctor.
///
/// Effects: `GetPatientById`, `CreateAppointment`, then a publish to the
/// doctor's channel whose result is ignored.
pub struct ScheduleAppointment {
    patient_id: PatientId,
    doctor_id: DoctorId,
    requested_time: DateTime<Utc>,
    reason: String,
    state: ScheduleState,
}

impl ScheduleAppointment {
    pub fn new(
        patient_id: PatientId,
        doctor_id: DoctorId,
        requested_time: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            patient_id,
            doctor_id,
            requested_time,
            reason: reason.into(),
            state: ScheduleState::Start,
        }
    }
}

impl Program for ScheduleAppointment {
    type Output = Appointment;

    fn name(&self) -> &'static str {
        "schedule_appointment"
    }

    fn resume(&mut self, resume: Resume) -> Result<Step<Appointment>, ProtocolViolation> {
        match std::mem::replace(&mut self.state, ScheduleState::Done) {
            ScheduleState::Start => {
                started(self.name(), &resume)?;
                self.state = ScheduleState::AwaitingPatient;
                Ok(Step::Yield(Effect::GetPatientById {
                    patient_id: self.patient_id,
                }))
            }
            ScheduleState::AwaitingPatient => match awaited(self.name(), "patient", resume)? {
                Ok(value) => {
                    value.into_patient()?;
                    self.state = ScheduleState::AwaitingCreate;
                    Ok(Step::Yield(Effect::CreateAppointment {
                        patient_id: self.patient_id,
                        doctor_id: self.doctor_id,
                        requested_time: self.requested_time,
                        reason: self.reason.clone(),
                    }))
                }
                Err(failure) => Ok(Step::Fail(failure)),
            },
            ScheduleState::AwaitingCreate => match awaited(self.name(), "appointment", resume)? {
                Ok(value) => {
                    let appointment = value.into_appointment()?;
                    let publish = Effect::PublishWebSocketNotification {
                        channel: doctor_channel(&appointment.doctor_id),
                        message_type: "appointment_requested".to_string(),
                        payload: json!({
                            "appointment_id": appointment.appointment_id,
                            "patient_id": appointment.patient_id,
                            "requested_time": appointment.requested_time,
                            "reason": appointment.reason,
                        }),
                    };
                    self.state = ScheduleState::AwaitingPublish(appointment);
                    Ok(Step::Yield(publish))
                }
                Err(failure) => Ok(Step::Fail(failure)),
            },
            ScheduleState::AwaitingPublish(appointment) => {
                awaited(self.name(), "publish result", resume)?;
                Ok(Step::Complete(appointment))
            }
            ScheduleState::Done => Err(ProtocolViolation::ResumedAfterTermination {
                program: self.name(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// TransitionAppointment
// ---------------------------------------------------------------------------

enum TransitionState {
    Start,
    AwaitingRead,
    AwaitingTransition,
    AwaitingPublish(Appointment),
    Done,
}

/// Move an appointment to `target` and tell the patient.
///
/// Reads the appointment first and transitions against the version it
/// read, so a concurrent change in between surfaces as `conflict`. The
/// conflict is returned to the caller; this program does not retry.
pub struct TransitionAppointment {
    appointment_id: AppointmentId,
    target: AppointmentStatus,
    note: Option<String>,
    observed_version: Option<u64>,
    state: TransitionState,
}

impl TransitionAppointment {
    pub fn new(appointment_id: AppointmentId, target: AppointmentStatus) -> Self {
        Self {
            appointment_id,
            target,
            note: None,
            observed_version: None,
            state: TransitionState::Start,
        }
    }

    /// Skip the read: the caller already observed `version` (e.g. from an
    /// earlier response) and the transition must apply against exactly it.
    pub fn at_version(
        appointment_id: AppointmentId,
        version: u64,
        target: AppointmentStatus,
    ) -> Self {
        Self {
            observed_version: Some(version),
            ..Self::new(appointment_id, target)
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    fn transition(&mut self, expected_version: u64) -> Step<Appointment> {
        self.state = TransitionState::AwaitingTransition;
        Step::Yield(Effect::TransitionAppointmentStatus {
            appointment_id: self.appointment_id,
            expected_version,
            target: self.target,
            note: self.note.clone(),
        })
    }
}

impl Program for TransitionAppointment {
    type Output = Appointment;

    fn name(&self) -> &'static str {
        "transition_appointment"
    }

    fn resume(&mut self, resume: Resume) -> Result<Step<Appointment>, ProtocolViolation> {
        match std::mem::replace(&mut self.state, TransitionState::Done) {
            TransitionState::Start => {
                started(self.name(), &resume)?;
                match self.observed_version {
                    Some(version) => Ok(self.transition(version)),
                    None => {
                        self.state = TransitionState::AwaitingRead;
                        Ok(Step::Yield(Effect::GetAppointmentById {
                            appointment_id: self.appointment_id,
                        }))
                    }
                }
            }
            TransitionState::AwaitingRead => match awaited(self.name(), "appointment", resume)? {
                Ok(value) => {
                    let current = value.into_appointment()?;
                    Ok(self.transition(current.version))
                }
                Err(failure) => Ok(Step::Fail(failure)),
            },
            TransitionState::AwaitingTransition => {
                match awaited(self.name(), "appointment", resume)? {
                    Ok(value) => {
                        let updated = value.into_appointment()?;
                        let publish = Effect::PublishWebSocketNotification {
                            channel: patient_channel(&updated.patient_id),
                            message_type: "appointment_status_changed".to_string(),
                            payload: json!({
                                "appointment_id": updated.appointment_id,
                                "status": updated.status,
                                "note": updated.status_note,
                            }),
                        };
                        self.state = TransitionState::AwaitingPublish(updated);
                        Ok(Step::Yield(publish))
                    }
                    Err(failure) => Ok(Step::Fail(failure)),
                }
            }
            TransitionState::AwaitingPublish(updated) => {
                awaited(self.name(), "publish result", resume)?;
                Ok(Step::Complete(updated))
            }
            TransitionState::Done => Err(ProtocolViolation::ResumedAfterTermination {
                program: self.name(),
            }),
        }
    }
}
