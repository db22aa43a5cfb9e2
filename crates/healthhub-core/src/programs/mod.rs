//! HealthHub programs.
//!
//! Each program is built from validated request parameters; the acting
//! identity and correlation id travel in the [`crate::context::RunContext`].
//! Every program propagates the first failure it sees, except publish
//! failures, which it ignores.

mod appointment;
mod lab;
mod patient;
mod prescription;

pub use appointment::{ScheduleAppointment, TransitionAppointment};
pub use lab::{ViewLabResult, CRITICAL_RESULT_VIEWED};
pub use patient::FetchPatient;
pub use prescription::{PrescribeMedication, PrescriptionOutcome};

use healthhub_state::{DoctorId, PatientId};

use crate::effect::EffectResult;
use crate::program::{ProtocolViolation, Resume};

/// Pub/sub channel a doctor's dashboard listens on.
pub fn doctor_channel(doctor_id: &DoctorId) -> String {
    format!("doctor:{doctor_id}:notifications")
}

/// Pub/sub channel a patient's portal listens on.
pub fn patient_channel(patient_id: &PatientId) -> String {
    format!("patient:{patient_id}:notifications")
}

/// Unwrap the effect result a waiting program expects.
fn awaited(
    program: &'static str,
    expected: &'static str,
    resume: Resume,
) -> Result<EffectResult, ProtocolViolation> {
    match resume {
        Resume::Result(result) => Ok(result),
        Resume::Start => Err(ProtocolViolation::unexpected_resume(
            program, expected, &resume,
        )),
    }
}

/// The first resumption must be `Start`.
fn started(program: &'static str, resume: &Resume) -> Result<(), ProtocolViolation> {
    match resume {
        Resume::Start => Ok(()),
        Resume::Result(_) => Err(ProtocolViolation::unexpected_resume(
            program, "start", resume,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names() {
        let doctor = DoctorId::new();
        assert_eq!(
            doctor_channel(&doctor),
            format!("doctor:{}:notifications", doctor.0)
        );
        let patient = PatientId::new();
        assert!(patient_channel(&patient).starts_with("patient:"));
    }
}
