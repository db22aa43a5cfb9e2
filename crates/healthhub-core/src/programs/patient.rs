use healthhub_state::{Patient, PatientId};

use super::{awaited, started};
use crate::effect::Effect;
use crate::program::{Program, ProtocolViolation, Resume, Step};

enum State {
    Start,
    AwaitingPatient,
    Done,
}

/// Look up one patient.
pub struct FetchPatient {
    patient_id: PatientId,
    state: State,
}

impl FetchPatient {
    pub fn new(patient_id: PatientId) -> Self {
        Self {
            patient_id,
            state: State::Start,
        }
    }
}

impl Program for FetchPatient {
    type Output = Patient;

    fn name(&self) -> &'static str {
        "fetch_patient"
    }

    fn resume(&mut self, resume: Resume) -> Result<Step<Patient>, ProtocolViolation> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Start => {
                started(self.name(), &resume)?;
                self.state = State::AwaitingPatient;
                Ok(Step::Yield(Effect::GetPatientById {
                    patient_id: self.patient_id,
                }))
            }
            State::AwaitingPatient => match awaited(self.name(), "patient", resume)? {
                Ok(value) => Ok(Step::Complete(value.into_patient()?)),
                Err(failure) => Ok(Step::Fail(failure)),
            },
            State::Done => Err(ProtocolViolation::ResumedAfterTermination {
                program: self.name(),
            }),
        }
    }
}
