use healthhub_state::{InteractionSeverity, MedicationInteraction, Prescription};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{awaited, patient_channel, started};
use crate::effect::{Effect, NewPrescription};
use crate::failure::Failure;
use crate::program::{Program, ProtocolViolation, Resume, Step};

/// A created prescription plus the interactions the prescriber should know
/// about. None of the warnings was severe enough to block it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionOutcome {
    pub prescription: Prescription,
    pub warnings: Vec<MedicationInteraction>,
}

enum State {
    Start,
    AwaitingPatient,
    AwaitingInteractions,
    AwaitingCreate(Vec<MedicationInteraction>),
    AwaitingPublish(PrescriptionOutcome),
    Done,
}

/// Prescribe a medication after checking it against what the patient
/// already takes.
///
/// A contraindicated interaction fails with `validation` before anything is
/// written. Milder interactions are returned as warnings.
pub struct PrescribeMedication {
    request: NewPrescription,
    state: State,
}

impl PrescribeMedication {
    pub fn new(request: NewPrescription) -> Self {
        Self {
            request,
            state: State::Start,
        }
    }

    /// Interactions that involve the medication being prescribed, most
    /// severe first.
    fn relevant(&self, found: Vec<MedicationInteraction>) -> Vec<MedicationInteraction> {
        let new = self.request.medication.to_lowercase();
        let mut relevant: Vec<_> = found
            .into_iter()
            .filter(|ix| {
                ix.medication_a.to_lowercase() == new || ix.medication_b.to_lowercase() == new
            })
            .collect();
        relevant.sort_by(|a, b| b.severity.cmp(&a.severity));
        relevant
    }
}

impl Program for PrescribeMedication {
    type Output = PrescriptionOutcome;

    fn name(&self) -> &'static str {
        "prescribe_medication"
    }

    fn resume(&mut self, resume: Resume) -> Result<Step<PrescriptionOutcome>, ProtocolViolation> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Start => {
                started(self.name(), &resume)?;
                self.state = State::AwaitingPatient;
                Ok(Step::Yield(Effect::GetPatientById {
                    patient_id: self.request.patient_id,
                }))
            }
            State::AwaitingPatient => match awaited(self.name(), "patient", resume)? {
                Ok(value) => {
                    let patient = value.into_patient()?;
                    let mut medications = vec![self.request.medication.clone()];
                    medications.extend(patient.current_medications);
                    self.state = State::AwaitingInteractions;
                    Ok(Step::Yield(Effect::CheckMedicationInteractions { medications }))
                }
                Err(failure) => Ok(Step::Fail(failure)),
            },
            State::AwaitingInteractions => match awaited(self.name(), "interactions", resume)? {
                Ok(value) => {
                    let warnings = self.relevant(value.into_interactions()?);
                    if let Some(blocking) = warnings
                        .iter()
                        .find(|ix| ix.severity == InteractionSeverity::Contraindicated)
                    {
                        return Ok(Step::Fail(Failure::validation(format!(
                            "{} is contraindicated with {}: {}",
                            blocking.medication_a, blocking.medication_b, blocking.description
                        ))));
                    }
                    self.state = State::AwaitingCreate(warnings);
                    Ok(Step::Yield(Effect::CreatePrescription(self.request.clone())))
                }
                Err(failure) => Ok(Step::Fail(failure)),
            },
            State::AwaitingCreate(warnings) => {
                match awaited(self.name(), "prescription", resume)? {
                    Ok(value) => {
                        let prescription = value.into_prescription()?;
                        let publish = Effect::PublishWebSocketNotification {
                            channel: patient_channel(&prescription.patient_id),
                            message_type: "prescription_created".to_string(),
                            payload: json!({
                                "prescription_id": prescription.prescription_id,
                                "medication": prescription.medication,
                                "dosage": prescription.dosage,
                                "frequency": prescription.frequency,
                            }),
                        };
                        self.state = State::AwaitingPublish(PrescriptionOutcome {
                            prescription,
                            warnings,
                        });
                        Ok(Step::Yield(publish))
                    }
                    Err(failure) => Ok(Step::Fail(failure)),
                }
            }
            State::AwaitingPublish(outcome) => {
                awaited(self.name(), "publish result", resume)?;
                Ok(Step::Complete(outcome))
            }
            State::Done => Err(ProtocolViolation::ResumedAfterTermination {
                program: self.name(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::EffectValue;
    use crate::failure::FailureKind;
    use crate::runner::replay;
    use chrono::NaiveDate;
    use healthhub_state::{DoctorId, Patient};

    fn request(patient: &Patient, medication: &str) -> NewPrescription {
        NewPrescription {
            patient_id: patient.patient_id,
            doctor_id: DoctorId::new(),
            medication: medication.to_string(),
            dosage: "100mg".to_string(),
            frequency: "daily".to_string(),
            duration_days: 30,
            refills: 1,
            notes: None,
        }
    }

    fn patient() -> Patient {
        Patient::new("Rosalind", "Franklin", NaiveDate::from_ymd_opt(1920, 7, 25).unwrap())
            .with_medications(&["warfarin", "metformin"])
    }

    #[test]
    fn test_checks_new_medication_against_current_ones() {
        let patient = patient();
        let mut program = PrescribeMedication::new(request(&patient, "aspirin"));
        program.resume(Resume::Start).unwrap();
        let step = program
            .resume(Resume::Result(Ok(EffectValue::Patient(patient))))
            .unwrap();
        assert_eq!(
            step,
            Step::Yield(Effect::CheckMedicationInteractions {
                medications: vec![
                    "aspirin".to_string(),
                    "warfarin".to_string(),
                    "metformin".to_string()
                ],
            })
        );
    }

    #[test]
    fn test_contraindication_blocks_before_any_write() {
        let patient = patient();
        let replayed = replay(
            PrescribeMedication::new(request(&patient, "Ketoconazole")),
            vec![
                Ok(EffectValue::Patient(patient)),
                Ok(EffectValue::Interactions(vec![MedicationInteraction::new(
                    "ketoconazole",
                    "warfarin",
                    InteractionSeverity::Contraindicated,
                    "CYP3A4 inhibition",
                )])),
            ],
        )
        .unwrap();

        assert_eq!(replayed.effects.len(), 2);
        assert!(!replayed
            .effects
            .iter()
            .any(|e| matches!(e, Effect::CreatePrescription(_))));
        assert_eq!(replayed.outcome.unwrap_err().kind, FailureKind::Validation);
    }

    #[test]
    fn test_unrelated_interactions_are_not_warnings() {
        let patient = patient();
        let rx = request(&patient, "aspirin").into_prescription();
        let replayed = replay(
            PrescribeMedication::new(request(&patient, "aspirin")),
            vec![
                Ok(EffectValue::Patient(patient)),
                Ok(EffectValue::Interactions(vec![
                    MedicationInteraction::new(
                        "warfarin",
                        "metformin",
                        InteractionSeverity::Contraindicated,
                        "pre-existing, already managed",
                    ),
                    MedicationInteraction::new(
                        "Aspirin",
                        "warfarin",
                        InteractionSeverity::Major,
                        "bleeding risk",
                    ),
                ])),
                Ok(EffectValue::Prescription(rx)),
                Ok(EffectValue::Published { recipients: 0 }),
            ],
        )
        .unwrap();

        let outcome = replayed.outcome.unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].severity, InteractionSeverity::Major);
    }
}
