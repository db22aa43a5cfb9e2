use healthhub_state::{LabResult, LabResultId};
use serde_json::json;

use super::{awaited, started};
use crate::effect::Effect;
use crate::program::{Program, ProtocolViolation, Resume, Step};

/// Audit action recorded when a critical, unreviewed result is opened.
pub const CRITICAL_RESULT_VIEWED: &str = "critical_result_viewed";

enum State {
    Start,
    AwaitingResult,
    AwaitingAudit(LabResult),
    Done,
}

/// Open a lab result.
///
/// The read itself is audited by the interpreter. A critical result that no
/// doctor has reviewed yet also gets an explicit `critical_result_viewed`
/// audit event; if that event cannot be persisted the result is withheld.
pub struct ViewLabResult {
    result_id: LabResultId,
    state: State,
}

impl ViewLabResult {
    pub fn new(result_id: LabResultId) -> Self {
        Self {
            result_id,
            state: State::Start,
        }
    }
}

impl Program for ViewLabResult {
    type Output = LabResult;

    fn name(&self) -> &'static str {
        "view_lab_result"
    }

    fn resume(&mut self, resume: Resume) -> Result<Step<LabResult>, ProtocolViolation> {
        match std::mem::replace(&mut self.state, State::Done) {
            State::Start => {
                started(self.name(), &resume)?;
                self.state = State::AwaitingResult;
                Ok(Step::Yield(Effect::GetLabResultById {
                    result_id: self.result_id,
                }))
            }
            State::AwaitingResult => match awaited(self.name(), "lab_result", resume)? {
                Ok(value) => {
                    let result = value.into_lab_result()?;
                    if !result.critical || result.reviewed_by_doctor {
                        return Ok(Step::Complete(result));
                    }
                    let audit = Effect::LogAuditEvent {
                        action: CRITICAL_RESULT_VIEWED.to_string(),
                        resource_type: "lab_result".to_string(),
                        resource_id: result.result_id.to_string(),
                        metadata: Some(json!({
                            "patient_id": result.patient_id,
                            "test_type": result.test_type,
                        })),
                    };
                    self.state = State::AwaitingAudit(result);
                    Ok(Step::Yield(audit))
                }
                Err(failure) => Ok(Step::Fail(failure)),
            },
            State::AwaitingAudit(result) => match awaited(self.name(), "audit record", resume)? {
                Ok(value) => {
                    value.into_audit_record()?;
                    Ok(Step::Complete(result))
                }
                Err(failure) => Ok(Step::Fail(failure)),
            },
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
    use crate::failure::{Failure, FailureKind};
    use crate::runner::replay;
    use chrono::Utc;
    use healthhub_state::{DoctorId, PatientId};

    fn lab(critical: bool, reviewed: bool) -> LabResult {
        LabResult {
            result_id: LabResultId::new(),
            patient_id: PatientId::new(),
            doctor_id: DoctorId::new(),
            test_type: "potassium".to_string(),
            result_data: json!({"mmol_per_l": 6.8}),
            critical,
            reviewed_by_doctor: reviewed,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_routine_result_needs_no_extra_audit() {
        let result = lab(false, false);
        let replayed = replay(
            ViewLabResult::new(result.result_id),
            vec![Ok(EffectValue::LabResult(result.clone()))],
        )
        .unwrap();
        assert_eq!(replayed.effects.len(), 1);
        assert_eq!(replayed.outcome, Ok(result));
    }

    #[test]
    fn test_reviewed_critical_result_needs_no_extra_audit() {
        let result = lab(true, true);
        let replayed = replay(
            ViewLabResult::new(result.result_id),
            vec![Ok(EffectValue::LabResult(result.clone()))],
        )
        .unwrap();
        assert_eq!(replayed.effects.len(), 1);
    }

    #[test]
    fn test_audit_failure_withholds_critical_result() {
        let result = lab(true, false);
        let replayed = replay(
            ViewLabResult::new(result.result_id),
            vec![
                Ok(EffectValue::LabResult(result)),
                Err(Failure::audit_unavailable("audit store down")),
            ],
        )
        .unwrap();
        assert!(matches!(
            replayed.effects[1],
            Effect::LogAuditEvent { ref action, .. } if action == CRITICAL_RESULT_VIEWED
        ));
        assert_eq!(
            replayed.outcome.unwrap_err().kind,
            FailureKind::AuditUnavailable
        );
    }
}
