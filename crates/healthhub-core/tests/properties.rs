//! Properties that hold for every program run, checked exhaustively where
//! the domain is small (the transition table) and by representative runs
//! elsewhere.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use healthhub_core::programs::{
    FetchPatient, PrescribeMedication, ScheduleAppointment, TransitionAppointment,
};
use healthhub_core::{
    replay, CompositeInterpreter, Effect, EffectContext, EffectInterpreter, FailureKind,
    HealthcareInterpreter, NewPrescription, NotificationInterpreter, RunContext, Runner,
};
use healthhub_state::fakes::{
    CountingClinicalStore, MemoryAuditLog, MemoryClinicalStore, UnavailableNotificationBus,
};
use healthhub_state::{
    ActorId, Appointment, AppointmentStatus, AuditLog, BroadcastNotificationBus, ClinicalStore,
    DoctorId, InteractionSeverity, MedicationInteraction, NotificationBus, Patient, PatientId,
};

fn composite(
    store: Arc<dyn ClinicalStore>,
    audit: Arc<dyn AuditLog>,
    bus: Arc<dyn NotificationBus>,
) -> CompositeInterpreter {
    CompositeInterpreter::builder()
        .register(Arc::new(HealthcareInterpreter::new(store, audit.clone())))
        .register(Arc::new(NotificationInterpreter::new(bus, audit)))
        .build()
        .expect("both categories registered")
}

fn ctx() -> RunContext {
    RunContext::new(ActorId::new("nurse-7"))
}

async fn seed_patient(store: &dyn ClinicalStore) -> Patient {
    let patient = Patient::new("Grace", "Hopper", NaiveDate::from_ymd_opt(1976, 12, 9).unwrap())
        .with_medications(&["warfarin"]);
    store.insert_patient(patient.clone()).await.unwrap();
    patient
}

async fn seed_appointment(store: &dyn ClinicalStore, status: AppointmentStatus) -> Appointment {
    use AppointmentStatus::*;
    let mut appt = Appointment::requested(PatientId::new(), DoctorId::new(), Utc::now(), "follow-up");
    store.insert_appointment(appt.clone()).await.unwrap();
    let path: &[AppointmentStatus] = match status {
        Requested => &[],
        Confirmed => &[Confirmed],
        InProgress => &[Confirmed, InProgress],
        Completed => &[Confirmed, InProgress, Completed],
        Cancelled => &[Cancelled],
    };
    for next in path {
        appt = store
            .compare_and_set_appointment_status(&appt.appointment_id, appt.version, *next, None)
            .await
            .unwrap();
    }
    appt
}

fn request(patient: &Patient, medication: &str) -> NewPrescription {
    NewPrescription {
        patient_id: patient.patient_id,
        doctor_id: DoctorId::new(),
        medication: medication.to_string(),
        dosage: "5mg".to_string(),
        frequency: "twice daily".to_string(),
        duration_days: 14,
        refills: 0,
        notes: Some("take with food".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Dispatch transparency
// ---------------------------------------------------------------------------

/// Test: routing through the composite returns exactly what the category
/// interpreter returns for the same effect.
#[tokio::test]
async fn composite_result_equals_direct_interpreter_result() {
    let store = Arc::new(MemoryClinicalStore::new());
    let patient = seed_patient(store.as_ref()).await;
    let audit = Arc::new(MemoryAuditLog::new());
    let bus = Arc::new(BroadcastNotificationBus::default());

    let healthcare = HealthcareInterpreter::new(store.clone(), audit.clone());
    let notification = NotificationInterpreter::new(bus.clone(), audit.clone());
    let routed = composite(store, audit, bus);
    let ctx = EffectContext::new(ActorId::new("nurse-7"));

    let healthcare_effects = vec![
        Effect::GetPatientById {
            patient_id: patient.patient_id,
        },
        Effect::GetPatientById {
            patient_id: PatientId::new(),
        },
        Effect::CheckMedicationInteractions {
            medications: vec!["warfarin".to_string(), "aspirin".to_string()],
        },
    ];
    for effect in &healthcare_effects {
        assert_eq!(
            routed.interpret(effect, &ctx).await,
            healthcare.interpret(effect, &ctx).await,
            "{}",
            effect.name()
        );
    }

    let publish = Effect::PublishWebSocketNotification {
        channel: "patient:nobody:notifications".to_string(),
        message_type: "ping".to_string(),
        payload: serde_json::json!({}),
    };
    assert_eq!(
        routed.interpret(&publish, &ctx).await,
        notification.interpret(&publish, &ctx).await
    );
}

// ---------------------------------------------------------------------------
// Replay determinism
// ---------------------------------------------------------------------------

/// Test: feeding a recorded run's results back reproduces its effects and
/// its outcome.
#[tokio::test]
async fn recorded_run_replays_identically() {
    let store = Arc::new(MemoryClinicalStore::new());
    let patient = seed_patient(store.as_ref()).await;
    store
        .insert_interaction(MedicationInteraction::new(
            "ibuprofen",
            "warfarin",
            InteractionSeverity::Moderate,
            "GI bleeding risk",
        ))
        .await
        .unwrap();
    let interp = composite(
        store,
        Arc::new(MemoryAuditLog::new()),
        Arc::new(BroadcastNotificationBus::default()),
    );

    let rx = request(&patient, "ibuprofen");

    let (outcome, trace) = Runner::default()
        .run_recorded(PrescribeMedication::new(rx.clone()), &interp, &ctx())
        .await
        .unwrap();
    assert_eq!(outcome.as_ref().unwrap().warnings.len(), 1);

    let replayed = replay(PrescribeMedication::new(rx), trace.results()).unwrap();
    assert_eq!(replayed.effects, trace.effects());
    assert_eq!(replayed.outcome, outcome);
}

/// Test: a failing run replays to the same failure.
#[tokio::test]
async fn failed_run_replays_to_same_failure() {
    let interp = composite(
        Arc::new(MemoryClinicalStore::new()),
        Arc::new(MemoryAuditLog::new()),
        Arc::new(BroadcastNotificationBus::default()),
    );
    let patient_id = PatientId::new();

    let (outcome, trace) = Runner::default()
        .run_recorded(FetchPatient::new(patient_id), &interp, &ctx())
        .await
        .unwrap();

    let replayed = replay(FetchPatient::new(patient_id), trace.results()).unwrap();
    assert_eq!(replayed.effects, trace.effects());
    assert_eq!(replayed.outcome, outcome);
    assert_eq!(replayed.outcome.unwrap_err().kind, FailureKind::NotFound);
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Test: every (current, target) pair either follows the table and bumps
/// the version by one, or fails `invalid_transition` with zero writes.
#[tokio::test]
async fn transition_table_is_enforced_for_every_pair() {
    let memory = Arc::new(MemoryClinicalStore::new());
    let counting = Arc::new(CountingClinicalStore::new(memory.clone()));
    let interp = composite(
        counting.clone(),
        Arc::new(MemoryAuditLog::new()),
        Arc::new(BroadcastNotificationBus::default()),
    );

    for current in AppointmentStatus::ALL {
        for target in AppointmentStatus::ALL {
            let appt = seed_appointment(memory.as_ref(), current).await;
            let writes_before = counting.writes();

            let outcome = Runner::default()
                .run(
                    TransitionAppointment::new(appt.appointment_id, target),
                    &interp,
                    &ctx(),
                )
                .await
                .unwrap();

            if current.can_transition_to(target) {
                let updated = outcome.unwrap_or_else(|f| panic!("{current} -> {target}: {f}"));
                assert_eq!(updated.status, target);
                assert_eq!(updated.version, appt.version + 1);
                assert_eq!(counting.writes(), writes_before + 1);
            } else {
                let failure = outcome.expect_err("transition outside the table");
                assert_eq!(
                    failure.kind,
                    FailureKind::InvalidTransition {
                        current,
                        attempted: target
                    }
                );
                assert_eq!(counting.writes(), writes_before, "{current} -> {target}");
                let stored = memory.get_appointment(&appt.appointment_id).await.unwrap();
                assert_eq!(stored, appt);
            }
        }
    }
}

/// Test: terminal states have no outgoing edge.
#[test]
fn terminal_states_allow_nothing() {
    for status in AppointmentStatus::ALL {
        if status.is_terminal() {
            assert!(AppointmentStatus::ALL
                .iter()
                .all(|target| !status.can_transition_to(*target)));
        }
    }
    assert!(AppointmentStatus::Completed.is_terminal());
    assert!(AppointmentStatus::Cancelled.is_terminal());
}

// ---------------------------------------------------------------------------
// Audit before success
// ---------------------------------------------------------------------------

/// Test: each protected access in a successful run has exactly one audit
/// record naming the resource it touched. The interaction check touches no
/// protected resource and is not audited.
#[tokio::test]
async fn every_protected_access_is_audited_once() {
    let store = Arc::new(MemoryClinicalStore::new());
    let patient = seed_patient(store.as_ref()).await;
    let audit = Arc::new(MemoryAuditLog::new());
    let interp = composite(
        store,
        audit.clone(),
        Arc::new(BroadcastNotificationBus::default()),
    );
    let ctx = ctx();

    let outcome = Runner::default()
        .run(
            PrescribeMedication::new(request(&patient, "amoxicillin")),
            &interp,
            &ctx,
        )
        .await
        .unwrap()
        .unwrap();

    let records = audit
        .list_by_correlation(&ctx.correlation_id())
        .await
        .unwrap();
    let summary: Vec<_> = records
        .iter()
        .map(|r| (r.action.as_str(), r.resource_type.as_str(), r.resource_id.clone()))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("get_patient", "patient", patient.patient_id.to_string()),
            (
                "create_prescription",
                "prescription",
                outcome.prescription.prescription_id.to_string()
            ),
        ]
    );
    assert!(records.iter().all(|r| r.outcome.is_success() && r.verify()));
}

// ---------------------------------------------------------------------------
// Fire-and-forget
// ---------------------------------------------------------------------------

/// Test: with the transport down, every notifying program still succeeds
/// and each made exactly one publish attempt.
#[tokio::test]
async fn notifying_programs_succeed_without_transport() {
    let store = Arc::new(MemoryClinicalStore::new());
    let patient = seed_patient(store.as_ref()).await;
    let appt = seed_appointment(store.as_ref(), AppointmentStatus::Requested).await;
    let bus = Arc::new(UnavailableNotificationBus::new());
    let interp = composite(store, Arc::new(MemoryAuditLog::new()), bus.clone());
    let runner = Runner::default();

    runner
        .run(
            ScheduleAppointment::new(patient.patient_id, DoctorId::new(), Utc::now(), "rash"),
            &interp,
            &ctx(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bus.attempts(), 1);

    runner
        .run(
            TransitionAppointment::new(appt.appointment_id, AppointmentStatus::Confirmed),
            &interp,
            &ctx(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bus.attempts(), 2);

    runner
        .run(
            PrescribeMedication::new(request(&patient, "cetirizine")),
            &interp,
            &ctx(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(bus.attempts(), 3);
}

/// Test: a publish the transport rejects comes back as `unavailable` from
/// the interpreter, never as a run error.
#[tokio::test]
async fn rejected_publish_is_typed_failure() {
    let interp = composite(
        Arc::new(MemoryClinicalStore::new()),
        Arc::new(MemoryAuditLog::new()),
        Arc::new(UnavailableNotificationBus::new()),
    );
    let result = interp
        .interpret(
            &Effect::PublishWebSocketNotification {
                channel: "doctor:x:notifications".to_string(),
                message_type: "appointment_requested".to_string(),
                payload: serde_json::json!({"n": 1}),
            },
            &EffectContext::new(ActorId::new("system")),
        )
        .await;
    assert_eq!(result.unwrap_err().kind, FailureKind::Unavailable);
}
