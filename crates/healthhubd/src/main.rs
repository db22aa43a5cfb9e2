//! HealthHub daemon
//!
//! Connects the clinical store, audit log and notification bus, assembles
//! the effect interpreters (a missing category is a startup error) and runs
//! a demonstration appointment and prescription flow through the runner.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, ValueEnum};
use healthhub_core::metrics::METRICS;
use healthhub_core::programs::{PrescribeMedication, ScheduleAppointment, TransitionAppointment};
use healthhub_core::telemetry::init_tracing;
use healthhub_core::{
    AssemblyError, CompositeInterpreter, HealthcareInterpreter, NewPrescription,
    NotificationInterpreter, ProgramResult, RunContext, Runner, RunnerConfig,
};
use healthhub_state::fakes::{MemoryAuditLog, MemoryClinicalStore};
use healthhub_state::{
    ActorId, AppointmentStatus, AuditLog, BroadcastNotificationBus, ClinicalStore, DoctorId,
    InteractionSeverity, MedicationInteraction, NotificationBus, Patient, SurrealAuditLog,
    SurrealClinicalStore, SurrealHandle,
};
use tracing::{info, warn, Level};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Process-local stores, lost on exit
    Memory,
    /// SurrealDB, resolved from SURREALDB_* environment variables
    Surreal,
}

#[derive(Debug, Parser)]
#[command(name = "healthhubd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "HealthHub effect runtime", long_about = None)]
struct Config {
    /// Storage backend for clinical records and the audit log
    #[arg(long, env = "HEALTHHUB_BACKEND", value_enum, default_value_t = Backend::Memory)]
    backend: Backend,

    /// Maximum time for one interpreter call, in milliseconds
    #[arg(long, env = "HEALTHHUB_STEP_TIMEOUT_MS", default_value_t = 5_000)]
    step_timeout_ms: u64,

    /// Maximum number of effects one program may yield
    #[arg(long, env = "HEALTHHUB_MAX_STEPS", default_value_t = 256)]
    max_steps: usize,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Config {
    fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            step_timeout_ms: self.step_timeout_ms,
            max_steps: self.max_steps,
        }
    }
}

struct Backends {
    store: Arc<dyn ClinicalStore>,
    audit: Arc<dyn AuditLog>,
    bus: Arc<dyn NotificationBus>,
}

async fn connect(backend: Backend) -> Result<Backends> {
    let bus: Arc<dyn NotificationBus> = Arc::new(BroadcastNotificationBus::default());
    match backend {
        Backend::Memory => Ok(Backends {
            store: Arc::new(MemoryClinicalStore::new()),
            audit: Arc::new(MemoryAuditLog::new()),
            bus,
        }),
        Backend::Surreal => {
            let handle = SurrealHandle::from_env()
                .await
                .context("failed to connect to SurrealDB")?;
            handle
                .health_check()
                .await
                .context("SurrealDB health check failed")?;
            Ok(Backends {
                store: Arc::new(SurrealClinicalStore::new(handle.clone())),
                audit: Arc::new(SurrealAuditLog::new(handle)),
                bus,
            })
        }
    }
}

fn assemble(backends: &Backends) -> Result<CompositeInterpreter, AssemblyError> {
    CompositeInterpreter::builder()
        .register(Arc::new(HealthcareInterpreter::new(
            backends.store.clone(),
            backends.audit.clone(),
        )))
        .register(Arc::new(NotificationInterpreter::new(
            backends.bus.clone(),
            backends.audit.clone(),
        )))
        .build()
}

fn completed<T>(program: &str, outcome: ProgramResult<T>) -> Result<T> {
    outcome.map_err(|failure| anyhow!("{program} failed: {failure}"))
}

/// Seed one patient, then schedule, walk and prescribe on their behalf.
async fn demo(
    runner: &Runner,
    interpreter: &CompositeInterpreter,
    store: &dyn ClinicalStore,
) -> Result<()> {
    let date_of_birth = NaiveDate::from_ymd_opt(1985, 12, 10).context("invalid birth date")?;
    let patient = Patient::new("Ada", "Lovelace", date_of_birth).with_medications(&["warfarin"]);
    store
        .insert_patient(patient.clone())
        .await
        .context("failed to seed demo patient")?;
    store
        .insert_interaction(MedicationInteraction::new(
            "aspirin",
            "warfarin",
            InteractionSeverity::Major,
            "increased bleeding risk",
        ))
        .await
        .context("failed to seed interaction table")?;

    let ctx = RunContext::new(ActorId::new("healthhubd-demo"));
    let doctor_id = DoctorId::new();

    let appointment = completed(
        "schedule_appointment",
        runner
            .run(
                ScheduleAppointment::new(
                    patient.patient_id,
                    doctor_id,
                    Utc::now() + Duration::days(3),
                    "annual physical",
                ),
                interpreter,
                &ctx,
            )
            .await?,
    )?;
    info!(appointment_id = %appointment.appointment_id, "appointment requested");

    for target in [
        AppointmentStatus::Confirmed,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
    ] {
        let updated = completed(
            "transition_appointment",
            runner
                .run(
                    TransitionAppointment::new(appointment.appointment_id, target),
                    interpreter,
                    &ctx,
                )
                .await?,
        )?;
        info!(status = %updated.status, version = updated.version, "appointment updated");
    }

    // Completed is terminal; this one is expected to be refused.
    if let Err(failure) = runner
        .run(
            TransitionAppointment::new(appointment.appointment_id, AppointmentStatus::Cancelled),
            interpreter,
            &ctx,
        )
        .await?
    {
        warn!(kind = %failure.kind, "transition refused: {}", failure.message);
    }

    let outcome = completed(
        "prescribe_medication",
        runner
            .run(
                PrescribeMedication::new(NewPrescription {
                    patient_id: patient.patient_id,
                    doctor_id,
                    medication: "aspirin".to_string(),
                    dosage: "81mg".to_string(),
                    frequency: "daily".to_string(),
                    duration_days: 30,
                    refills: 0,
                    notes: None,
                }),
                interpreter,
                &ctx,
            )
            .await?,
    )?;
    for warning in &outcome.warnings {
        warn!(
            severity = ?warning.severity,
            "{} interacts with {}: {}",
            warning.medication_a,
            warning.medication_b,
            warning.description
        );
    }
    info!(prescription_id = %outcome.prescription.prescription_id, "prescription created");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    let level = if config.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(config.json, level);
    info!(
        backend = ?config.backend,
        step_timeout_ms = config.step_timeout_ms,
        max_steps = config.max_steps,
        "healthhubd starting"
    );

    let backends = connect(config.backend).await?;
    let interpreter = assemble(&backends).context("interpreter assembly failed")?;
    let runner = Runner::new(config.runner_config());

    demo(&runner, &interpreter, backends.store.as_ref()).await?;
    METRICS.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Config::command().debug_assert();
    }

    #[test]
    fn test_flags_override_defaults() {
        let config = Config::try_parse_from([
            "healthhubd",
            "--backend",
            "surreal",
            "--step-timeout-ms",
            "250",
            "--max-steps",
            "16",
            "--json",
        ])
        .unwrap();
        assert_eq!(config.backend, Backend::Surreal);
        assert!(config.json);
        assert_eq!(
            config.runner_config(),
            RunnerConfig {
                step_timeout_ms: 250,
                max_steps: 16
            }
        );
    }

    #[tokio::test]
    async fn test_demo_runs_against_memory_backends() {
        let backends = connect(Backend::Memory).await.unwrap();
        let interpreter = assemble(&backends).unwrap();
        demo(&Runner::default(), &interpreter, backends.store.as_ref())
            .await
            .unwrap();
    }
}
