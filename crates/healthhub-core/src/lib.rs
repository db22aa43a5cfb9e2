//! HealthHub Core: effect programs and their interpreters
//!
//! Business logic is written as [`Program`]s: explicit state machines that
//! yield inert [`Effect`]s and are resumed with each effect's result. The
//! [`Runner`] drives a program against a [`CompositeInterpreter`], which
//! routes each effect to the interpreter for its category. Interpreters are
//! the only place I/O happens.
//!
//! ## Key Components
//!
//! - `Effect`, `EffectValue`, `Failure`: the effect/result vocabulary
//! - `Program`, `Resume`, `Step`: the resumption protocol
//! - `Runner`: the run loop with step timeouts, cancellation and replay
//! - `HealthcareInterpreter`, `NotificationInterpreter`, `CompositeInterpreter`
//! - `programs`: the HealthHub programs
//! - `obs`, `metrics`, `telemetry`: tracing and counters

pub mod config;
pub mod context;
pub mod effect;
pub mod failure;
pub mod interpreter;
pub mod metrics;
pub mod obs;
pub mod program;
pub mod programs;
pub mod runner;
pub mod telemetry;

pub use config::RunnerConfig;
pub use context::{CancelHandle, CancelSignal, EffectContext, RunContext};
pub use effect::{Effect, EffectCategory, EffectResult, EffectValue, NewPrescription};
pub use failure::{Failure, FailureKind};
pub use interpreter::{
    AssemblyError, CompositeInterpreter, EffectInterpreter, HealthcareInterpreter,
    NotificationInterpreter,
};
pub use program::{Program, ProtocolViolation, Resume, Step};
pub use runner::{replay, ProgramResult, Replayed, RunError, Runner, Trace, TraceStep};
