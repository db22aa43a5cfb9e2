//! Program runner.
//!
//! Drives one program to completion: resume it with the previous result,
//! hand the yielded effect to the composite interpreter, repeat. The runner
//! knows nothing about what an effect means and never retries.
//!
//! Two kinds of bad outcome are kept apart:
//! - a typed [`Failure`] is a business result; the program sees it and
//!   decides what to do, and the caller gets it as the program's result
//! - a [`RunError`] ends the run without consulting the program
//!   (cancellation, a panicking interpreter, a broken program contract)

use std::panic::AssertUnwindSafe;
use std::time::Instant;

use futures::FutureExt;
use thiserror::Error;
use tracing::Instrument;

use crate::config::RunnerConfig;
use crate::context::RunContext;
use crate::effect::{Effect, EffectResult};
use crate::failure::Failure;
use crate::interpreter::CompositeInterpreter;
use crate::metrics::METRICS;
use crate::obs;
use crate::program::{Program, ProtocolViolation, Resume, Step};

/// What the caller of a run gets back: the program's value or its failure.
pub type ProgramResult<T> = Result<T, Failure>;

/// A run ended without a program result. Never fed back into the program.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{program} cancelled after {steps} effects")]
    Cancelled { program: &'static str, steps: usize },

    #[error("interpreter panicked while handling {effect}: {message}")]
    InterpreterPanicked {
        effect: &'static str,
        message: String,
    },

    #[error(transparent)]
    ProtocolViolation(#[from] ProtocolViolation),

    #[error("{program} exceeded the limit of {limit} effects")]
    StepLimitExceeded { program: &'static str, limit: usize },

    #[error("{program} yielded more effects than the {steps} recorded results")]
    TraceExhausted { program: &'static str, steps: usize },
}

/// One interpreted effect and the result the program was resumed with.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceStep {
    pub effect: Effect,
    pub result: EffectResult,
}

/// Every effect/result exchange of one run, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trace {
    pub steps: Vec<TraceStep>,
}

impl Trace {
    pub fn effects(&self) -> Vec<Effect> {
        self.steps.iter().map(|s| s.effect.clone()).collect()
    }

    pub fn results(&self) -> Vec<EffectResult> {
        self.steps.iter().map(|s| s.result.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Outcome of [`replay`].
#[derive(Debug, Clone, PartialEq)]
pub struct Replayed<T> {
    /// Effects the program yielded, in order
    pub effects: Vec<Effect>,
    pub outcome: ProgramResult<T>,
}

#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Drive `program` to completion against `interpreter`.
    pub async fn run<P: Program>(
        &self,
        program: P,
        interpreter: &CompositeInterpreter,
        ctx: &RunContext,
    ) -> Result<ProgramResult<P::Output>, RunError> {
        self.run_inner(program, interpreter, ctx, None).await
    }

    /// Like [`Runner::run`], also returning every effect/result exchange.
    pub async fn run_recorded<P: Program>(
        &self,
        program: P,
        interpreter: &CompositeInterpreter,
        ctx: &RunContext,
    ) -> Result<(ProgramResult<P::Output>, Trace), RunError> {
        let mut trace = Trace::default();
        let outcome = self
            .run_inner(program, interpreter, ctx, Some(&mut trace))
            .await?;
        Ok((outcome, trace))
    }

    async fn run_inner<P: Program>(
        &self,
        program: P,
        interpreter: &CompositeInterpreter,
        ctx: &RunContext,
        trace: Option<&mut Trace>,
    ) -> Result<ProgramResult<P::Output>, RunError> {
        let name = program.name();
        let correlation_id = ctx.correlation_id();
        let span = obs::program_span(name, &correlation_id);
        span.in_scope(|| obs::emit_program_started(name, &correlation_id, &ctx.effect.actor));
        METRICS.inc_programs_run();

        let started = Instant::now();
        let outcome = self
            .drive(program, interpreter, ctx, trace)
            .instrument(span.clone())
            .await;
        let _entered = span.enter();
        match outcome {
            Ok((outcome, steps)) => {
                let label = match &outcome {
                    Ok(_) => "success",
                    Err(failure) => {
                        METRICS.inc_business_failures();
                        failure.kind.as_str()
                    }
                };
                let duration_ms = started.elapsed().as_millis() as u64;
                obs::emit_program_finished(name, duration_ms, steps, label);
                Ok(outcome)
            }
            Err(err) => {
                obs::emit_run_aborted(name, &err);
                Err(err)
            }
        }
    }

    /// The loop proper. Returns the program result and the number of
    /// effects interpreted.
    async fn drive<P: Program>(
        &self,
        mut program: P,
        interpreter: &CompositeInterpreter,
        ctx: &RunContext,
        mut trace: Option<&mut Trace>,
    ) -> Result<(ProgramResult<P::Output>, usize), RunError> {
        let name = program.name();
        let mut resume = Resume::Start;
        let mut steps = 0usize;

        loop {
            if ctx.cancel.is_cancelled() {
                return Err(RunError::Cancelled {
                    program: name,
                    steps,
                });
            }

            let effect = match program.resume(resume)? {
                Step::Yield(effect) => effect,
                Step::Complete(value) => return Ok((Ok(value), steps)),
                Step::Fail(failure) => return Ok((Err(failure), steps)),
            };

            if steps >= self.config.max_steps {
                return Err(RunError::StepLimitExceeded {
                    program: name,
                    limit: self.config.max_steps,
                });
            }
            steps += 1;
            obs::emit_effect_dispatched(name, effect.name(), steps);
            METRICS.inc_effects_interpreted();

            let result = self.dispatch(&effect, interpreter, ctx, name, steps).await?;
            if let Some(trace) = trace.as_deref_mut() {
                trace.steps.push(TraceStep {
                    effect,
                    result: result.clone(),
                });
            }
            resume = Resume::Result(result);
        }
    }

    /// One interpreter call under the step timeout, racing cancellation.
    /// Dropping the interpreter future on cancel releases whatever backend
    /// call it was awaiting.
    async fn dispatch(
        &self,
        effect: &Effect,
        interpreter: &CompositeInterpreter,
        ctx: &RunContext,
        program: &'static str,
        steps: usize,
    ) -> Result<EffectResult, RunError> {
        let limit = self.config.step_timeout();
        let call = AssertUnwindSafe(interpreter.interpret(effect, &ctx.effect)).catch_unwind();

        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(RunError::Cancelled { program, steps: steps - 1 }),
            outcome = tokio::time::timeout(limit, call) => match outcome {
                Ok(Ok(result)) => Ok(result),
                Ok(Err(panic)) => Err(RunError::InterpreterPanicked {
                    effect: effect.name(),
                    message: panic_message(panic.as_ref()),
                }),
                Err(_elapsed) => {
                    METRICS.inc_step_timeouts();
                    obs::emit_step_timeout(effect.name(), self.config.step_timeout_ms);
                    Ok(Err(Failure::timeout(effect.name(), self.config.step_timeout_ms)))
                }
            },
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Drive `program` against recorded results instead of an interpreter.
///
/// Pure: no I/O, no clock. Feeding the results of a recorded [`Trace`]
/// back in reproduces the same effects and the same outcome.
pub fn replay<P: Program>(
    mut program: P,
    results: impl IntoIterator<Item = EffectResult>,
) -> Result<Replayed<P::Output>, RunError> {
    let name = program.name();
    let mut results = results.into_iter();
    let mut effects = Vec::new();
    let mut resume = Resume::Start;

    loop {
        match program.resume(resume)? {
            Step::Yield(effect) => {
                effects.push(effect);
                resume = match results.next() {
                    Some(result) => Resume::Result(result),
                    None => {
                        return Err(RunError::TraceExhausted {
                            program: name,
                            steps: effects.len() - 1,
                        })
                    }
                };
            }
            Step::Complete(value) => {
                return Ok(Replayed {
                    effects,
                    outcome: Ok(value),
                })
            }
            Step::Fail(failure) => {
                return Ok(Replayed {
                    effects,
                    outcome: Err(failure),
                })
            }
        }
    }
}
