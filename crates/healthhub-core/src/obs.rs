//! Structured observability hooks for program runs.
//!
//! This module provides:
//! - Program-scoped tracing spans via [`program_span`]
//! - Emission functions for lifecycle events: start, effect dispatch,
//!   finish, and the infrastructure faults the interpreters absorb
//!
//! Lifecycle events go out at `info!`. Dropped notifications and timeouts
//! are `warn!`; a missing audit record is a compliance failure and is
//! always `error!`.

use healthhub_state::{ActorId, CorrelationId};
use tracing::{error, info, warn};

/// Program-scoped tracing span for one run.
///
/// Every event emitted inside it carries the program name and the
/// request's correlation id. Runs are async, so attach it with
/// `tracing::Instrument` rather than entering it.
///
/// # Example
///
/// ```ignore
/// drive(program).instrument(program_span("schedule_appointment", &correlation_id)).await
/// ```
pub fn program_span(program: &str, correlation_id: &CorrelationId) -> tracing::Span {
    tracing::info_span!(
        "healthhub.program",
        program = %program,
        correlation_id = %correlation_id,
    )
}

/// Emit event: program started on behalf of an actor.
pub fn emit_program_started(program: &str, correlation_id: &CorrelationId, actor: &ActorId) {
    info!(
        event = "program.started",
        program = %program,
        correlation_id = %correlation_id,
        actor = %actor,
    );
}

/// Emit event: one effect handed to the interpreter.
pub fn emit_effect_dispatched(program: &str, effect: &str, seq: usize) {
    info!(event = "effect.dispatched", program = %program, effect = %effect, seq = seq);
}

/// Emit event: program terminated. `outcome` is `"success"` or a failure
/// kind name.
pub fn emit_program_finished(program: &str, duration_ms: u64, steps: usize, outcome: &str) {
    info!(
        event = "program.finished",
        program = %program,
        duration_ms = duration_ms,
        steps = steps,
        outcome = %outcome,
    );
}

/// Emit event: a run ended without a program result (warning level).
pub fn emit_run_aborted(program: &str, error: &dyn std::fmt::Display) {
    warn!(event = "program.aborted", program = %program, error = %error);
}

/// Emit event: an interpreter call exceeded the step timeout.
pub fn emit_step_timeout(effect: &str, limit_ms: u64) {
    warn!(event = "effect.timeout", effect = %effect, limit_ms = limit_ms);
}

/// Emit event: a notification publish was rejected and dropped.
pub fn emit_notification_dropped(channel: &str, error: &dyn std::fmt::Display) {
    warn!(event = "notification.dropped", channel = %channel, error = %error);
}

/// Emit event: an audit record could not be persisted.
pub fn emit_audit_unavailable(
    action: &str,
    resource_type: &str,
    resource_id: &str,
    error: &dyn std::fmt::Display,
) {
    error!(
        event = "audit.unavailable",
        action = %action,
        resource_type = %resource_type,
        resource_id = %resource_id,
        error = %error,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_program_span_tags_events() {
        let cid = CorrelationId::new();
        let span = program_span("fetch_patient", &cid);
        span.in_scope(|| emit_effect_dispatched("fetch_patient", "get_patient_by_id", 1));
        assert!(logs_contain("effect.dispatched"));
        assert!(logs_contain(&cid.to_string()));
    }

    #[traced_test]
    #[test]
    fn test_audit_unavailable_is_error_level() {
        emit_audit_unavailable("get_patient", "patient", "p-1", &"connection refused");
        assert!(logs_contain("ERROR"));
        assert!(logs_contain("audit.unavailable"));
        assert!(logs_contain("connection refused"));
    }
}
