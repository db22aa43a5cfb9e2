//! Effect programs as explicit, resumable state machines.
//!
//! A program never performs I/O. The runner calls [`Program::resume`] with
//! [`Resume::Start`] once, then with the result of every effect the program
//! yielded, until the program returns [`Step::Complete`] or [`Step::Fail`].
//! Suspension happens only at a yield, so effects within one program are
//! issued strictly in order.

use thiserror::Error;

use crate::effect::{Effect, EffectResult};
use crate::failure::Failure;

/// Input to one resumption of a program.
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// First call; no effect has been issued yet
    Start,
    /// Result of the effect yielded by the previous step
    Result(EffectResult),
}

/// What a program asks for after being resumed.
#[derive(Debug, Clone, PartialEq)]
pub enum Step<T> {
    /// Interpret this effect and resume with its result
    Yield(Effect),
    /// Terminate with a final value
    Complete(T),
    /// Terminate with a typed business failure
    Fail(Failure),
}

/// A program broke its resumption contract, or was handed a value of the
/// wrong shape. Always a defect, never a business outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("{program}: resumed after it already terminated")]
    ResumedAfterTermination { program: &'static str },

    #[error("{program}: expected {expected}, was resumed with {found}")]
    UnexpectedResume {
        program: &'static str,
        expected: &'static str,
        found: String,
    },

    #[error("expected {expected} value, found {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },
}

impl ProtocolViolation {
    pub fn unexpected_resume(program: &'static str, expected: &'static str, got: &Resume) -> Self {
        let found = match got {
            Resume::Start => "start".to_string(),
            Resume::Result(Ok(value)) => format!("success({})", value.kind()),
            Resume::Result(Err(failure)) => format!("failure({})", failure.kind),
        };
        ProtocolViolation::UnexpectedResume {
            program,
            expected,
            found,
        }
    }
}

/// A unit of business logic expressed as a sequence of effects.
///
/// Implementations hold only their own state enum and the validated inputs
/// they were built from; replaying the same results always yields the same
/// effects and the same final step.
pub trait Program: Send {
    type Output: Send;

    /// Stable name, used in spans and log events.
    fn name(&self) -> &'static str;

    fn resume(&mut self, resume: Resume) -> Result<Step<Self::Output>, ProtocolViolation>;
}
