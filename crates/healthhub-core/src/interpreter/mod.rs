//! Effect interpreters.
//!
//! - [`HealthcareInterpreter`]: clinical reads and writes, each audited
//! - [`NotificationInterpreter`]: fire-and-forget publish and explicit audit
//! - [`CompositeInterpreter`]: routes an effect to the interpreter for its category
//!
//! Interpreters never let a backend error escape; every outcome is an
//! [`EffectResult`].

mod composite;
mod healthcare;
mod notification;

pub use composite::{AssemblyError, CompositeInterpreter, CompositeInterpreterBuilder};
pub use healthcare::HealthcareInterpreter;
pub use notification::NotificationInterpreter;

use async_trait::async_trait;

use crate::context::EffectContext;
use crate::effect::{Effect, EffectCategory, EffectResult};

/// Executes the effects of one category against a real backend.
///
/// Implementations are shared by every concurrent run and must be safe for
/// concurrent use.
#[async_trait]
pub trait EffectInterpreter: Send + Sync {
    fn category(&self) -> EffectCategory;

    async fn interpret(&self, effect: &Effect, ctx: &EffectContext) -> EffectResult;
}
