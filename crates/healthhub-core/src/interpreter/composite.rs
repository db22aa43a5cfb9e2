//! Category routing.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::EffectInterpreter;
use crate::context::EffectContext;
use crate::effect::{Effect, EffectCategory, EffectResult};

/// Interpreter assembly is checked once, at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    #[error("no interpreter registered for the {0} category")]
    MissingCategory(EffectCategory),

    #[error("more than one interpreter registered for the {0} category")]
    DuplicateCategory(EffectCategory),
}

#[derive(Default)]
pub struct CompositeInterpreterBuilder {
    healthcare: Option<Arc<dyn EffectInterpreter>>,
    notification: Option<Arc<dyn EffectInterpreter>>,
    duplicate: Option<EffectCategory>,
}

impl CompositeInterpreterBuilder {
    /// Register an interpreter under the category it reports.
    pub fn register(mut self, interpreter: Arc<dyn EffectInterpreter>) -> Self {
        let category = interpreter.category();
        let slot = match category {
            EffectCategory::Healthcare => &mut self.healthcare,
            EffectCategory::Notification => &mut self.notification,
        };
        if slot.is_some() {
            self.duplicate.get_or_insert(category);
        }
        *slot = Some(interpreter);
        self
    }

    pub fn build(self) -> Result<CompositeInterpreter, AssemblyError> {
        if let Some(category) = self.duplicate {
            return Err(AssemblyError::DuplicateCategory(category));
        }
        let healthcare = self
            .healthcare
            .ok_or(AssemblyError::MissingCategory(EffectCategory::Healthcare))?;
        let notification = self
            .notification
            .ok_or(AssemblyError::MissingCategory(EffectCategory::Notification))?;
        Ok(CompositeInterpreter {
            healthcare,
            notification,
        })
    }
}

/// Stateless router: one interpreter per category, fixed at assembly.
///
/// Returns the routed interpreter's result unchanged. No retries, caching
/// or reordering happen here.
#[derive(Clone)]
pub struct CompositeInterpreter {
    healthcare: Arc<dyn EffectInterpreter>,
    notification: Arc<dyn EffectInterpreter>,
}

impl CompositeInterpreter {
    pub fn builder() -> CompositeInterpreterBuilder {
        CompositeInterpreterBuilder::default()
    }

    fn route(&self, category: EffectCategory) -> &Arc<dyn EffectInterpreter> {
        match category {
            EffectCategory::Healthcare => &self.healthcare,
            EffectCategory::Notification => &self.notification,
        }
    }

    /// Route `effect` to the interpreter for its category.
    pub async fn interpret(&self, effect: &Effect, ctx: &EffectContext) -> EffectResult {
        let category = effect.category();
        debug!(effect = effect.name(), category = %category, "routing effect");
        self.route(category).interpret(effect, ctx).await
    }
}
