//! Per-request context: who is acting, which request this is, and how to
//! cancel it.

use healthhub_state::{ActorId, CorrelationId};
use tokio::sync::watch;

/// Identity handed to interpreters with every effect. Audit records are
/// stamped from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectContext {
    pub actor: ActorId,
    pub correlation_id: CorrelationId,
}

impl EffectContext {
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor,
            correlation_id: CorrelationId::new(),
        }
    }
}

/// Caller side of a cancellation pair. Dropping it does not cancel.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Runner side of a cancellation pair.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A linked handle and signal.
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        CancelSignal { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the
    /// handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Everything the runner needs besides the program and interpreter.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub effect: EffectContext,
    pub cancel: CancelSignal,
}

impl RunContext {
    /// Fresh correlation id, not cancellable.
    pub fn new(actor: ActorId) -> Self {
        Self {
            effect: EffectContext::new(actor),
            cancel: CancelSignal::never(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.effect.correlation_id = correlation_id;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.effect.correlation_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_resolves_signal() {
        let (handle, signal) = CancelSignal::pair();
        assert!(!signal.is_cancelled());
        handle.cancel();
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_never_cancels() {
        let (handle, signal) = CancelSignal::pair();
        drop(handle);
        let waited = tokio::time::timeout(Duration::from_secs(60), signal.cancelled()).await;
        assert!(waited.is_err());
        assert!(!signal.is_cancelled());
    }
}
