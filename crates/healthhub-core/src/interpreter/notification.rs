//! Notification and audit interpreter.
//!
//! Two unrelated contracts share this interpreter. Publishing is
//! fire-and-forget: one attempt, and a rejected publish is logged and
//! counted but never escalated. Explicit audit events are durable: a failed
//! append is reported as `audit_unavailable` so the program stops.

use std::sync::Arc;

use async_trait::async_trait;
use healthhub_state::{AuditEntry, AuditLog, AuditOutcome, NotificationBus, NotificationMessage};
use tracing::debug;

use super::EffectInterpreter;
use crate::context::EffectContext;
use crate::effect::{Effect, EffectCategory, EffectResult, EffectValue};
use crate::failure::Failure;
use crate::metrics::METRICS;
use crate::obs;

pub struct NotificationInterpreter {
    bus: Arc<dyn NotificationBus>,
    audit: Arc<dyn AuditLog>,
}

impl NotificationInterpreter {
    pub fn new(bus: Arc<dyn NotificationBus>, audit: Arc<dyn AuditLog>) -> Self {
        Self { bus, audit }
    }

    async fn publish(
        &self,
        channel: &str,
        message_type: &str,
        payload: &serde_json::Value,
    ) -> EffectResult {
        let message = NotificationMessage {
            channel: channel.to_string(),
            message_type: message_type.to_string(),
            payload: payload.clone(),
        };
        match self.bus.publish(message).await {
            Ok(recipients) => {
                debug!(channel = %channel, recipients = recipients, "notification published");
                Ok(EffectValue::Published { recipients })
            }
            Err(err) => {
                METRICS.inc_notifications_dropped();
                obs::emit_notification_dropped(channel, &err);
                Err(Failure::unavailable(format!(
                    "notification on {channel} not delivered: {err}"
                )))
            }
        }
    }

    async fn log_audit_event(
        &self,
        action: &str,
        resource_type: &str,
        resource_id: &str,
        metadata: &Option<serde_json::Value>,
        ctx: &EffectContext,
    ) -> EffectResult {
        let entry = AuditEntry {
            actor: ctx.actor.clone(),
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
            outcome: AuditOutcome::Success,
            correlation_id: ctx.correlation_id,
            metadata: metadata.clone(),
        };
        match self.audit.append(entry).await {
            Ok(record) => {
                METRICS.inc_audit_records();
                Ok(EffectValue::Audited(record))
            }
            Err(err) => {
                METRICS.inc_audit_failures();
                obs::emit_audit_unavailable(action, resource_type, resource_id, &err);
                Err(Failure::audit_unavailable(format!(
                    "audit event {action} on {resource_type} {resource_id} not persisted: {err}"
                )))
            }
        }
    }
}

#[async_trait]
impl EffectInterpreter for NotificationInterpreter {
    fn category(&self) -> EffectCategory {
        EffectCategory::Notification
    }

    async fn interpret(&self, effect: &Effect, ctx: &EffectContext) -> EffectResult {
        match effect {
            Effect::PublishWebSocketNotification {
                channel,
                message_type,
                payload,
            } => self.publish(channel, message_type, payload).await,
            Effect::LogAuditEvent {
                action,
                resource_type,
                resource_id,
                metadata,
            } => {
                self.log_audit_event(action, resource_type, resource_id, metadata, ctx)
                    .await
            }
            other => Err(Failure::validation(format!(
                "{} is not a notification effect",
                other.name()
            ))),
        }
    }
}
