//! In-process notification transport built on `tokio::sync::broadcast`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::{NotificationBus, NotificationMessage, StorageResult};

/// Default per-channel buffer. Slow subscribers that fall further behind
/// than this lose the oldest messages.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Channel-keyed broadcast bus. One `broadcast::Sender` per channel name,
/// created on first subscribe and dropped by the first publish that finds
/// no live receiver left.
#[derive(Debug)]
pub struct BroadcastNotificationBus {
    channels: Mutex<HashMap<String, broadcast::Sender<NotificationMessage>>>,
    capacity: usize,
}

impl Default for BroadcastNotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl BroadcastNotificationBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn channels(
        &self,
    ) -> StorageResult<MutexGuard<'_, HashMap<String, broadcast::Sender<NotificationMessage>>>>
    {
        self.channels
            .lock()
            .map_err(|_| StorageError::Unavailable("notification bus lock poisoned".into()))
    }
}

#[async_trait]
impl NotificationBus for BroadcastNotificationBus {
    async fn publish(&self, message: NotificationMessage) -> StorageResult<usize> {
        let channel = message.channel.clone();
        let recipients = {
            let mut channels = self.channels()?;
            match channels.get(&channel) {
                Some(sender) if sender.receiver_count() > 0 => {
                    // Receivers can drop between the count and the send.
                    sender.send(message).unwrap_or(0)
                }
                Some(_) => {
                    channels.remove(&channel);
                    0
                }
                None => 0,
            }
        };
        debug!(channel = %channel, recipients, "notification published");
        Ok(recipients)
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> StorageResult<broadcast::Receiver<NotificationMessage>> {
        let mut channels = self.channels()?;
        Ok(channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(channel: &str) -> NotificationMessage {
        NotificationMessage {
            channel: channel.to_string(),
            message_type: "appointment_requested".to_string(),
            payload: serde_json::json!({"n": 1}),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_reaches_nobody() {
        let bus = BroadcastNotificationBus::default();
        let recipients = bus.publish(message("doctor:1")).await.unwrap();
        assert_eq!(recipients, 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_only_their_channel() {
        let bus = BroadcastNotificationBus::default();
        let mut doctor = bus.subscribe("doctor:1").await.unwrap();
        let mut patient = bus.subscribe("patient:1").await.unwrap();

        let recipients = bus.publish(message("doctor:1")).await.unwrap();
        assert_eq!(recipients, 1);

        let got = doctor.recv().await.unwrap();
        assert_eq!(got.channel, "doctor:1");
        assert!(patient.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_recipient_count_matches_live_subscribers() {
        let bus = BroadcastNotificationBus::default();
        let _a = bus.subscribe("c").await.unwrap();
        let b = bus.subscribe("c").await.unwrap();
        assert_eq!(bus.publish(message("c")).await.unwrap(), 2);

        drop(b);
        assert_eq!(bus.publish(message("c")).await.unwrap(), 1);
    }

    fn channel_count(bus: &BroadcastNotificationBus) -> usize {
        bus.channels.lock().unwrap().len()
    }

    #[tokio::test]
    async fn test_publish_to_unknown_channel_registers_nothing() {
        let bus = BroadcastNotificationBus::default();
        for n in 0..10 {
            bus.publish(message(&format!("patient:{n}"))).await.unwrap();
        }
        assert_eq!(channel_count(&bus), 0);
    }

    #[tokio::test]
    async fn test_channel_is_dropped_once_its_subscribers_leave() {
        let bus = BroadcastNotificationBus::default();
        let receiver = bus.subscribe("doctor:1").await.unwrap();
        assert_eq!(channel_count(&bus), 1);

        drop(receiver);
        assert_eq!(bus.publish(message("doctor:1")).await.unwrap(), 0);
        assert_eq!(channel_count(&bus), 0);

        // A later subscriber gets a fresh channel.
        let mut again = bus.subscribe("doctor:1").await.unwrap();
        assert_eq!(bus.publish(message("doctor:1")).await.unwrap(), 1);
        assert_eq!(again.recv().await.unwrap().channel, "doctor:1");
    }
}
