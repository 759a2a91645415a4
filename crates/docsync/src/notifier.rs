//! Change notification contracts.
//!
//! Notifications are published after the corresponding records are committed
//! to the model store. Delivery is best-effort: no acknowledgement, no replay
//! for late subscribers, FIFO per topic.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use tokio::sync::broadcast;
use tracing::debug;

/// Default per-topic buffer of a [`TopicHub`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 100;

/// Topic on which a user's document list changes are announced.
pub fn user_topic(username: &str) -> String {
    format!("user:{username}")
}

/// An event published on a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeEvent {
    /// The document list of a user changed.
    DocChange,
}

impl ChangeEvent {
    /// Wire payload of the event.
    pub fn payload(&self) -> Vec<u8> {
        match self {
            ChangeEvent::DocChange => br#"{"msgtype":"docchange"}"#.to_vec(),
        }
    }
}

/// Errors raised by a notifier.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notifier unavailable: {0}")]
    Unavailable(String),
}

/// A sink for change notifications.
pub trait ChangeNotifier: Send + Sync {
    /// Publish `payload` to everyone subscribed to `topic`.
    ///
    /// Publishing to a topic nobody listens on succeeds.
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), NotifyError>;
}

impl<T: ChangeNotifier + ?Sized> ChangeNotifier for std::sync::Arc<T> {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), NotifyError> {
        (**self).publish(topic, payload)
    }
}

/// A notifier that discards everything.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl ChangeNotifier for NullNotifier {
    fn publish(&self, _topic: &str, _payload: &[u8]) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// A notifier that records every publish for testing.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    published: Mutex<Vec<(String, Vec<u8>)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded `(topic, payload)` pairs.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.published.lock().expect("lock poisoned").clone()
    }

    /// Returns recorded payloads for one topic.
    pub fn payloads_for(&self, topic: &str) -> Vec<Vec<u8>> {
        self.published
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.published.lock().expect("lock poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.published.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChangeNotifier for RecordingNotifier {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), NotifyError> {
        self.published
            .lock()
            .map_err(|_| NotifyError::Unavailable("recording lock poisoned".to_string()))?
            .push((topic.to_string(), payload.to_vec()));
        Ok(())
    }
}

/// In-process pub/sub hub with one broadcast channel per topic.
#[derive(Debug)]
pub struct TopicHub {
    channels: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,
    capacity: usize,
}

impl TopicHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a hub whose topics buffer up to `capacity` undelivered payloads.
    ///
    /// Slow subscribers that fall further behind lose the oldest payloads.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to a topic. Only payloads published after this call are received.
    pub fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<Vec<u8>>, NotifyError> {
        let mut channels = self
            .channels
            .write()
            .map_err(|_| NotifyError::Unavailable("topic hub lock poisoned".to_string()))?;
        let sender = channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(sender.subscribe())
    }

    /// Number of live receivers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.channels
            .read()
            .ok()
            .and_then(|channels| channels.get(topic).map(|s| s.receiver_count()))
            .unwrap_or(0)
    }

    /// Drop channels that no longer have receivers.
    pub fn cleanup(&self) {
        if let Ok(mut channels) = self.channels.write() {
            channels.retain(|_, sender| sender.receiver_count() > 0);
        }
    }
}

impl Default for TopicHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier for TopicHub {
    fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), NotifyError> {
        let channels = self
            .channels
            .read()
            .map_err(|_| NotifyError::Unavailable("topic hub lock poisoned".to_string()))?;
        if let Some(sender) = channels.get(topic) {
            // Err only means every receiver is gone.
            let delivered = sender.send(payload.to_vec()).unwrap_or(0);
            debug!(topic = %topic, delivered, "published change");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docchange_payload() {
        let payload = ChangeEvent::DocChange.payload();
        let json: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(json, serde_json::json!({"msgtype": "docchange"}));
        assert_eq!(user_topic("alice"), "user:alice");
    }

    #[test]
    fn recording_notifier_records() {
        let notifier = RecordingNotifier::new();
        assert!(notifier.is_empty());
        notifier.publish("user:alice", b"one").unwrap();
        notifier.publish("user:bob", b"two").unwrap();
        assert_eq!(notifier.len(), 2);
        assert_eq!(notifier.payloads_for("user:alice"), vec![b"one".to_vec()]);
        notifier.clear();
        assert!(notifier.is_empty());
    }

    #[test]
    fn null_notifier_accepts_everything() {
        assert!(NullNotifier.publish("user:alice", b"x").is_ok());
    }

    #[test]
    fn hub_without_subscribers_is_ok() {
        let hub = TopicHub::new();
        assert!(hub.publish("user:nobody", b"x").is_ok());
        assert_eq!(hub.subscriber_count("user:nobody"), 0);
    }

    #[test]
    fn hub_delivers_in_order_to_each_subscriber() {
        let hub = TopicHub::new();
        let mut first = hub.subscribe("user:alice").unwrap();
        let mut second = hub.subscribe("user:alice").unwrap();
        let mut other = hub.subscribe("user:bob").unwrap();
        assert_eq!(hub.subscriber_count("user:alice"), 2);

        hub.publish("user:alice", b"1").unwrap();
        hub.publish("user:alice", b"2").unwrap();

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.try_recv().unwrap(), b"1".to_vec());
            assert_eq!(rx.try_recv().unwrap(), b"2".to_vec());
            assert!(rx.try_recv().is_err());
        }
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn late_subscribers_get_no_replay() {
        let hub = TopicHub::new();
        let _early = hub.subscribe("t").unwrap();
        hub.publish("t", b"before").unwrap();
        let mut late = hub.subscribe("t").unwrap();
        assert!(late.try_recv().is_err());
    }

    #[test]
    fn cleanup_drops_dead_topics() {
        let hub = TopicHub::new();
        let rx = hub.subscribe("t").unwrap();
        drop(rx);
        hub.cleanup();
        assert_eq!(hub.subscriber_count("t"), 0);
        assert!(hub.channels.read().unwrap().is_empty());
    }
}
