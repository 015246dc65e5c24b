//! Pending-message queue for deferred delivery.
//!
//! Messages sent while no open connection exists are buffered here and
//! flushed in FIFO order immediately after the next successful open. The
//! queue is unbounded by default; a size cap (drop-oldest) and a
//! time-to-live can be configured.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Configuration for the pending-message queue.
#[derive(Debug, Clone, Default)]
pub struct QueueConfig {
    /// Maximum number of buffered messages. `None` = unbounded.
    pub max_size: Option<usize>,
    /// Time-to-live for buffered messages in seconds. `None` = no expiry.
    pub message_ttl_seconds: Option<u64>,
}

/// A message buffered while offline.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    /// Unique id for log correlation.
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub queued_at: DateTime<Utc>,
}

impl PendingMessage {
    fn new(event_type: String, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            payload,
            queued_at: Utc::now(),
        }
    }

    /// Check whether the message has outlived the given TTL.
    pub fn is_expired(&self, ttl_seconds: u64) -> bool {
        let age = Utc::now().signed_duration_since(self.queued_at);
        age.num_seconds() >= ttl_seconds as i64
    }
}

/// FIFO buffer of messages awaiting a connection.
pub struct PendingQueue {
    messages: Mutex<VecDeque<PendingMessage>>,
    config: QueueConfig,
}

impl PendingQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Buffer a message. If a size cap is configured and reached, the oldest
    /// entry is dropped to make room.
    pub fn push(&self, event_type: impl Into<String>, payload: serde_json::Value) {
        let message = PendingMessage::new(event_type.into(), payload);
        let mut messages = self.messages.lock().unwrap();

        if let Some(max) = self.config.max_size {
            while messages.len() >= max {
                if let Some(dropped) = messages.pop_front() {
                    tracing::debug!(
                        dropped_id = %dropped.id,
                        event_type = %dropped.event_type,
                        queue_size = messages.len(),
                        "Dropped oldest message from full pending queue"
                    );
                }
            }
        }

        tracing::debug!(
            message_id = %message.id,
            event_type = %message.event_type,
            queue_size = messages.len() + 1,
            "Message queued while offline"
        );
        messages.push_back(message);
    }

    /// Remove and return every buffered message in insertion order,
    /// discarding entries that exceeded the configured TTL. The queue is
    /// empty afterwards.
    pub fn drain(&self) -> Vec<PendingMessage> {
        let drained: Vec<PendingMessage> = {
            let mut messages = self.messages.lock().unwrap();
            messages.drain(..).collect()
        };

        let Some(ttl) = self.config.message_ttl_seconds else {
            return drained;
        };

        let total = drained.len();
        let fresh: Vec<PendingMessage> = drained
            .into_iter()
            .filter(|m| {
                let expired = m.is_expired(ttl);
                if expired {
                    tracing::debug!(
                        message_id = %m.id,
                        event_type = %m.event_type,
                        queued_at = %m.queued_at,
                        "Discarding expired pending message"
                    );
                }
                !expired
            })
            .collect();

        if fresh.len() < total {
            tracing::info!(
                expired = total - fresh.len(),
                remaining = fresh.len(),
                "Expired messages dropped during queue drain"
            );
        }
        fresh
    }

    pub fn len(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().unwrap().is_empty()
    }

    /// Discard every buffered message.
    pub fn clear(&self) {
        self.messages.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_drain_preserves_fifo_order() {
        let queue = PendingQueue::new(QueueConfig::default());
        for n in 0..5 {
            queue.push("ping", json!({ "n": n }));
        }

        let drained = queue.drain();
        assert_eq!(drained.len(), 5);
        for (n, message) in drained.iter().enumerate() {
            assert_eq!(message.payload, json!({ "n": n }));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_unbounded_by_default() {
        let queue = PendingQueue::new(QueueConfig::default());
        for _ in 0..1_000 {
            queue.push("subscribe", json!({}));
        }
        assert_eq!(queue.len(), 1_000);
    }

    #[test]
    fn test_cap_drops_oldest() {
        let queue = PendingQueue::new(QueueConfig {
            max_size: Some(3),
            message_ttl_seconds: None,
        });
        for n in 0..5 {
            queue.push("ping", json!({ "n": n }));
        }

        let drained = queue.drain();
        assert_eq!(drained.len(), 3);
        // The two oldest entries were dropped on push.
        assert_eq!(drained[0].payload, json!({ "n": 2 }));
        assert_eq!(drained[2].payload, json!({ "n": 4 }));
    }

    #[test]
    fn test_ttl_discards_at_drain() {
        let queue = PendingQueue::new(QueueConfig {
            max_size: None,
            message_ttl_seconds: Some(0),
        });
        queue.push("ping", json!({}));
        // TTL of zero expires everything immediately.
        assert!(queue.drain().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_clear() {
        let queue = PendingQueue::new(QueueConfig::default());
        queue.push("ping", json!({}));
        queue.push("ping", json!({}));
        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());
    }
}
