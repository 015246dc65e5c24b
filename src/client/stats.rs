use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for the realtime client.
#[derive(Debug, Default)]
pub struct ClientStats {
    /// Successful opens.
    pub connects: AtomicU64,
    /// Unexpected closes (explicit `disconnect` is not counted).
    pub disconnects: AtomicU64,
    /// Reconnection timers scheduled.
    pub reconnects_scheduled: AtomicU64,
    /// Messages handed to an open connection.
    pub messages_sent: AtomicU64,
    /// Messages buffered while offline.
    pub messages_queued: AtomicU64,
    /// Buffered messages replayed after an open.
    pub messages_flushed: AtomicU64,
    /// Inbound text frames.
    pub frames_received: AtomicU64,
    /// Inbound frames dropped as malformed.
    pub decode_errors: AtomicU64,
    /// Listener callbacks that panicked.
    pub listener_panics: AtomicU64,
}

impl ClientStats {
    pub fn snapshot(&self) -> ClientStatsSnapshot {
        ClientStatsSnapshot {
            connects: self.connects.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_queued: self.messages_queued.load(Ordering::Relaxed),
            messages_flushed: self.messages_flushed.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            listener_panics: self.listener_panics.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`ClientStats`].
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatsSnapshot {
    pub connects: u64,
    pub disconnects: u64,
    pub reconnects_scheduled: u64,
    pub messages_sent: u64,
    pub messages_queued: u64,
    pub messages_flushed: u64,
    pub frames_received: u64,
    pub decode_errors: u64,
    pub listener_panics: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let stats = ClientStats::default();
        stats.connects.fetch_add(2, Ordering::Relaxed);
        stats.messages_queued.fetch_add(7, Ordering::Relaxed);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.connects, 2);
        assert_eq!(snapshot.messages_queued, 7);
        assert_eq!(snapshot.disconnects, 0);
    }
}
