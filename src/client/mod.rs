//! The connection manager.
//!
//! One [`RealtimeClient`] owns one WebSocket connection for one user role.
//! Construction is cheap and establishes nothing; `connect` loads the stored
//! credentials, dials, and from then on the client survives unexpected
//! closes by reconnecting with exponential backoff. Messages sent while
//! offline are buffered and flushed, oldest first, on the next open.
//!
//! Every connection attempt advances an epoch counter, and every spawned
//! task and timer carries the epoch it was created under; a task whose epoch
//! is no longer current discards itself. This is what keeps a reconnect
//! timer that fires after `disconnect` (or after a newer `connect`) from
//! resurrecting a dead session.

mod runner;
mod stats;

pub use stats::{ClientStats, ClientStatsSnapshot};

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::backoff::ReconnectPolicy;
use crate::config::Settings;
use crate::credentials::{load_session, CredentialStore};
use crate::dispatch::{ListenerRegistry, Subscription};
use crate::protocol::{Frame, Role};
use crate::queue::PendingQueue;
use crate::transport::ws::WsConnector;
use crate::transport::{endpoint_url, Connector};

/// Readiness of the managed connection, mirroring the usual socket
/// enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

// Internal state-machine encoding; IDLE means no socket has been requested
// (or the client was fully torn down).
const STATE_IDLE: u8 = 0;
const STATE_CONNECTING: u8 = 1;
const STATE_OPEN: u8 = 2;
const STATE_CLOSING: u8 = 3;
const STATE_CLOSED: u8 = 4;

/// Sender half of the writer channel, tagged with the epoch that created it
/// so a stale runner can never remove its successor's writer.
pub(crate) struct WriterHandle {
    pub(crate) epoch: u64,
    pub(crate) tx: mpsc::UnboundedSender<String>,
}

/// State shared between the client handle, connection runners, and timers.
pub(crate) struct Shared {
    pub(crate) endpoint_url: String,
    pub(crate) policy: ReconnectPolicy,
    pub(crate) store: Arc<dyn CredentialStore>,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) registry: ListenerRegistry,
    pub(crate) queue: PendingQueue,
    pub(crate) state: AtomicU8,
    pub(crate) epoch: AtomicU64,
    pub(crate) attempts: AtomicU32,
    pub(crate) role: Mutex<Option<Role>>,
    pub(crate) writer: Mutex<Option<WriterHandle>>,
    pub(crate) stats: ClientStats,
}

impl Shared {
    pub(crate) fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub(crate) fn is_current(&self, epoch: u64) -> bool {
        self.current_epoch() == epoch
    }

    pub(crate) fn set_state(&self, state: u8) {
        self.state.store(state, Ordering::SeqCst);
    }
}

/// Load the stored session and build the connection URI for it. Shared by
/// manual connects and automatic reconnects (credentials may rotate between
/// attempts, so both paths re-read the store).
pub(crate) async fn resolve_url(shared: &Shared, role: Role) -> crate::error::Result<String> {
    let session = load_session(shared.store.as_ref()).await?;
    let url = endpoint_url(
        &shared.endpoint_url,
        role,
        &session.user_id,
        &session.token,
    )?;
    Ok(url)
}

/// Role-scoped, resilient publish/subscribe channel over one persistent
/// socket.
///
/// Instances are independent: a customer-role client and a provider-role
/// client share no state. The composition root that boots a user session
/// owns construction, `connect`, and `disconnect`.
pub struct RealtimeClient {
    shared: Arc<Shared>,
}

impl RealtimeClient {
    /// Build a client using the production WebSocket connector.
    pub fn new(settings: &Settings, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_connector(settings, store, Arc::new(WsConnector))
    }

    /// Build a client with a custom transport connector.
    pub fn with_connector(
        settings: &Settings,
        store: Arc<dyn CredentialStore>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                endpoint_url: settings.endpoint.url.clone(),
                policy: settings.reconnect_policy(),
                store,
                connector,
                registry: ListenerRegistry::new(),
                queue: PendingQueue::new(settings.queue_config()),
                state: AtomicU8::new(STATE_IDLE),
                epoch: AtomicU64::new(0),
                attempts: AtomicU32::new(0),
                role: Mutex::new(None),
                writer: Mutex::new(None),
                stats: ClientStats::default(),
            }),
        }
    }

    /// Open a connection for the given role.
    ///
    /// Returns `false` without touching any existing connection when the
    /// stored credentials are missing or unusable. Returns `true` once the
    /// attempt is initiated; the actual open (or failure) is reported later
    /// through the connection-state listeners.
    pub async fn connect(&self, role: Role) -> bool {
        let url = match resolve_url(&self.shared, role).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(role = %role, error = %e, "Cannot connect");
                return false;
            }
        };

        tracing::info!(role = %role, "Connecting");
        *self.shared.role.lock().unwrap() = Some(role);
        runner::start(self.shared.clone(), url);
        true
    }

    /// Send a message, or buffer it for later delivery.
    ///
    /// Returns `true` when the message was handed to an open connection in
    /// call order. Returns `false` when it was buffered instead (deferred
    /// delivery, not an error) or when serialization failed (logged).
    pub fn send(&self, event_type: &str, payload: serde_json::Value) -> bool {
        let writer_tx = {
            let writer = self.shared.writer.lock().unwrap();
            match writer.as_ref() {
                Some(w) if self.shared.state.load(Ordering::SeqCst) == STATE_OPEN => {
                    Some(w.tx.clone())
                }
                _ => None,
            }
        };

        let Some(tx) = writer_tx else {
            self.shared.queue.push(event_type, payload);
            self.shared.stats.messages_queued.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(event_type, "Not connected; message deferred");
            return false;
        };

        let frame = Frame::new(event_type, payload);
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(event_type, error = %e, "Failed to serialize outbound message");
                return false;
            }
        };

        if tx.send(text).is_err() {
            // The writer shut down between the state check and here; treat
            // it like any other offline send.
            self.shared.queue.push(frame.event_type, frame.data);
            self.shared.stats.messages_queued.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        self.shared.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Subscribe to an event type (or [`crate::protocol::events::WILDCARD`]).
    pub fn on(
        &self,
        event_type: impl Into<String>,
        callback: impl Fn(serde_json::Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.registry.on(event_type, callback)
    }

    /// Remove a previously registered event listener. Removing one that is
    /// already gone is a no-op.
    pub fn off(&self, subscription: Subscription) {
        subscription.cancel();
    }

    /// Subscribe to connectivity transitions (`true` = connected).
    pub fn on_connection_change(
        &self,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.registry.on_connection_change(callback)
    }

    /// Remove a connection-state listener.
    pub fn off_connection_change(&self, subscription: Subscription) {
        subscription.cancel();
    }

    /// Full teardown: close the socket, drop every listener and buffered
    /// message, reset the retry counter. The client behaves as freshly
    /// constructed afterwards; call [`connect`](Self::connect) to resume.
    pub fn disconnect(&self) {
        // Advancing the epoch makes every outstanding runner and reconnect
        // timer discard itself.
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        self.shared.set_state(STATE_CLOSING);
        self.shared.writer.lock().unwrap().take();
        self.shared.registry.clear();
        self.shared.queue.clear();
        self.shared.attempts.store(0, Ordering::SeqCst);
        *self.shared.role.lock().unwrap() = None;
        self.shared.set_state(STATE_IDLE);
        tracing::info!("Realtime client torn down");
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.load(Ordering::SeqCst) == STATE_OPEN
    }

    /// Current readiness, or `None` while idle (no socket requested, or
    /// after [`disconnect`](Self::disconnect)).
    pub fn ready_state(&self) -> Option<ReadyState> {
        match self.shared.state.load(Ordering::SeqCst) {
            STATE_CONNECTING => Some(ReadyState::Connecting),
            STATE_OPEN => Some(ReadyState::Open),
            STATE_CLOSING => Some(ReadyState::Closing),
            STATE_CLOSED => Some(ReadyState::Closed),
            _ => None,
        }
    }

    /// Number of messages waiting for the next open.
    pub fn pending_count(&self) -> usize {
        self.shared.queue.len()
    }

    pub fn stats(&self) -> ClientStatsSnapshot {
        self.shared.stats.snapshot()
    }
}
