//! Per-connection task: handshake, queue flush, read/write loop, and
//! reconnect scheduling.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::protocol::{Frame, Role};
use crate::transport::Transport;

use super::{resolve_url, Shared, WriterHandle, STATE_CLOSED, STATE_CONNECTING, STATE_OPEN};

/// Begin a new connection attempt: advance the epoch (stranding every older
/// runner and timer), detach the previous writer (its runner closes the old
/// socket and exits), and spawn the runner for the new attempt.
pub(super) fn start(shared: Arc<Shared>, url: String) {
    let epoch = shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
    shared.writer.lock().unwrap().take();
    shared.set_state(STATE_CONNECTING);
    tokio::spawn(run(shared, epoch, url));
}

async fn run(shared: Arc<Shared>, epoch: u64, url: String) {
    if !shared.is_current(epoch) {
        return;
    }

    let mut transport = match shared.connector.connect(&url).await {
        Ok(transport) => transport,
        Err(e) => {
            if !shared.is_current(epoch) {
                return;
            }
            tracing::warn!(error = %e, "Connection attempt failed");
            handle_unexpected_close(&shared, epoch);
            return;
        }
    };

    // Install the writer channel, unless a newer connect or a disconnect won
    // the race while we were dialing.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    {
        let mut writer = shared.writer.lock().unwrap();
        if !shared.is_current(epoch) {
            drop(writer);
            let _ = transport.close().await;
            return;
        }
        *writer = Some(WriterHandle { epoch, tx });
    }

    shared.set_state(STATE_OPEN);
    shared.attempts.store(0, Ordering::SeqCst);
    shared.stats.connects.fetch_add(1, Ordering::Relaxed);
    tracing::info!(epoch, "Connected");

    let panics = shared.registry.notify_connection(true);
    shared
        .stats
        .listener_panics
        .fetch_add(panics as u64, Ordering::Relaxed);

    // Flush the pending queue, oldest first, before serving new writer
    // traffic. Sends issued during the flush land on the writer channel and
    // therefore transmit after every buffered message.
    for message in shared.queue.drain() {
        let frame = Frame::new(message.event_type, message.payload);
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(
                    message_id = %message.id,
                    event_type = %frame.event_type,
                    error = %e,
                    "Dropping unserializable buffered message"
                );
                continue;
            }
        };
        if let Err(e) = transport.send(text).await {
            tracing::warn!(error = %e, "Connection lost while flushing buffered messages");
            let _ = transport.close().await;
            handle_unexpected_close(&shared, epoch);
            return;
        }
        shared.stats.messages_flushed.fetch_add(1, Ordering::Relaxed);
    }

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(text) => {
                    if let Err(e) = transport.send(text).await {
                        tracing::warn!(error = %e, "Send failed; connection lost");
                        let _ = transport.close().await;
                        handle_unexpected_close(&shared, epoch);
                        return;
                    }
                }
                // Writer detached: explicit disconnect or a newer connect.
                None => {
                    let _ = transport.close().await;
                    return;
                }
            },
            inbound = transport.recv() => match inbound {
                Some(Ok(text)) => {
                    if !shared.is_current(epoch) {
                        let _ = transport.close().await;
                        return;
                    }
                    shared.stats.frames_received.fetch_add(1, Ordering::Relaxed);
                    match Frame::parse(&text) {
                        Ok(frame) => {
                            tracing::debug!(event_type = %frame.event_type, "Frame received");
                            let panics = shared.registry.dispatch(&frame);
                            shared
                                .stats
                                .listener_panics
                                .fetch_add(panics as u64, Ordering::Relaxed);
                        }
                        Err(e) => {
                            shared.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(error = %e, "Dropping malformed frame");
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "Receive failed; connection lost");
                    handle_unexpected_close(&shared, epoch);
                    return;
                }
                None => {
                    tracing::info!("Connection closed by peer");
                    handle_unexpected_close(&shared, epoch);
                    return;
                }
            },
        }
    }
}

/// Unexpected-close path: notify listeners once, then schedule a retry if
/// the policy still allows one. Stale epochs bail out first so an explicit
/// `disconnect` (or a replacement connect) never produces a notification or
/// a ghost retry.
fn handle_unexpected_close(shared: &Arc<Shared>, epoch: u64) {
    if !shared.is_current(epoch) {
        return;
    }

    shared.set_state(STATE_CLOSED);
    {
        let mut writer = shared.writer.lock().unwrap();
        if writer.as_ref().map(|w| w.epoch) == Some(epoch) {
            writer.take();
        }
    }

    shared.stats.disconnects.fetch_add(1, Ordering::Relaxed);
    let panics = shared.registry.notify_connection(false);
    shared
        .stats
        .listener_panics
        .fetch_add(panics as u64, Ordering::Relaxed);

    schedule_reconnect(shared, epoch);
}

fn schedule_reconnect(shared: &Arc<Shared>, epoch: u64) {
    let attempt = shared.attempts.load(Ordering::SeqCst) + 1;
    if !shared.policy.allows(attempt) {
        tracing::warn!(
            attempts = attempt - 1,
            "Reconnection attempts exhausted; waiting for manual connect"
        );
        return;
    }
    shared.attempts.store(attempt, Ordering::SeqCst);

    let delay = shared.policy.delay_for(attempt);
    shared
        .stats
        .reconnects_scheduled
        .fetch_add(1, Ordering::Relaxed);
    tracing::info!(
        attempt,
        max_attempts = shared.policy.max_attempts,
        delay_ms = delay.as_millis() as u64,
        "Reconnection scheduled"
    );

    let shared = shared.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if !shared.is_current(epoch) {
            tracing::debug!(epoch, "Discarding stale reconnect timer");
            return;
        }
        let role = match *shared.role.lock().unwrap() {
            Some(role) => role,
            None => return,
        };
        reconnect(shared, role).await;
    });
}

/// Automatic reconnect: re-resolve the stored credentials and dial again.
/// Credential loss here ends automatic recovery; the owner must call
/// `connect` once the session is restored.
async fn reconnect(shared: Arc<Shared>, role: Role) {
    let url = match resolve_url(&shared, role).await {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!(error = %e, "Reconnect aborted; credentials unavailable");
            return;
        }
    };

    tracing::info!(role = %role, "Reconnecting");
    start(shared, url);
}
