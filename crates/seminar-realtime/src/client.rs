//! Channel orchestration with the tokio mpsc command/notification pattern.
//!
//! The channel event loop runs in a dedicated tokio task. External code
//! communicates with it through typed command and notification channels; the
//! loop owns the connection, re-subscribes joined topics after every
//! reconnect, and validates every inbound payload before it reaches the
//! application.

use std::collections::BTreeSet;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use seminar_shared::constants::DEGRADED_AFTER_ATTEMPTS;
use seminar_shared::protocol::{ChannelEvent, PRESENCE_TOPIC};
use seminar_shared::types::ChannelState;

use crate::channel::{ChannelCommand, ChannelNotification};
use crate::reconnect::RetryPolicy;
use crate::transport::{Connector, InboundFrame, OutboundFrame};

/// Configuration for spawning the channel task.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Rate limit between reconnect attempts.
    pub retry: RetryPolicy,
    /// Consecutive failed connects before `Degraded` is reported.
    pub degraded_after: u32,
    /// Command / notification queue depth.
    pub buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            degraded_after: DEGRADED_AFTER_ATTEMPTS,
            buffer: 256,
        }
    }
}

/// Spawn the realtime channel in a background tokio task.
///
/// Returns channels for sending commands and receiving notifications. The
/// task keeps reconnecting (rate-limited, indefinitely) until `Shutdown` is
/// received or all command senders are dropped.
pub fn spawn_channel<C: Connector>(
    connector: C,
    config: ChannelConfig,
) -> (
    mpsc::Sender<ChannelCommand>,
    mpsc::Receiver<ChannelNotification>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.buffer);
    let (notif_tx, notif_rx) = mpsc::channel(config.buffer);

    tokio::spawn(run_channel(connector, config, cmd_rx, notif_tx));

    (cmd_tx, notif_rx)
}

async fn run_channel<C: Connector>(
    mut connector: C,
    config: ChannelConfig,
    mut cmd_rx: mpsc::Receiver<ChannelCommand>,
    notif_tx: mpsc::Sender<ChannelNotification>,
) {
    // Presence rides a cohort-wide topic that every client subscribes to.
    let mut topics: BTreeSet<String> = BTreeSet::new();
    topics.insert(PRESENCE_TOPIC.to_string());

    let mut state = ChannelState::Disconnected;
    let mut attempts: u32 = 0;

    'outer: loop {
        // --- Connect, rate-limited, staying responsive to commands ---
        let mut conn = loop {
            match connector.connect().await {
                Ok(conn) => break conn,
                Err(e) => {
                    attempts += 1;
                    warn!(attempt = attempts, error = %e, "Realtime connect failed");

                    if attempts >= config.degraded_after && state != ChannelState::Degraded {
                        state = ChannelState::Degraded;
                        let _ = notif_tx
                            .send(ChannelNotification::StateChanged(state))
                            .await;
                    }

                    tokio::select! {
                        _ = tokio::time::sleep(config.retry.next_delay()) => {}
                        cmd = cmd_rx.recv() => match cmd {
                            Some(ChannelCommand::Join(room)) => {
                                topics.insert(room.to_topic());
                            }
                            Some(ChannelCommand::Leave(room)) => {
                                topics.remove(&room.to_topic());
                            }
                            Some(ChannelCommand::Publish { topic, .. }) => {
                                // Broadcasts are ephemeral; nothing to buffer.
                                debug!(topic = %topic, "Dropping broadcast while disconnected");
                            }
                            Some(ChannelCommand::Shutdown) | None => break 'outer,
                        },
                    }
                }
            }
        };
        attempts = 0;

        // --- Re-subscribe every joined topic on the fresh connection ---
        let mut alive = true;
        for topic in &topics {
            if conn
                .send(OutboundFrame::Subscribe {
                    topic: topic.clone(),
                })
                .await
                .is_err()
            {
                alive = false;
                break;
            }
        }
        if !alive {
            warn!("Connection lost during resubscribe");
            continue;
        }

        // Reported on every (re)connect so subscribers re-announce presence
        // after a drop, even one that never reached the degraded threshold.
        state = ChannelState::Connected;
        let _ = notif_tx
            .send(ChannelNotification::StateChanged(state))
            .await;
        info!(topics = topics.len(), "Realtime channel connected");

        // --- Serve until the connection or the command queue ends ---
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(ChannelCommand::Join(room)) => {
                        let topic = room.to_topic();
                        if topics.insert(topic.clone()) {
                            if conn.send(OutboundFrame::Subscribe { topic }).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(ChannelCommand::Leave(room)) => {
                        let topic = room.to_topic();
                        if topics.remove(&topic) {
                            if conn.send(OutboundFrame::Unsubscribe { topic }).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(ChannelCommand::Publish { topic, event }) => {
                        match ChannelEvent::Broadcast(event).to_value() {
                            Ok(payload) => {
                                if conn
                                    .send(OutboundFrame::Broadcast { topic, payload })
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Err(e) => error!(error = %e, "Failed to encode broadcast"),
                        }
                    }
                    Some(ChannelCommand::Shutdown) | None => break 'outer,
                },

                frame = conn.recv() => match frame {
                    Some(InboundFrame { topic, payload }) => {
                        match ChannelEvent::decode(&topic, &payload) {
                            Ok(event) => {
                                let _ = notif_tx.send(ChannelNotification::Event(event)).await;
                            }
                            Err(e) => {
                                debug!(
                                    topic = %topic,
                                    error = %e,
                                    "Ignoring unrecognized channel payload"
                                );
                            }
                        }
                    }
                    None => {
                        warn!("Realtime connection lost");
                        break;
                    }
                },
            }
        }
        // Fall through to reconnect.
    }

    let _ = notif_tx
        .send(ChannelNotification::StateChanged(ChannelState::Disconnected))
        .await;
    info!("Realtime channel loop terminated");
}
