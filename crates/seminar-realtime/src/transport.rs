//! Transport seam between the channel loop and the realtime service.
//!
//! The channel loop never touches a socket directly: a [`Connector`] hands it
//! a [`Conn`], a pair of framed mpsc halves. The host application supplies
//! the connector that bridges these frames to its websocket; the
//! [`MemoryConnector`] below is an in-process implementation used by tests
//! and local development.

use std::collections::VecDeque;
use std::future::Future;

use tokio::sync::mpsc;

use crate::error::TransportError;

/// A frame sent from the client to the realtime service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Broadcast { topic: String, payload: serde_json::Value },
}

/// A frame delivered by the realtime service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    pub topic: String,
    pub payload: serde_json::Value,
}

/// One established connection. Dropping either half ends it.
pub struct Conn {
    pub outbound: mpsc::Sender<OutboundFrame>,
    pub inbound: mpsc::Receiver<InboundFrame>,
}

impl Conn {
    pub async fn send(&self, frame: OutboundFrame) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed)
    }

    pub async fn recv(&mut self) -> Option<InboundFrame> {
        self.inbound.recv().await
    }
}

/// Dials the realtime service. Called again by the channel loop after every
/// connection loss, so implementations must be reusable.
pub trait Connector: Send + 'static {
    fn connect(&mut self) -> impl Future<Output = Result<Conn, TransportError>> + Send;
}

// ---------------------------------------------------------------------------
// In-memory transport
// ---------------------------------------------------------------------------

/// The service-side view of a [`MemoryConnector`] connection.
pub struct MemorySession {
    pub from_client: mpsc::Receiver<OutboundFrame>,
    pub to_client: mpsc::Sender<InboundFrame>,
}

/// In-process transport. Each successful `connect` yields a fresh
/// [`MemorySession`] on the session channel; the script front-loads
/// connection failures to exercise the reconnect path.
pub struct MemoryConnector {
    failures: VecDeque<TransportError>,
    sessions_tx: mpsc::UnboundedSender<MemorySession>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MemorySession>) {
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
        (
            Self {
                failures: VecDeque::new(),
                sessions_tx,
            },
            sessions_rx,
        )
    }

    /// Queue `n` connection failures before the next successful connect.
    pub fn fail_next(&mut self, n: usize) {
        for _ in 0..n {
            self.failures
                .push_back(TransportError::Connect("scripted failure".to_string()));
        }
    }
}

impl Connector for MemoryConnector {
    async fn connect(&mut self) -> Result<Conn, TransportError> {
        if let Some(err) = self.failures.pop_front() {
            return Err(err);
        }

        let (out_tx, out_rx) = mpsc::channel(64);
        let (in_tx, in_rx) = mpsc::channel(64);

        self.sessions_tx
            .send(MemorySession {
                from_client: out_rx,
                to_client: in_tx,
            })
            .map_err(|_| TransportError::Connect("session sink dropped".to_string()))?;

        Ok(Conn {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_connector_scripted_failures() {
        let (mut connector, mut sessions) = MemoryConnector::new();
        connector.fail_next(2);

        assert!(connector.connect().await.is_err());
        assert!(connector.connect().await.is_err());

        let conn = connector.connect().await.unwrap();
        let mut session = sessions.recv().await.unwrap();

        conn.send(OutboundFrame::Subscribe {
            topic: "room:x".to_string(),
        })
        .await
        .unwrap();

        assert_eq!(
            session.from_client.recv().await.unwrap(),
            OutboundFrame::Subscribe {
                topic: "room:x".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_conn_recv_none_after_session_drop() {
        let (mut connector, mut sessions) = MemoryConnector::new();
        let mut conn = connector.connect().await.unwrap();
        let session = sessions.recv().await.unwrap();

        drop(session);
        assert!(conn.recv().await.is_none());
    }
}
