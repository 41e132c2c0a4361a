use thiserror::Error;

/// Errors surfaced by a realtime transport connection.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Establishing the connection failed (network, TLS, handshake).
    #[error("Connect failed: {0}")]
    Connect(String),

    /// The connection dropped while sending a frame.
    #[error("Connection closed")]
    Closed,
}
