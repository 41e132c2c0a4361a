// Realtime pub/sub layer over the hosted backend's channel service.

pub mod channel;
pub mod client;
pub mod reconnect;
pub mod transport;

mod error;

pub use channel::{join_room, leave_room, publish_broadcast, ChannelCommand, ChannelNotification};
pub use client::{spawn_channel, ChannelConfig};
pub use error::TransportError;
pub use reconnect::RetryPolicy;
pub use transport::{Conn, Connector, InboundFrame, MemoryConnector, MemorySession, OutboundFrame};
