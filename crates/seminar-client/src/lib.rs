//! # seminar-client
//!
//! The embedding surface of the Seminar realtime core. The host application
//! provides an authenticated [`Identity`](seminar_shared::Identity) and a
//! realtime [`Connector`](seminar_realtime::Connector), then drives
//! everything through a [`SeminarClient`] and the [`ClientEvent`] stream:
//!
//! ```no_run
//! # async fn demo() {
//! use std::sync::Arc;
//! use seminar_client::{connect, ApiClient, ClientConfig};
//! use seminar_realtime::MemoryConnector;
//! use seminar_shared::{Identity, Role, UserId};
//! use uuid::Uuid;
//!
//! seminar_client::init_tracing();
//!
//! let identity = Identity::new(
//!     UserId(Uuid::new_v4()),
//!     "Ada",
//!     "ada@example.edu",
//!     Role::Student,
//! );
//! let config = ClientConfig::from_env();
//! let api = Arc::new(ApiClient::new(config.api_url.clone(), config.api_token.clone()));
//! let (connector, _sessions) = MemoryConnector::new();
//!
//! let (client, mut events) = connect(identity, config, connector, api);
//! # let _ = (client, events.recv().await);
//! # }
//! ```
//!
//! Quiz monitoring is independent of the chat wiring: build a
//! [`SessionMonitor`](seminar_proctor::SessionMonitor), feed it browser
//! events, and hand the stopped session to
//! [`SeminarClient::submit_quiz_session`].

pub mod api;
pub mod client;
pub mod config;
pub mod events;

mod bridge;

pub use api::{ApiClient, ApiError, ViolationSink};
pub use client::{connect, SeminarClient};
pub use config::ClientConfig;
pub use events::ClientEvent;

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise structured logging. `RUST_LOG` overrides the defaults.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("seminar_client=debug,seminar_realtime=debug,seminar_chat=info,seminar_proctor=info,warn")
    });

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
