//! # seminar-shared
//!
//! Domain types shared by every Seminar crate: identifiers, the
//! authenticated identity handed in by the host application, the tagged
//! union of realtime channel events, and the tunable constants for
//! heartbeats, debounce windows and dedup horizons.

pub mod constants;
pub mod identity;
pub mod protocol;
pub mod types;

mod error;

pub use error::ProtocolError;
pub use identity::{Identity, Role};
pub use types::*;
