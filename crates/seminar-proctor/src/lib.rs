//! # seminar-proctor
//!
//! Academic-integrity monitoring for quiz attempts. A [`SessionMonitor`]
//! classifies browser events into violation records with a deterministic
//! table, accumulates a risk level that never decreases within a session,
//! and yields the session summary on stop. Whether a session gets flagged is
//! a staff-side decision; the monitor only supplies the evidence.

pub mod models;
pub mod monitor;
pub mod risk;

mod error;

pub use error::MonitorError;
pub use models::{IntegrityViolation, QuizSession, SessionStatus, Severity, ViolationKind};
pub use monitor::{BrowserEvent, Disposition, KeyChord, SessionMonitor};
pub use risk::{RiskLevel, RiskPolicy};
