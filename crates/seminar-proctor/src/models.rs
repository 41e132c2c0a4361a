//! Violation and session records.
//!
//! Every struct derives `Serialize` so the summary can be posted to the
//! violation persistence endpoint as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use seminar_shared::types::{QuizId, SessionId, UserId};

use crate::risk::RiskLevel;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    TabSwitch,
    CopyPaste,
    TimeAnomaly,
    SuspiciousActivity,
}

/// Severity of a single violation. Ordered so aggregation can compare.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// One classified instance of suspicious behavior. Append-only: never
/// mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityViolation {
    pub id: Uuid,
    pub session_id: SessionId,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
    /// Applied by staff review downstream, never by the client monitor.
    Flagged,
}

/// A monitored quiz attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizSession {
    pub id: SessionId,
    pub quiz_id: QuizId,
    pub student_id: UserId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub violations: Vec<IntegrityViolation>,
    pub status: SessionStatus,
    pub risk: RiskLevel,
}
