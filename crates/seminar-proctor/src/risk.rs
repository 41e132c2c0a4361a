//! Risk aggregation.

use serde::{Deserialize, Serialize};

use crate::models::{IntegrityViolation, Severity};

/// Aggregate classification of a session's violations. Ordered: within a
/// session the level only ever moves up.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Violation counts at which the aggregate risk escalates. These are
/// product-tuning values, kept as named fields rather than inline literals.
#[derive(Debug, Clone, Copy)]
pub struct RiskPolicy {
    /// High-severity violations that make a session high-risk outright.
    pub high_floor: usize,
    /// Repeated high-severity violations that also force high risk.
    pub high_repeat: usize,
    /// Medium-severity violations that make a session medium-risk outright.
    pub medium_floor: usize,
    /// Repeated medium-severity violations that escalate to medium.
    pub medium_repeat: usize,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self {
            high_floor: 1,
            high_repeat: 2,
            medium_floor: 1,
            medium_repeat: 3,
        }
    }
}

impl RiskPolicy {
    /// Classify a violation sequence. Counts only grow within a session, so
    /// the result is non-decreasing as violations accumulate.
    pub fn classify(&self, violations: &[IntegrityViolation]) -> RiskLevel {
        let high = violations
            .iter()
            .filter(|v| v.severity == Severity::High)
            .count();
        let medium = violations
            .iter()
            .filter(|v| v.severity == Severity::Medium)
            .count();

        if high >= self.high_floor || high >= self.high_repeat {
            RiskLevel::High
        } else if medium >= self.medium_floor || medium >= self.medium_repeat {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}
