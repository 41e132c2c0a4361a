//! The per-attempt session monitor.
//!
//! One monitor per quiz attempt, owned by the taking client. It stays in a
//! single active state until [`SessionMonitor::stop`] consumes it, so
//! nothing can record into a closed session. Classification is a fixed
//! table: the same raw event always yields the same violation kind and
//! severity, and always the same prevent-default decision.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use seminar_shared::constants::TIME_ANOMALY_THRESHOLD_SECS;
use seminar_shared::types::{QuizId, SessionId, UserId};

use crate::error::MonitorError;
use crate::models::{IntegrityViolation, QuizSession, SessionStatus, Severity, ViolationKind};
use crate::risk::{RiskLevel, RiskPolicy};

/// A keyboard combination as reported by the host's key handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChord {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub key: String,
}

impl KeyChord {
    /// Clipboard shortcuts, view-source, and the devtools family.
    fn is_disallowed(&self) -> bool {
        let key = self.key.to_ascii_lowercase();
        if self.ctrl && !self.shift && matches!(key.as_str(), "c" | "v" | "x" | "u") {
            return true;
        }
        if self.ctrl && self.shift && matches!(key.as_str(), "i" | "j" | "c") {
            return true;
        }
        key == "f12"
    }
}

/// Raw browser events the host forwards during an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserEvent {
    /// The quiz tab became hidden.
    VisibilityHidden,
    /// The quiz tab became visible again. Not a violation on its own.
    VisibilityVisible,
    Copy,
    Cut,
    Paste,
    Key(KeyChord),
    ContextMenu,
    /// Periodic check with no user action attached.
    Tick,
}

/// What the host must do with the event that was just recorded.
#[derive(Debug, Clone)]
pub struct Disposition {
    /// The violation recorded for this event, if any.
    pub violation: Option<IntegrityViolation>,
    /// Whether the underlying browser action must be cancelled.
    pub prevent_default: bool,
    /// Session risk after this event.
    pub risk: RiskLevel,
}

/// Monitors one quiz attempt from start to stop.
#[derive(Debug)]
pub struct SessionMonitor {
    session: QuizSession,
    policy: RiskPolicy,
    time_threshold: Duration,
    /// Threshold multiples already recorded as time anomalies.
    crossings_recorded: i64,
    /// False when listener installation failed and the monitor runs no-op.
    armed: bool,
}

impl SessionMonitor {
    /// Begin monitoring an attempt.
    pub fn start(quiz_id: QuizId, student_id: UserId, now: DateTime<Utc>) -> Self {
        Self::build(quiz_id, student_id, now, true)
    }

    /// Begin with the outcome of the host's listener installation. On
    /// failure the monitor degrades to a no-op: quiz-taking continues,
    /// nothing is surfaced to the student.
    pub fn start_with(
        quiz_id: QuizId,
        student_id: UserId,
        install: Result<(), MonitorError>,
        now: DateTime<Utc>,
    ) -> Self {
        let armed = match install {
            Ok(()) => true,
            Err(e) => {
                warn!(quiz = %quiz_id.0, error = %e, "Integrity hooks unavailable, monitoring disabled");
                false
            }
        };
        Self::build(quiz_id, student_id, now, armed)
    }

    fn build(quiz_id: QuizId, student_id: UserId, now: DateTime<Utc>, armed: bool) -> Self {
        Self {
            session: QuizSession {
                id: SessionId::new(),
                quiz_id,
                student_id,
                started_at: now,
                ended_at: None,
                violations: Vec::new(),
                status: SessionStatus::Active,
                risk: RiskLevel::Low,
            },
            policy: RiskPolicy::default(),
            time_threshold: Duration::seconds(TIME_ANOMALY_THRESHOLD_SECS),
            crossings_recorded: 0,
            armed,
        }
    }

    pub fn with_policy(mut self, policy: RiskPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn session_id(&self) -> SessionId {
        self.session.id
    }

    pub fn risk(&self) -> RiskLevel {
        self.session.risk
    }

    pub fn violations(&self) -> &[IntegrityViolation] {
        &self.session.violations
    }

    /// Classify and record one raw event, then recompute the session risk.
    pub fn record_event(&mut self, event: BrowserEvent, now: DateTime<Utc>) -> Disposition {
        if !self.armed {
            return Disposition {
                violation: None,
                prevent_default: false,
                risk: self.session.risk,
            };
        }

        let classified = classify(&event);
        let prevent_default = classified
            .as_ref()
            .map(|c| c.prevent_default)
            .unwrap_or(false);

        let mut recorded = None;
        if let Some(c) = classified {
            let violation = self.push_violation(c.kind, c.severity, c.description, now);
            recorded = Some(violation);
        }

        // Elapsed-time check runs on every recorded event, but each
        // threshold crossing is written at most once.
        let crossings = elapsed_crossings(self.session.started_at, now, self.time_threshold);
        while self.crossings_recorded < crossings {
            self.crossings_recorded += 1;
            let span = self.time_threshold * self.crossings_recorded as i32;
            let violation = self.push_violation(
                ViolationKind::TimeAnomaly,
                Severity::Low,
                format!("Session exceeded {} min", span.num_minutes()),
                now,
            );
            if recorded.is_none() {
                recorded = Some(violation);
            }
        }

        // Risk never decreases within a session.
        let computed = self.policy.classify(&self.session.violations);
        self.session.risk = self.session.risk.max(computed);

        Disposition {
            violation: recorded,
            prevent_default,
            risk: self.session.risk,
        }
    }

    /// Close the attempt. Consumes the monitor, so nothing can record into a
    /// completed session. Always yields a valid summary, even unarmed.
    pub fn stop(mut self, now: DateTime<Utc>) -> QuizSession {
        self.session.ended_at = Some(now);
        self.session.status = SessionStatus::Completed;
        debug!(
            session = %self.session.id.0,
            violations = self.session.violations.len(),
            risk = ?self.session.risk,
            "Quiz session closed"
        );
        self.session
    }

    fn push_violation(
        &mut self,
        kind: ViolationKind,
        severity: Severity,
        description: String,
        now: DateTime<Utc>,
    ) -> IntegrityViolation {
        let violation = IntegrityViolation {
            id: Uuid::new_v4(),
            session_id: self.session.id,
            kind,
            severity,
            description,
            timestamp: now,
        };
        self.session.violations.push(violation.clone());
        violation
    }
}

struct Classified {
    kind: ViolationKind,
    severity: Severity,
    description: String,
    prevent_default: bool,
}

/// The fixed event -> violation table.
fn classify(event: &BrowserEvent) -> Option<Classified> {
    match event {
        BrowserEvent::VisibilityHidden => Some(Classified {
            kind: ViolationKind::TabSwitch,
            severity: Severity::Medium,
            description: "Switched away from the quiz tab".to_string(),
            prevent_default: false,
        }),

        BrowserEvent::Copy | BrowserEvent::Cut | BrowserEvent::Paste => Some(Classified {
            kind: ViolationKind::CopyPaste,
            severity: Severity::High,
            description: "Clipboard access during quiz".to_string(),
            prevent_default: true,
        }),

        BrowserEvent::Key(chord) if chord.is_disallowed() => Some(Classified {
            kind: ViolationKind::SuspiciousActivity,
            severity: Severity::Medium,
            description: format!("Disallowed shortcut: {}", chord.key),
            prevent_default: true,
        }),

        BrowserEvent::ContextMenu => Some(Classified {
            kind: ViolationKind::SuspiciousActivity,
            severity: Severity::Low,
            description: "Context menu opened".to_string(),
            prevent_default: true,
        }),

        BrowserEvent::VisibilityVisible | BrowserEvent::Key(_) | BrowserEvent::Tick => None,
    }
}

fn elapsed_crossings(started_at: DateTime<Utc>, now: DateTime<Utc>, threshold: Duration) -> i64 {
    let elapsed = now.signed_duration_since(started_at);
    if elapsed < threshold {
        0
    } else {
        elapsed.num_seconds() / threshold.num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start_time() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn monitor() -> SessionMonitor {
        SessionMonitor::start(
            QuizId(Uuid::new_v4()),
            UserId(Uuid::new_v4()),
            start_time(),
        )
    }

    #[test]
    fn test_paste_classification_is_deterministic() {
        for _ in 0..3 {
            let mut m = monitor();
            let d = m.record_event(BrowserEvent::Paste, start_time());
            let v = d.violation.unwrap();
            assert_eq!(v.kind, ViolationKind::CopyPaste);
            assert_eq!(v.severity, Severity::High);
            assert!(d.prevent_default);
        }
    }

    #[test]
    fn test_tab_switch_is_medium_not_prevented() {
        let mut m = monitor();
        let d = m.record_event(BrowserEvent::VisibilityHidden, start_time());
        let v = d.violation.unwrap();
        assert_eq!(v.kind, ViolationKind::TabSwitch);
        assert_eq!(v.severity, Severity::Medium);
        assert!(!d.prevent_default);

        let back = m.record_event(BrowserEvent::VisibilityVisible, start_time());
        assert!(back.violation.is_none());
    }

    #[test]
    fn test_context_menu_low_and_prevented() {
        let mut m = monitor();
        let d = m.record_event(BrowserEvent::ContextMenu, start_time());
        let v = d.violation.unwrap();
        assert_eq!(v.kind, ViolationKind::SuspiciousActivity);
        assert_eq!(v.severity, Severity::Low);
        assert!(d.prevent_default);
    }

    #[test]
    fn test_devtools_chord_blocked_plain_typing_allowed() {
        let mut m = monitor();

        let devtools = BrowserEvent::Key(KeyChord {
            ctrl: true,
            shift: true,
            alt: false,
            key: "i".to_string(),
        });
        let d = m.record_event(devtools, start_time());
        assert_eq!(d.violation.unwrap().kind, ViolationKind::SuspiciousActivity);
        assert!(d.prevent_default);

        let typing = BrowserEvent::Key(KeyChord {
            ctrl: false,
            shift: false,
            alt: false,
            key: "a".to_string(),
        });
        let d = m.record_event(typing, start_time());
        assert!(d.violation.is_none());
        assert!(!d.prevent_default);
    }

    #[test]
    fn test_risk_escalates_and_never_decreases() {
        let mut m = monitor();
        assert_eq!(m.risk(), RiskLevel::Low);

        let d = m.record_event(BrowserEvent::VisibilityHidden, start_time());
        assert_eq!(d.risk, RiskLevel::Medium);

        let d = m.record_event(BrowserEvent::Paste, start_time());
        assert_eq!(d.risk, RiskLevel::High);
        let d = m.record_event(BrowserEvent::Copy, start_time());
        assert_eq!(d.risk, RiskLevel::High);

        // Harmless events afterwards cannot lower it.
        let d = m.record_event(BrowserEvent::VisibilityVisible, start_time());
        assert_eq!(d.risk, RiskLevel::High);
        let d = m.record_event(BrowserEvent::Tick, start_time());
        assert_eq!(d.risk, RiskLevel::High);
    }

    #[test]
    fn test_time_anomaly_once_per_crossing() {
        let mut m = monitor();
        let t0 = start_time();

        let d = m.record_event(BrowserEvent::Tick, t0 + Duration::minutes(30));
        assert!(d.violation.is_none());

        let d = m.record_event(BrowserEvent::Tick, t0 + Duration::minutes(61));
        let v = d.violation.unwrap();
        assert_eq!(v.kind, ViolationKind::TimeAnomaly);
        assert_eq!(v.severity, Severity::Low);

        // Same crossing, no second record.
        let d = m.record_event(BrowserEvent::Tick, t0 + Duration::minutes(70));
        assert!(d.violation.is_none());

        // Next crossing records again.
        let d = m.record_event(BrowserEvent::Tick, t0 + Duration::minutes(125));
        assert_eq!(d.violation.unwrap().kind, ViolationKind::TimeAnomaly);

        let anomalies = m
            .violations()
            .iter()
            .filter(|v| v.kind == ViolationKind::TimeAnomaly)
            .count();
        assert_eq!(anomalies, 2);
    }

    #[test]
    fn test_unarmed_monitor_is_noop_but_stop_is_valid() {
        let mut m = SessionMonitor::start_with(
            QuizId(Uuid::new_v4()),
            UserId(Uuid::new_v4()),
            Err(MonitorError::Install("visibility API missing".to_string())),
            start_time(),
        );

        let d = m.record_event(BrowserEvent::Paste, start_time());
        assert!(d.violation.is_none());
        assert!(!d.prevent_default);

        let session = m.stop(start_time() + Duration::minutes(10));
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.ended_at.is_some());
        assert!(session.violations.is_empty());
        assert_eq!(session.risk, RiskLevel::Low);
    }

    #[test]
    fn test_stop_closes_session_with_ordered_violations() {
        let mut m = monitor();
        let t0 = start_time();

        m.record_event(BrowserEvent::VisibilityHidden, t0 + Duration::minutes(1));
        m.record_event(BrowserEvent::Paste, t0 + Duration::minutes(2));
        m.record_event(BrowserEvent::Paste, t0 + Duration::minutes(3));

        let session = m.stop(t0 + Duration::minutes(4));
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.ended_at, Some(t0 + Duration::minutes(4)));
        assert_eq!(session.risk, RiskLevel::High);

        let kinds: Vec<ViolationKind> = session.violations.iter().map(|v| v.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ViolationKind::TabSwitch,
                ViolationKind::CopyPaste,
                ViolationKind::CopyPaste
            ]
        );
    }

    #[test]
    fn test_example_scenario_low_medium_high() {
        // 1 tab switch (medium) then 2 copy/paste (high): low -> medium ->
        // high, and high for the remainder.
        let mut m = monitor();
        assert_eq!(m.risk(), RiskLevel::Low);
        assert_eq!(
            m.record_event(BrowserEvent::VisibilityHidden, start_time()).risk,
            RiskLevel::Medium
        );
        assert_eq!(
            m.record_event(BrowserEvent::Copy, start_time()).risk,
            RiskLevel::High
        );
        assert_eq!(
            m.record_event(BrowserEvent::Paste, start_time()).risk,
            RiskLevel::High
        );
        assert_eq!(m.stop(start_time()).risk, RiskLevel::High);
    }
}
