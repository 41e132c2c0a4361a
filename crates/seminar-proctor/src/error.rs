use thiserror::Error;

/// Failure to arm the monitor's browser hooks. Never fatal: a monitor that
/// cannot install its listeners degrades to a no-op so the student can still
/// take the quiz.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Integrity hooks unavailable: {0}")]
    Install(String),
}
