use thiserror::Error;

/// Errors surfaced by the chat core.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Rejected before any network call: nothing to send.
    #[error("Message content is empty")]
    EmptyContent,

    /// Rejected before any network call: content exceeds the cap.
    #[error("Message content exceeds {limit} bytes")]
    ContentTooLarge { limit: usize },

    /// No valid identity; surfaced immediately, never retried.
    #[error("Not authenticated")]
    Unauthenticated,

    /// The write or fetch failed in a way that is worth retrying.
    #[error("Transient network failure: {0}")]
    Transient(String),

    /// The room worker is gone; the caller should re-join the room.
    #[error("Room subscription closed")]
    SubscriptionClosed,
}

impl ChatError {
    /// Whether the caller may resubmit the same payload.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Transient(_))
    }
}
