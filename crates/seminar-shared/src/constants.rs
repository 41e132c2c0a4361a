/// Presence heartbeat interval in seconds
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// A peer with no heartbeat for 2x the interval is shown offline
pub const PRESENCE_TIMEOUT_SECS: u64 = HEARTBEAT_INTERVAL_SECS * 2;

/// Trailing window for the typing indicator, in seconds
pub const TYPING_WINDOW_SECS: u64 = 3;

/// Page size served by the message read endpoint
pub const MESSAGE_PAGE_SIZE: u32 = 50;

/// Maximum message content size in bytes (8 KiB)
pub const MAX_CONTENT_SIZE: usize = 8_192;

/// How long a promoted correlation id is remembered for echo dedup, in seconds
pub const DEDUP_WINDOW_SECS: u64 = 60;

/// Fixed delay between realtime reconnect attempts, in seconds
pub const RECONNECT_DELAY_SECS: u64 = 5;

/// Random jitter added to each reconnect delay, in milliseconds
pub const RECONNECT_JITTER_MS: u64 = 750;

/// Consecutive failed reconnects before the channel reports itself degraded
pub const DEGRADED_AFTER_ATTEMPTS: u32 = 3;

/// Quiz session duration after which a time anomaly is recorded (1 hour)
pub const TIME_ANOMALY_THRESHOLD_SECS: i64 = 3_600;
