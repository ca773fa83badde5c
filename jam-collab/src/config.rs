use std::env;

use chrono::Duration;
use log::warn;

/// The configuration of the jam session system
#[derive(Debug, Clone)]
pub struct Config {
    /// How often a connected client is expected to send a heartbeat
    pub heartbeat_interval: Duration,
    /// How many consecutive intervals can be missed before a participant is inactive
    pub missed_heartbeats: u32,
    /// How long an inactive participant stays visible before it is removed
    pub retention: Duration,
    /// How long a session may go without an active participant before it ends
    pub grace_period: Duration,
    /// How long an ended session stays readable before it is evicted from memory
    pub archive_retention: Duration,
    /// How many codes are tried before session creation gives up
    pub max_code_attempts: usize,
    /// The maximum amount of pending items in a queue
    pub max_queue_len: usize,
    /// How many undelivered events a subscriber may hold before it is dropped as lagged
    pub subscriber_buffer: usize,
}

impl Config {
    /// The length of a session code
    pub const CODE_LENGTH: usize = 6;

    /// How long a participant can stay silent before it is marked inactive
    pub fn inactivity_timeout(&self) -> Duration {
        let missed = i32::try_from(self.missed_heartbeats.max(1)).unwrap_or(i32::MAX);

        self.heartbeat_interval
            .checked_mul(missed)
            .unwrap_or_else(Duration::max_value)
    }

    /// How often presence should be evaluated
    pub fn sweep_interval(&self) -> std::time::Duration {
        let minimum = std::time::Duration::from_millis(100);

        self.heartbeat_interval
            .to_std()
            .map(|x| x.max(minimum))
            .unwrap_or(minimum)
    }

    /// Returns the default config with any `JAM_*` environment overrides applied.
    /// Overrides that don't parse, or aren't positive, are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = positive(&lookup, "JAM_HEARTBEAT_INTERVAL_MS") {
            config.heartbeat_interval = Duration::milliseconds(ms);
        }
        if let Some(count) = positive(&lookup, "JAM_MISSED_HEARTBEATS") {
            config.missed_heartbeats = count;
        }
        if let Some(ms) = positive(&lookup, "JAM_RETENTION_MS") {
            config.retention = Duration::milliseconds(ms);
        }
        if let Some(ms) = positive(&lookup, "JAM_GRACE_PERIOD_MS") {
            config.grace_period = Duration::milliseconds(ms);
        }
        if let Some(ms) = positive(&lookup, "JAM_ARCHIVE_RETENTION_MS") {
            config.archive_retention = Duration::milliseconds(ms);
        }
        if let Some(attempts) = positive(&lookup, "JAM_MAX_CODE_ATTEMPTS") {
            config.max_code_attempts = attempts;
        }
        if let Some(length) = positive(&lookup, "JAM_MAX_QUEUE_LEN") {
            config.max_queue_len = length;
        }
        if let Some(size) = positive(&lookup, "JAM_SUBSCRIBER_BUFFER") {
            config.subscriber_buffer = size;
        }

        config
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::seconds(5),
            // A participant is inactive after 15 seconds of silence
            missed_heartbeats: 3,
            // Long enough to ride out a phone switching networks
            retention: Duration::minutes(2),
            grace_period: Duration::minutes(1),
            archive_retention: Duration::minutes(10),
            max_code_attempts: 16,
            max_queue_len: 500,
            subscriber_buffer: 1024,
        }
    }
}

/// Reads an override that must fit `T` and be above zero
fn positive<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: TryFrom<i64>,
{
    let raw = lookup(key)?;

    match raw.trim().parse::<i64>().ok().filter(|x| *x > 0) {
        Some(value) => match T::try_from(value) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring {}={:?}, it is out of range", key, raw);
                None
            }
        },
        None => {
            warn!("Ignoring {}={:?}, it must be a positive number", key, raw);
            None
        }
    }
}
