//! Realtime engine configuration.
//!
//! Tunables for the room registry, rate limiter, offline queue, and the
//! idle-connection sweeper.

use serde::Deserialize;

use super::error::ValidationError;

/// A single rate-limit rule: at most `limit` events per `window_secs`.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitRule {
    /// Maximum events allowed inside one window.
    pub limit: u32,
    /// Window duration in seconds.
    pub window_secs: u64,
}

impl RateLimitRule {
    /// Build a rule from limit and window.
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { limit, window_secs }
    }
}

/// Configuration for the realtime collaboration engine.
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Connection attempts per user.
    #[serde(default = "default_connection_rule")]
    pub connection_rule: RateLimitRule,

    /// Chat messages per user.
    #[serde(default = "default_message_rule")]
    pub message_rule: RateLimitRule,

    /// Typing start/stop events per user.
    #[serde(default = "default_typing_rule")]
    pub typing_rule: RateLimitRule,

    /// Cursor movements per user.
    #[serde(default = "default_cursor_rule")]
    pub cursor_rule: RateLimitRule,

    /// Collaborative plan updates per user.
    #[serde(default = "default_plan_update_rule")]
    pub plan_update_rule: RateLimitRule,

    /// Lock/unlock operations per user.
    #[serde(default = "default_lock_rule")]
    pub lock_rule: RateLimitRule,

    /// Total events per user in a trailing 60 s window, applied before
    /// any per-event rule.
    #[serde(default = "default_burst_limit")]
    pub burst_limit: u32,

    /// Messages retained per room (ring buffer).
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Queued offline messages retained per user (oldest dropped).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum chat message length in characters.
    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    /// Connections idle longer than this are swept.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Interval between idle sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl RealtimeConfig {
    /// Validate realtime configuration.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, rule) in [
            ("connection", self.connection_rule),
            ("message", self.message_rule),
            ("typing", self.typing_rule),
            ("cursor", self.cursor_rule),
            ("plan_update", self.plan_update_rule),
            ("lock", self.lock_rule),
        ] {
            if rule.limit == 0 || rule.window_secs == 0 {
                return Err(ValidationError::InvalidRateLimit(name));
            }
        }
        if self.idle_timeout_secs == 0 || self.sweep_interval_secs == 0 {
            return Err(ValidationError::InvalidIdleTimeout);
        }
        if self.queue_capacity == 0 {
            return Err(ValidationError::InvalidQueueCapacity);
        }
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            connection_rule: default_connection_rule(),
            message_rule: default_message_rule(),
            typing_rule: default_typing_rule(),
            cursor_rule: default_cursor_rule(),
            plan_update_rule: default_plan_update_rule(),
            lock_rule: default_lock_rule(),
            burst_limit: default_burst_limit(),
            history_capacity: default_history_capacity(),
            queue_capacity: default_queue_capacity(),
            max_message_chars: default_max_message_chars(),
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_connection_rule() -> RateLimitRule {
    RateLimitRule::new(10, 60)
}

fn default_message_rule() -> RateLimitRule {
    RateLimitRule::new(30, 60)
}

fn default_typing_rule() -> RateLimitRule {
    RateLimitRule::new(20, 60)
}

fn default_cursor_rule() -> RateLimitRule {
    RateLimitRule::new(100, 60)
}

fn default_plan_update_rule() -> RateLimitRule {
    RateLimitRule::new(50, 60)
}

fn default_lock_rule() -> RateLimitRule {
    RateLimitRule::new(30, 60)
}

fn default_burst_limit() -> u32 {
    300
}

fn default_history_capacity() -> usize {
    100
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_max_message_chars() -> usize {
    2000
}

fn default_idle_timeout_secs() -> u64 {
    30 * 60
}

fn default_sweep_interval_secs() -> u64 {
    60
}
