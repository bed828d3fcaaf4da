//! Per-user, per-event-type rate limiting.
//!
//! Two independent gates, both of which must pass:
//!
//! 1. A **burst guard** capping total events per user in a trailing 60 s
//!    window, checked first.
//! 2. A **windowed counter** per (user, event type). Exceeding the limit
//!    blocks the key until the window fully elapses; a burst of requests
//!    at the boundary does not reset it early.
//!
//! State is kept in a sharded lock table so concurrent checks for the
//! same key serialize on one mutex and the count can never overshoot the
//! limit under races. Critical sections are short and never await.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::config::{RateLimitRule, RealtimeConfig};
use crate::domain::foundation::UserId;

const SHARD_COUNT: usize = 16;
const BURST_WINDOW: Duration = Duration::from_secs(60);

/// Event classes subject to independent rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connection,
    Message,
    Typing,
    Cursor,
    PlanUpdate,
    Lock,
}

impl EventKind {
    /// Returns the string representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connection => "connection",
            EventKind::Message => "message",
            EventKind::Typing => "typing",
            EventKind::Cursor => "cursor",
            EventKind::PlanUpdate => "plan_update",
            EventKind::Lock => "lock",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Denied; the client may retry after this many seconds.
    Limited { retry_after_secs: u64 },
}

impl RateDecision {
    /// Returns true if the event was allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

/// Counter state for one (user, event type) key.
#[derive(Debug)]
struct WindowState {
    count: u32,
    window_start: Instant,
    blocked_until: Option<Instant>,
}

impl WindowState {
    fn fresh(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            blocked_until: None,
        }
    }

    fn reset(&mut self, now: Instant) {
        self.count = 0;
        self.window_start = now;
        self.blocked_until = None;
    }
}

type WindowShard = Mutex<HashMap<(UserId, EventKind), WindowState>>;
type BurstShard = Mutex<HashMap<UserId, VecDeque<Instant>>>;

/// Sliding-window rate limiter keyed by (user, event type).
pub struct RateLimiter {
    rules: HashMap<EventKind, RateLimitRule>,
    burst_limit: u32,
    windows: Vec<WindowShard>,
    bursts: Vec<BurstShard>,
}

impl RateLimiter {
    /// Builds a limiter from the realtime configuration.
    pub fn new(config: &RealtimeConfig) -> Self {
        let rules = HashMap::from([
            (EventKind::Connection, config.connection_rule),
            (EventKind::Message, config.message_rule),
            (EventKind::Typing, config.typing_rule),
            (EventKind::Cursor, config.cursor_rule),
            (EventKind::PlanUpdate, config.plan_update_rule),
            (EventKind::Lock, config.lock_rule),
        ]);
        Self {
            rules,
            burst_limit: config.burst_limit,
            windows: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
            bursts: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    /// Checks the burst guard and the per-event window, consuming one
    /// event on success.
    pub fn check_and_consume(&self, user_id: &UserId, kind: EventKind) -> RateDecision {
        self.check_at(user_id, kind, Instant::now())
    }

    /// Clears all rate limit state for a user (admin/test operation).
    pub fn reset_user(&self, user_id: &UserId) {
        for shard in &self.windows {
            shard
                .lock()
                .expect("rate limiter window shard poisoned")
                .retain(|(uid, _), _| uid != user_id);
        }
        self.burst_shard(user_id)
            .lock()
            .expect("rate limiter burst shard poisoned")
            .remove(user_id);
    }

    fn check_at(&self, user_id: &UserId, kind: EventKind, now: Instant) -> RateDecision {
        if let RateDecision::Limited { retry_after_secs } = self.check_burst(user_id, now) {
            tracing::warn!(user_id = %user_id, "Burst guard tripped");
            return RateDecision::Limited { retry_after_secs };
        }
        self.check_window(user_id, kind, now)
    }

    /// Trailing-60 s cap on total events per user, independent of the
    /// per-event rules.
    fn check_burst(&self, user_id: &UserId, now: Instant) -> RateDecision {
        let mut shard = self
            .burst_shard(user_id)
            .lock()
            .expect("rate limiter burst shard poisoned");
        let events = shard.entry(user_id.clone()).or_default();

        while let Some(front) = events.front() {
            if now.duration_since(*front) >= BURST_WINDOW {
                events.pop_front();
            } else {
                break;
            }
        }

        if events.len() >= self.burst_limit as usize {
            let oldest = *events.front().expect("non-empty burst window");
            let retry = BURST_WINDOW.saturating_sub(now.duration_since(oldest));
            return RateDecision::Limited {
                retry_after_secs: retry.as_secs().max(1),
            };
        }

        events.push_back(now);
        RateDecision::Allowed
    }

    fn check_window(&self, user_id: &UserId, kind: EventKind, now: Instant) -> RateDecision {
        let rule = self.rules[&kind];
        let window = Duration::from_secs(rule.window_secs);
        let key = (user_id.clone(), kind);

        let mut shard = self
            .window_shard(&key)
            .lock()
            .expect("rate limiter window shard poisoned");
        let state = shard
            .entry(key)
            .or_insert_with(|| WindowState::fresh(now));

        if let Some(blocked_until) = state.blocked_until {
            if now < blocked_until {
                return RateDecision::Limited {
                    retry_after_secs: secs_until(now, blocked_until),
                };
            }
        }

        if now.duration_since(state.window_start) >= window {
            state.reset(now);
        }

        state.count += 1;
        if state.count > rule.limit {
            // Block for the remainder of the window, not just this call.
            let blocked_until = state.window_start + window;
            state.blocked_until = Some(blocked_until);
            tracing::warn!(user_id = %user_id, event = %kind, "Rate limit exceeded");
            return RateDecision::Limited {
                retry_after_secs: secs_until(now, blocked_until),
            };
        }

        RateDecision::Allowed
    }

    fn window_shard(&self, key: &(UserId, EventKind)) -> &WindowShard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.windows[hasher.finish() as usize % SHARD_COUNT]
    }

    fn burst_shard(&self, user_id: &UserId) -> &BurstShard {
        let mut hasher = DefaultHasher::new();
        user_id.hash(&mut hasher);
        &self.bursts[hasher.finish() as usize % SHARD_COUNT]
    }
}

fn secs_until(now: Instant, deadline: Instant) -> u64 {
    let remaining = deadline.saturating_duration_since(now);
    // Round up so clients never retry a moment too early.
    let secs = remaining.as_secs();
    if remaining.subsec_nanos() > 0 {
        (secs + 1).max(1)
    } else {
        secs.max(1)
    }
}
