//! Per-client sliding-window rate limiting.
//!
//! Each client (usually an IP address string) owns a queue of the instants at
//! which its admitted requests arrived. A request is admitted while fewer than
//! `max_requests` of those instants fall inside the trailing window.
//!
//! The ledger is a [`DashMap`]: the prune, count and record steps for one
//! client all run while holding that client's shard lock, so two concurrent
//! requests from the same client can never both observe a free slot.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};
use crate::error::ConfigError;

/// Requests admitted per window when nothing is configured.
pub const DEFAULT_MAX_REQUESTS: u32 = 10;

/// Window length in seconds when nothing is configured.
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// A sliding-window request counter keyed by client identity.
pub struct RateLimiter<C: Clock = SystemClock> {
    ledger: DashMap<String, VecDeque<Instant>>,
    max_requests: usize,
    window: Duration,
    clock: C,
}

impl RateLimiter<SystemClock> {
    /// Creates a limiter admitting `max_requests` per `window_secs` per client.
    ///
    /// Both values must be non-zero; this is checked once, at startup.
    pub fn new(max_requests: u32, window_secs: u64) -> Result<Self, ConfigError> {
        Self::with_clock(max_requests, window_secs, SystemClock)
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(max_requests: u32, window_secs: u64, clock: C) -> Result<Self, ConfigError> {
        if max_requests == 0 {
            return Err(ConfigError::ZeroRateLimit);
        }
        if window_secs == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(Self {
            ledger: DashMap::new(),
            max_requests: max_requests as usize,
            window: Duration::from_secs(window_secs),
            clock,
        })
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Admits or rejects one request from `client`.
    ///
    /// Rejected requests are not recorded, so a client that keeps hammering
    /// regains access as soon as its oldest admitted request leaves the window.
    pub fn is_allowed(&self, client: &str) -> bool {
        let now = self.clock.now();
        let mut stamps = self.ledger.entry(client.to_owned()).or_default();

        prune(&mut stamps, now, self.window);

        if stamps.len() >= self.max_requests {
            return false;
        }
        stamps.push_back(now);
        true
    }

    /// Drops every client whose admitted requests have all left the window.
    ///
    /// Without this the ledger keeps one entry per distinct client for the
    /// life of the process. Returns the number of clients removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let before = self.ledger.len();
        self.ledger.retain(|_, stamps| {
            prune(stamps, now, self.window);
            !stamps.is_empty()
        });
        before.saturating_sub(self.ledger.len())
    }

    /// Number of clients currently holding a ledger entry.
    pub fn tracked_clients(&self) -> usize {
        self.ledger.len()
    }
}

/// Keeps only the instants in `(now - window, now]`. The queue is ordered
/// oldest first, so expired entries are always at the front.
fn prune(stamps: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&oldest) = stamps.front() {
        if now.saturating_duration_since(oldest) < window {
            break;
        }
        stamps.pop_front();
    }
}
