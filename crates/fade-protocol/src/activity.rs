/// Per-sender activity windows feeding the TTL policy.
///
/// Each identity keeps the timestamps of its sends within the trailing
/// window (5 minutes by default). Windows live in a sharded map, so two
/// senders never contend on the same lock.
///
/// Pure in-memory state. The room drives `prune` from a scheduled task to
/// drop windows of senders that went quiet.
use std::collections::VecDeque;
use std::time::Duration;

use dashmap::DashMap;

use crate::types::Identity;

/// Default trailing window (5 minutes).
pub const DEFAULT_ACTIVITY_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Default janitor cadence (60 seconds).
pub const DEFAULT_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Sliding-window send counter, one window per identity.
pub struct ActivityTracker {
    windows: DashMap<Identity, VecDeque<u64>>,
    window_ms: u64,
}

impl ActivityTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            window_ms: window.as_millis() as u64,
        }
    }

    /// Record a send at `now` and return how many *earlier* sends by the
    /// same identity are still inside the window.
    ///
    /// The returned count excludes the send being recorded, so a sender's
    /// 11th message in five minutes sees 10.
    pub fn record_and_count(&self, identity: &Identity, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.window_ms);
        let mut window = self.windows.entry(identity.clone()).or_default();

        while window.front().is_some_and(|&ts| ts < cutoff) {
            window.pop_front();
        }
        let prior = window.len();

        // Keep the deque sorted even if callers hand us a slightly stale `now`.
        let pos = window.partition_point(|&ts| ts <= now);
        window.insert(pos, now);

        prior
    }

    /// Number of sends by `identity` inside the window ending at `now`.
    pub fn window_len(&self, identity: &Identity, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.window_ms);
        self.windows
            .get(identity)
            .map(|w| w.iter().filter(|&&ts| ts >= cutoff).count())
            .unwrap_or(0)
    }

    /// Drop stale timestamps and remove identities left with empty windows.
    ///
    /// Returns the number of identities removed.
    pub fn prune(&self, now: u64) -> usize {
        let cutoff = now.saturating_sub(self.window_ms);
        let before = self.windows.len();
        self.windows.retain(|_, window| {
            while window.front().is_some_and(|&ts| ts < cutoff) {
                window.pop_front();
            }
            !window.is_empty()
        });
        before.saturating_sub(self.windows.len())
    }

    /// Number of identities currently holding a window.
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_WINDOW)
    }
}
