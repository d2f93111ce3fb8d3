//! Adaptive message lifetime.
//!
//! `lifetime = floor(max(1, BASE / (1 + recent / 10)))`: the more a sender
//! has posted in the last window, the faster their new messages fade.
//! Evaluated as `BASE * 10 / (10 + recent)` so it stays in integers.

/// Lifetime of a message from a sender with no recent activity (10 minutes).
pub const BASE_LIFETIME_SECS: u64 = 600;

/// No message ever lives less than this.
pub const MIN_LIFETIME_SECS: u64 = 1;

/// Lifetime in seconds for a sender with `recent` prior sends in-window.
pub fn lifetime_secs(recent: usize) -> u64 {
    TtlPolicy::default().lifetime(recent)
}

/// TTL policy with a tunable base lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    base_secs: u64,
}

impl TtlPolicy {
    pub fn new(base_secs: u64) -> Self {
        Self {
            base_secs: base_secs.max(MIN_LIFETIME_SECS),
        }
    }

    pub fn base_secs(&self) -> u64 {
        self.base_secs
    }

    /// Lifetime in seconds, never below [`MIN_LIFETIME_SECS`].
    pub fn lifetime(&self, recent: usize) -> u64 {
        let divisor = (recent as u64).saturating_add(10);
        (self.base_secs.saturating_mul(10) / divisor).max(MIN_LIFETIME_SECS)
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::new(BASE_LIFETIME_SECS)
    }
}
