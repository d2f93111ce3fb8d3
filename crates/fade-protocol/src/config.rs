use std::time::Duration;

use crate::activity::{DEFAULT_ACTIVITY_WINDOW, DEFAULT_PRUNE_INTERVAL};
use crate::crypto::{KeySealer, MasterKey};
use crate::hub::DEFAULT_SUBSCRIBER_BUFFER;
use crate::protocol::DEFAULT_MAX_MESSAGE_CHARS;
use crate::ttl::TtlPolicy;

/// Environment variable holding a base64 master key for key sealing.
pub const MASTER_KEY_ENV: &str = "FADECHAT_MASTER_KEY";

/// Default expiry sweep cadence.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration for a [`ChatRoom`](crate::ChatRoom).
///
/// All fields have sensible defaults. Use the builder pattern:
///
/// ```rust
/// use std::time::Duration;
/// use fade_protocol::{RoomConfig, TtlPolicy};
///
/// let config = RoomConfig::new()
///     .ttl_policy(TtlPolicy::new(300))
///     .sweep_interval(Duration::from_millis(500));
/// ```
#[derive(Debug, Clone)]
pub struct RoomConfig {
    pub(crate) ttl_policy: TtlPolicy,
    /// Trailing window for the activity count.
    pub(crate) activity_window: Duration,
    /// How often the expiry scanner runs.
    pub(crate) sweep_interval: Duration,
    /// How often stale activity windows are dropped.
    pub(crate) activity_prune_interval: Duration,
    /// Queue capacity per connected channel.
    pub(crate) subscriber_buffer: usize,
    /// Longest accepted chat text, in characters.
    pub(crate) max_message_chars: usize,
    /// Seals per-message keys at rest when set.
    pub(crate) master_key: Option<MasterKey>,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomConfig {
    /// Create a new config with defaults.
    ///
    /// If `FADECHAT_MASTER_KEY` is set to a base64 32-byte key, stored
    /// message keys are sealed under it. Override with [`.master_key()`].
    ///
    /// [`.master_key()`]: RoomConfig::master_key
    pub fn new() -> Self {
        let master_key = std::env::var(MASTER_KEY_ENV)
            .ok()
            .and_then(|s| match MasterKey::from_base64(&s) {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring {MASTER_KEY_ENV}");
                    None
                }
            });

        Self {
            ttl_policy: TtlPolicy::default(),
            activity_window: DEFAULT_ACTIVITY_WINDOW,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            activity_prune_interval: DEFAULT_PRUNE_INTERVAL,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            max_message_chars: DEFAULT_MAX_MESSAGE_CHARS,
            master_key,
        }
    }

    /// Set the TTL policy (default: 600 s base).
    pub fn ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = policy;
        self
    }

    /// Set the activity window (default: 5 minutes).
    pub fn activity_window(mut self, window: Duration) -> Self {
        self.activity_window = window;
        self
    }

    /// Set the expiry sweep interval (default: 1 s).
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Set the activity janitor interval (default: 60 s).
    pub fn activity_prune_interval(mut self, interval: Duration) -> Self {
        self.activity_prune_interval = interval;
        self
    }

    /// Set the per-channel queue capacity (default: 256).
    pub fn subscriber_buffer(mut self, capacity: usize) -> Self {
        self.subscriber_buffer = capacity;
        self
    }

    /// Set the chat text limit (default: 4000 characters).
    pub fn max_message_chars(mut self, chars: usize) -> Self {
        self.max_message_chars = chars;
        self
    }

    /// Seal stored keys under `key`.
    pub fn master_key(mut self, key: MasterKey) -> Self {
        self.master_key = Some(key);
        self
    }

    /// Store keys in plain form, even if the environment set a master key.
    pub fn without_master_key(mut self) -> Self {
        self.master_key = None;
        self
    }

    pub(crate) fn key_sealer(&self) -> KeySealer {
        self.master_key
            .as_ref()
            .map(KeySealer::with_master_key)
            .unwrap_or_default()
    }
}
