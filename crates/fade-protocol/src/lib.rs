//! FadeChat message lifecycle engine.
//!
//! Messages in one shared room are encrypted at rest under their own key,
//! live for an adaptive time-to-live that shrinks as their sender gets
//! chattier, and are pushed to every connected client both when they
//! arrive and when they fade.
//!
//! Components, leaf first:
//! - [`activity`]: per-sender sliding window of recent sends
//! - [`ttl`]: activity → lifetime
//! - [`crypto`]: per-message XChaCha20-Poly1305 envelopes, optional key sealing
//! - [`store`]: encrypted message records (memory or SQLite)
//! - [`scanner`]: expiry sweep
//! - [`hub`]: fan-out to live client channels
//! - [`room`]: the orchestrator tying them together
//!
//! ```no_run
//! use std::sync::Arc;
//! use fade_protocol::{ChatRoom, Identity, MemoryStore, RoomConfig};
//!
//! # async fn run() {
//! let room = ChatRoom::new(Arc::new(MemoryStore::new()), RoomConfig::new());
//! let handle = room.start();
//!
//! let alice = Identity::from("alice");
//! let mut tab = room.connect(&alice);
//! room.send(&alice, "hello").unwrap();
//! let _event = tab.recv().await;
//!
//! handle.shutdown().await;
//! # }
//! ```

pub mod activity;
pub mod config;
pub mod crypto;
pub mod error;
pub mod hub;
pub mod message;
pub mod protocol;
pub mod room;
pub mod scanner;
pub mod schedule;
pub mod store;
pub mod ttl;
pub mod types;

pub use activity::ActivityTracker;
pub use config::RoomConfig;
pub use crypto::{decrypt, encrypt, KeySealer, MasterKey, MessageKey};
pub use error::{CryptoError, FadeError, StorageError};
pub use hub::{BroadcastHub, ChannelId, PublishReport, Subscription};
pub use message::{ActiveMessage, StoredMessage};
pub use protocol::{ClientEvent, ServerEvent};
pub use room::{ChatRoom, RoomHandle};
pub use scanner::{ExpiryScanner, SweepReport};
pub use schedule::ScheduledTask;
pub use store::{MemoryStore, MessageStore, SqliteStore};
pub use ttl::{lifetime_secs, TtlPolicy};
pub use types::{now_ms, Clock, Identity, ManualClock, MessageId, SystemClock};
