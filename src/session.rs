//! Session store
//!
//! Durable, expiring per-conversation memory. The orchestrator is stateless
//! between calls; everything it knows about a conversation lives in a
//! [`SessionRecord`] held by one of the backends here.

mod memory;
mod record;
mod redis;
mod store;

pub use memory::MemorySessionStore;
pub use record::{DialogueState, DoctorRef, SessionRecord};
pub use self::redis::RedisSessionStore;
pub use store::{SessionBackend, Sessions, StoreError, StoreResult};

use std::time::Duration;

/// Inactivity window after which a session is treated as expired.
pub const SESSION_TTL: Duration = Duration::from_secs(30 * 60);
