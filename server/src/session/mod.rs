//! Session-scoped image and mask storage
//!
//! A session owns one uploaded image and the table of masks computed for
//! it. The `SessionStore` keeps sessions in memory and evicts them after a
//! fixed TTL from a background reaper task.

pub mod state;
pub mod store;

pub use state::{NewSession, Session, SessionConfig, SessionId, StoredMask};
pub use store::{SessionError, SessionStore};
