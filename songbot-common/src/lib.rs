//! # songbot common library
//!
//! In-memory state and pure helpers shared by the bot service:
//! - Result types and identifiers
//! - Query cache (per-session, TTL + capacity bounded)
//! - Session store (active result set and page cursor per chat)
//! - Pager and keyboard layout
//! - Button action encoding
//! - Title cleanup helpers
//! - Configuration loading

pub mod action;
pub mod cache;
pub mod config;
pub mod error;
pub mod pager;
pub mod session;
pub mod title;
pub mod types;

pub use action::{Action, ActionError};
pub use cache::{CacheKey, QueryCache};
pub use error::{Error, Result};
pub use pager::{Button, Keyboard};
pub use session::{SessionStore, SessionView};
pub use types::{MessageId, ResultItem, ResultSet, SessionId};
