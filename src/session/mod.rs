//! Session and conversation state.
//!
//! Each browser page load opens one [`Session`]: an ordered list of
//! [`Message`] values plus the loading indicator, error banner and the
//! model-side conversation context. Sessions live in memory only.
//!
//! # Architecture
//!
//! - [`Message`]: One displayed turn, authored by the user or the model
//! - [`Session`]: A single conversation and its per-send state
//! - [`SessionStore`]: Thread-safe store for all active sessions
//!
//! # Example
//!
//! ```rust
//! use cortexluma::session::{Message, SessionStore};
//!
//! let store = SessionStore::with_welcome_message("Welcome!");
//! let session = store.create();
//! session.append(Message::user("Hello!"));
//!
//! let messages = session.messages();
//! assert_eq!(messages.len(), 2);
//! ```

mod message;
mod thread;

pub use message::{Message, MessageId, Sender, WELCOME_MESSAGE_ID};
pub use thread::{
    DEFAULT_SESSION_TIMEOUT, SendGuard, Session, SessionError, SessionStore, SessionView,
};
