//! Conversation session and session storage.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::message::{Message, MessageId};
use crate::llm::ConversationContext;

/// Default session idle timeout (30 minutes).
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Errors raised by session operations.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SessionError {
    /// `update_last` was called on a session without messages.
    #[error("session has no messages")]
    Empty,
    /// A send is already outstanding on this session.
    #[error("a message is already being processed")]
    Busy,
}

/// Loading indicator and error banner of the last send.
#[derive(Debug, Default)]
struct TurnStatus {
    is_loading: bool,
    error: Option<String>,
}

/// Point-in-time snapshot of everything the page renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub id: String,
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// A single conversation session.
///
/// Messages are kept in display order. The only mutation besides appending is
/// the rewrite of the final message while a reply streams in.
#[derive(Debug)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
struct SessionInner {
    /// Unique session identifier.
    id: String,
    /// Conversation messages.
    messages: RwLock<Vec<Message>>,
    /// Loading and banner state.
    status: RwLock<TurnStatus>,
    /// Set while a send is outstanding.
    in_flight: AtomicBool,
    /// Model-side context, opened on the first send.
    context: Mutex<Option<ConversationContext>>,
    /// Last activity time.
    last_activity: RwLock<DateTime<Utc>>,
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl Session {
    /// Create a new session with the given ID.
    fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            inner: Arc::new(SessionInner {
                id,
                messages: RwLock::new(Vec::new()),
                status: RwLock::new(TurnStatus::default()),
                in_flight: AtomicBool::new(false),
                context: Mutex::new(None),
                last_activity: RwLock::new(now),
            }),
        }
    }

    /// Get the session ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Append a message to the end of the conversation.
    pub fn append(&self, message: Message) -> MessageId {
        let id = message.id.clone();
        write(&self.inner.messages).push(message);
        self.touch();
        id
    }

    /// Replace the text of the final message.
    pub fn update_last(&self, text: impl Into<String>) -> Result<(), SessionError> {
        let mut guard = write(&self.inner.messages);
        let last = guard.last_mut().ok_or(SessionError::Empty)?;
        last.text = text.into();
        drop(guard);
        self.touch();
        Ok(())
    }

    /// Get all messages in the conversation.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        read(&self.inner.messages).clone()
    }

    /// Get the final message, if any.
    #[must_use]
    pub fn last(&self) -> Option<Message> {
        read(&self.inner.messages).last().cloned()
    }

    /// Get the number of messages in the conversation.
    #[must_use]
    pub fn message_count(&self) -> usize {
        read(&self.inner.messages).len()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        read(&self.inner.status).is_loading
    }

    /// Banner text of the last failed send.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        read(&self.inner.status).error.clone()
    }

    /// Whether a send is outstanding.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Claim the session for one send.
    ///
    /// Sets the loading indicator and clears the banner. The claim is released
    /// when the returned guard is dropped.
    pub fn begin_send(&self) -> Result<SendGuard, SessionError> {
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::Busy);
        }

        {
            let mut status = write(&self.inner.status);
            status.is_loading = true;
            status.error = None;
        }
        self.touch();

        Ok(SendGuard {
            session: self.clone(),
        })
    }

    /// Model-side context, opened with `open` on first use.
    pub fn context_or_open(&self, open: impl FnOnce() -> ConversationContext) -> ConversationContext {
        self.inner
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert_with(open)
            .clone()
    }

    /// Whether the model-side context has been opened.
    #[must_use]
    pub fn has_context(&self) -> bool {
        self.inner
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Record a completed exchange in the model-side context.
    pub fn record_exchange(&self, user_text: &str, reply: &str) {
        if let Some(context) = self
            .inner
            .context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            context.record_exchange(user_text, reply);
        }
    }

    /// Snapshot of messages, loading indicator and banner.
    #[must_use]
    pub fn view(&self) -> SessionView {
        let messages = self.messages();
        let status = read(&self.inner.status);
        SessionView {
            id: self.inner.id.clone(),
            messages,
            is_loading: status.is_loading,
            error: status.error.clone(),
        }
    }

    /// Update the last activity timestamp.
    fn touch(&self) {
        *write(&self.inner.last_activity) = Utc::now();
    }

    /// Check if the session has been idle longer than `timeout`.
    #[must_use]
    pub fn is_expired_with_timeout(&self, timeout: Duration) -> bool {
        let last = *read(&self.inner.last_activity);
        (Utc::now() - last)
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }
}

/// Claim on a session for one outstanding send.
///
/// Dropping the guard clears the loading indicator and lets the next send in,
/// whether the turn finished, failed, or its response stream was abandoned.
#[derive(Debug)]
pub struct SendGuard {
    session: Session,
}

impl SendGuard {
    /// Show `banner` as the error of this send.
    pub fn set_error(&self, banner: impl Into<String>) {
        write(&self.session.inner.status).error = Some(banner.into());
    }
}

impl Drop for SendGuard {
    fn drop(&mut self) {
        write(&self.session.inner.status).is_loading = false;
        self.session.inner.in_flight.store(false, Ordering::Release);
        self.session.touch();
    }
}

/// Thread-safe store for sessions.
///
/// Provides methods for creating, retrieving, and cleaning up sessions.
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<SessionStoreInner>,
}

#[derive(Debug)]
struct SessionStoreInner {
    sessions: RwLock<HashMap<String, Session>>,
    welcome_message: Option<String>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a store whose sessions start empty.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Create a store whose sessions start with a greeting from the model.
    #[must_use]
    pub fn with_welcome_message(text: impl Into<String>) -> Self {
        Self::build(Some(text.into()))
    }

    fn build(welcome_message: Option<String>) -> Self {
        Self {
            inner: Arc::new(SessionStoreInner {
                sessions: RwLock::new(HashMap::new()),
                welcome_message,
            }),
        }
    }

    /// Create a new session and return it.
    #[must_use]
    pub fn create(&self) -> Session {
        let id = Uuid::new_v4().to_string();
        self.create_with_id(id)
    }

    /// Create a new session with a specific ID.
    #[must_use]
    pub fn create_with_id(&self, id: impl Into<String>) -> Session {
        let id = id.into();
        let session = Session::new(id.clone());
        if let Some(text) = &self.inner.welcome_message {
            session.append(Message::welcome(text.clone()));
        }
        write(&self.inner.sessions).insert(id, session.clone());
        session
    }

    /// Get a session by ID.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Session> {
        read(&self.inner.sessions).get(id).cloned()
    }

    /// Remove a session by ID.
    pub fn remove(&self, id: &str) -> Option<Session> {
        write(&self.inner.sessions).remove(id)
    }

    /// Get the number of active sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        read(&self.inner.sessions).len()
    }

    /// Check if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove idle sessions. Sessions with a send in flight are kept.
    ///
    /// Returns the number of sessions removed.
    pub fn cleanup_expired_with_timeout(&self, timeout: Duration) -> usize {
        let mut guard = write(&self.inner.sessions);
        let before = guard.len();
        guard.retain(|_, session| session.is_busy() || !session.is_expired_with_timeout(timeout));
        before - guard.len()
    }

    /// List all session IDs.
    #[must_use]
    pub fn list_ids(&self) -> Vec<String> {
        read(&self.inner.sessions).keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Sender, WELCOME_MESSAGE_ID};

    #[test]
    fn test_session_lifecycle() {
        let session = Session::new("test-123".to_string());

        assert_eq!(session.id(), "test-123");
        assert_eq!(session.message_count(), 0);

        session.append(Message::user("Hello"));
        assert_eq!(session.message_count(), 1);

        session.append(Message::model("Hi there!"));
        assert_eq!(session.message_count(), 2);

        let messages = session.messages();
        assert_eq!(messages[0].sender, Sender::User);
        assert_eq!(messages[1].sender, Sender::Model);
    }

    #[test]
    fn test_update_last_rewrites_final_message_only() {
        let session = Session::new("s".to_string());
        session.append(Message::user("Tell me a joke"));
        let id = session.append(Message::model("Why did "));

        session.update_last("Why did the chicken ").unwrap();

        let messages = session.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text, "Tell me a joke");
        assert_eq!(messages[1].id, id);
        assert_eq!(messages[1].text, "Why did the chicken ");
    }

    #[test]
    fn test_update_last_on_empty_session() {
        let session = Session::new("s".to_string());
        assert_eq!(session.update_last("x"), Err(SessionError::Empty));
    }

    #[test]
    fn test_send_guard_blocks_concurrent_sends() {
        let session = Session::new("s".to_string());

        let guard = session.begin_send().unwrap();
        assert!(session.is_busy());
        assert!(session.is_loading());
        assert_eq!(session.begin_send().unwrap_err(), SessionError::Busy);

        guard.set_error("An error occurred. Please try again.");
        drop(guard);

        assert!(!session.is_busy());
        assert!(!session.is_loading());
        assert!(session.error().is_some());

        // A new send clears the banner.
        let _guard = session.begin_send().unwrap();
        assert!(session.error().is_none());
    }

    #[test]
    fn test_context_is_opened_once() {
        let session = Session::new("s".to_string());
        assert!(!session.has_context());

        let first = session.context_or_open(|| ConversationContext::new(Some("p".to_string())));
        assert_eq!(first.system_instruction(), Some("p"));
        session.record_exchange("Hello", "Hi there!");

        let second = session.context_or_open(|| panic!("context must be reused"));
        assert_eq!(second.history().len(), 2);
    }

    #[test]
    fn test_view_is_a_pure_snapshot() {
        let store = SessionStore::with_welcome_message("Welcome");
        let session = store.create();

        let first = session.view();
        let second = session.view();
        assert_eq!(first, second);
        assert_eq!(session.message_count(), 1);
    }

    #[test]
    fn test_session_store() {
        let store = SessionStore::new();

        assert!(store.is_empty());

        let session = store.create();
        assert_eq!(store.len(), 1);
        assert_eq!(session.message_count(), 0);

        let retrieved = store.get(session.id()).unwrap();
        assert_eq!(retrieved.id(), session.id());

        store.remove(session.id());
        assert!(store.is_empty());
    }

    #[test]
    fn test_welcome_message_seeded() {
        let store = SessionStore::with_welcome_message("Welcome to CortexLuma.");
        let session = store.create();

        let messages = session.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id.as_str(), WELCOME_MESSAGE_ID);
        assert_eq!(messages[0].sender, Sender::Model);
    }

    #[test]
    fn test_cleanup_keeps_busy_sessions() {
        let store = SessionStore::new();
        let idle = store.create();
        let busy = store.create();
        let _guard = busy.begin_send().unwrap();

        let removed = store.cleanup_expired_with_timeout(Duration::ZERO);
        std::thread::sleep(Duration::from_millis(5));
        let removed = removed + store.cleanup_expired_with_timeout(Duration::ZERO);

        assert_eq!(removed, 1);
        assert!(store.get(idle.id()).is_none());
        assert!(store.get(busy.id()).is_some());
    }
}
