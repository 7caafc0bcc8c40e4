//! Chat controller.
//!
//! Applies one user turn to a [`Session`]: the user message is appended, the
//! transport is invoked, and the reply is written back either as one message
//! or incrementally while fragments arrive. Every store mutation is reported
//! as a [`NormalizedEvent`] so the page can mirror it.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use thiserror::Error;
use uuid::Uuid;

use crate::llm::{LlmError, Response, Transport};
use crate::normalized::NormalizedEvent;
use crate::session::{Message, MessageId, Session, SessionError};

/// User-facing text shown when a turn fails.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred. Please try again.";

/// Reasons a send is refused before anything is mutated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("message must not be empty")]
    EmptyMessage,
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("a message is already being processed")]
    Busy,
    #[error(transparent)]
    Session(SessionError),
}

impl From<SessionError> for ChatError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Busy => Self::Busy,
            SessionError::Empty => Self::Session(err),
        }
    }
}

/// Reject empty or whitespace-only input.
pub fn validate_message(text: &str) -> Result<&str, ChatError> {
    if text.trim().is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    Ok(text)
}

/// Runs user turns against the model transport.
#[derive(Debug, Clone)]
pub struct ChatService {
    transport: Arc<Transport>,
    append_error_message: bool,
}

impl ChatService {
    #[must_use]
    pub fn new(transport: Arc<Transport>) -> Self {
        Self {
            transport,
            append_error_message: true,
        }
    }

    /// Whether a failed turn also leaves a model message with the error text.
    #[must_use]
    pub fn with_append_error_message(mut self, enabled: bool) -> Self {
        self.append_error_message = enabled;
        self
    }

    /// Start one turn on `session`.
    ///
    /// Validation and the busy check happen before this returns, so a refused
    /// send leaves the session untouched. The turn itself runs as the returned
    /// stream is polled; dropping the stream ends the turn and releases the
    /// session.
    ///
    /// # Errors
    ///
    /// [`ChatError::EmptyMessage`] for blank input, [`ChatError::Busy`] when
    /// another send is outstanding on the session.
    pub fn submit(
        &self,
        session: &Session,
        text: &str,
    ) -> Result<impl Stream<Item = NormalizedEvent> + Send + 'static, ChatError> {
        let text = validate_message(text)?.to_string();
        let guard = session.begin_send()?;

        let session = session.clone();
        let transport = Arc::clone(&self.transport);
        let append_error_message = self.append_error_message;
        let request_id = Uuid::new_v4().to_string();

        tracing::info!(
            request_id = %request_id,
            session_id = %session.id(),
            message_length = text.len(),
            mode = ?transport.mode(),
            "Starting chat turn"
        );

        Ok(async_stream::stream! {
            let guard = guard;

            yield NormalizedEvent::StreamStart {
                request_id: request_id.clone(),
                session_id: session.id().to_string(),
            };

            let user = Message::user(text.clone());
            session.append(user.clone());
            yield NormalizedEvent::MessageAppended { message: user };
            yield NormalizedEvent::Loading { is_loading: true };

            let context = session.context_or_open(|| transport.open_context());

            // Model message written for this turn, if any.
            let mut reply: Option<MessageId> = None;
            let mut accumulated = String::new();
            let mut fragment_count = 0usize;

            let failure: Option<LlmError> = match transport.send(&context, &text).await {
                Ok(Response::Whole(full)) => {
                    let message = Message::model(full.clone());
                    reply = Some(session.append(message.clone()));
                    accumulated = full;
                    yield NormalizedEvent::MessageAppended { message };
                    None
                }
                Ok(Response::Stream(mut fragments)) => {
                    let mut failure = None;
                    while let Some(item) = fragments.next().await {
                        let fragment = match item {
                            Ok(fragment) => fragment,
                            Err(e) => {
                                failure = Some(e);
                                break;
                            }
                        };
                        if fragment.is_empty() {
                            continue;
                        }
                        fragment_count += 1;
                        accumulated.push_str(&fragment);

                        match &reply {
                            None => {
                                let message = Message::model(accumulated.clone());
                                reply = Some(session.append(message.clone()));
                                yield NormalizedEvent::MessageAppended { message };
                            }
                            Some(id) => {
                                if session.update_last(accumulated.clone()).is_ok() {
                                    yield NormalizedEvent::MessageUpdated {
                                        id: id.to_string(),
                                        text: accumulated.clone(),
                                    };
                                }
                            }
                        }
                    }

                    if failure.is_none() && reply.is_none() {
                        let message = Message::model(String::new());
                        reply = Some(session.append(message.clone()));
                        yield NormalizedEvent::MessageAppended { message };
                    }
                    failure
                }
                Err(e) => Some(e),
            };

            match failure {
                None => {
                    session.record_exchange(&text, &accumulated);
                    tracing::info!(
                        request_id = %request_id,
                        session_id = %session.id(),
                        fragment_count,
                        reply_length = accumulated.len(),
                        "Chat turn completed"
                    );
                }
                Some(err) => {
                    tracing::error!(
                        request_id = %request_id,
                        session_id = %session.id(),
                        kind = err.kind.code(),
                        error = %err,
                        fragment_count,
                        "Chat turn failed"
                    );

                    if append_error_message {
                        match &reply {
                            Some(id) => {
                                if session.update_last(GENERIC_ERROR_MESSAGE).is_ok() {
                                    yield NormalizedEvent::MessageUpdated {
                                        id: id.to_string(),
                                        text: GENERIC_ERROR_MESSAGE.to_string(),
                                    };
                                }
                            }
                            None => {
                                let message = Message::error(GENERIC_ERROR_MESSAGE);
                                session.append(message.clone());
                                yield NormalizedEvent::MessageAppended { message };
                            }
                        }
                    }

                    guard.set_error(GENERIC_ERROR_MESSAGE);
                    yield NormalizedEvent::Error {
                        message: GENERIC_ERROR_MESSAGE.to_string(),
                        code: Some(err.kind.code().to_string()),
                    };
                }
            }

            drop(guard);
            yield NormalizedEvent::Loading { is_loading: false };
            yield NormalizedEvent::Done;
        })
    }
}
