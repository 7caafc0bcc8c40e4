//! Normalized event types for one chat turn.
//!
//! A send is reported to the page as a sequence of [`NormalizedEvent`] values
//! encoded as Server-Sent Events. The page applies them to its own copy of the
//! message list, so the sequence fully describes every mutation the server
//! performs on the session during the turn.
//!
//! # Example
//!
//! ```rust
//! use cortexluma::normalized::{NormalizedEvent, sse_event};
//!
//! let event = NormalizedEvent::Loading { is_loading: true };
//! let sse = sse_event(&event);
//! assert!(sse.starts_with("event: loading\n"));
//! ```

use serde::{Deserialize, Serialize};

use crate::session::Message;

/// Events emitted while processing one user turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum NormalizedEvent {
    /// The turn was accepted.
    #[serde(rename = "stream.start")]
    StreamStart {
        /// Unique identifier for this request/response pair.
        request_id: String,
        /// Session the turn belongs to.
        session_id: String,
    },

    /// A message was appended to the end of the conversation.
    #[serde(rename = "message.append")]
    MessageAppended { message: Message },

    /// The text of the final message was replaced.
    #[serde(rename = "message.update")]
    MessageUpdated {
        /// Id of the message being rewritten.
        id: String,
        /// Full replacement text.
        text: String,
    },

    /// Loading indicator changed.
    #[serde(rename = "loading")]
    Loading { is_loading: bool },

    /// The turn failed; `message` is the banner text.
    #[serde(rename = "error")]
    Error {
        message: String,
        /// Error kind for programmatic handling.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },

    /// The turn is over.
    #[serde(rename = "done")]
    Done,
}

/// Convert a [`NormalizedEvent`] to an SSE-formatted string.
///
/// The output carries an `event:` line and a `data:` line with the JSON
/// payload.
pub fn sse_event(evt: &NormalizedEvent) -> String {
    let json = serde_json::to_string(evt).unwrap_or_else(|e| {
        serde_json::json!({ "type": "error", "data": { "message": e.to_string() } }).to_string()
    });

    format!("event: {}\ndata: {json}\n\n", event_name(evt))
}

/// Get the SSE event name for a [`NormalizedEvent`].
pub fn event_name(evt: &NormalizedEvent) -> &'static str {
    match evt {
        NormalizedEvent::StreamStart { .. } => "stream.start",
        NormalizedEvent::MessageAppended { .. } => "message.append",
        NormalizedEvent::MessageUpdated { .. } => "message.update",
        NormalizedEvent::Loading { .. } => "loading",
        NormalizedEvent::Error { .. } => "error",
        NormalizedEvent::Done => "done",
    }
}
