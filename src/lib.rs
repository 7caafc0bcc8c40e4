//! CortexLuma
//!
//! A single-page chat application that forwards user text to a hosted
//! generative-language model and renders the reply, whole or streamed, in a
//! scrollable conversation view.
//!
//! # Architecture
//!
//! - **Server**: Axum HTTP server with SSE streaming of each chat turn
//! - **Transport**: Model service drivers behind a whole/stream switch
//! - **Sessions**: In-memory conversation state per page load
//!
//! # Modules
//!
//! - [`chat`]: Turn protocol applied to a session
//! - [`config`]: Layered application configuration
//! - [`llm`]: Model service transport and drivers
//! - [`normalized`]: Streaming event model sent to the page
//! - [`pages`]: Server-rendered HTML
//! - [`server`]: Router, handlers and server startup
//! - [`session`]: Messages, sessions and the session store

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::unused_async)]

pub mod chat;
pub mod config;
pub mod llm;
pub mod normalized;
pub mod pages;
pub mod server;
pub mod session;

use std::sync::Arc;

use chat::ChatService;
use config::AppConfig;
use llm::Transport;
use session::SessionStore;

/// Application state shared across all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Chat controller driving the model transport.
    pub chat: ChatService,
    /// Session store for conversation management.
    pub sessions: SessionStore,
    /// Global Configuration
    pub config: Arc<AppConfig>,
    /// No API credential was found at startup; the page alerts on load.
    pub credential_missing: bool,
}

impl AppState {
    #[must_use]
    pub fn new(config: Arc<AppConfig>, transport: Arc<Transport>, credential_missing: bool) -> Self {
        let chat = ChatService::new(transport)
            .with_append_error_message(config.chat.append_error_message);
        let sessions = SessionStore::with_welcome_message(config.chat.welcome_message.clone());

        Self {
            chat,
            sessions,
            config,
            credential_missing,
        }
    }
}
