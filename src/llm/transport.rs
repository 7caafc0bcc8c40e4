//! Conversation transport.
//!
//! The transport sends one user turn per call to the model service and hands
//! back either the whole reply or its fragment stream. It performs a single
//! attempt: no retries, no timeout.
//!
//! # Example
//!
//! ```rust,ignore
//! use cortexluma::llm::{Transport, TransportMode};
//!
//! let transport = Transport::new(settings, TransportMode::Stream, Some(persona));
//! let context = transport.open_context();
//! let reply = transport.send(&context, "Hello").await?;
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{
    ChatCompletionsDriver, FragmentStream, GeminiDriver, LlmDriver, LlmError, LlmProtocol,
    LlmRequest, LlmSettings, Turn,
};

/// How replies are delivered to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Fragments are delivered as they arrive.
    #[default]
    Stream,
    /// The reply is awaited in full.
    Whole,
}

impl TransportMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Whole => "whole",
        }
    }
}

impl std::str::FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "stream" | "streaming" => Ok(Self::Stream),
            "whole" | "complete" => Ok(Self::Whole),
            other => Err(format!("unknown chat mode: {other}")),
        }
    }
}

/// Reply to one user turn.
pub enum Response {
    /// The full reply text.
    Whole(String),
    /// Fragments that concatenate, in receipt order, to the full reply.
    Stream(FragmentStream),
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Whole(text) => f.debug_tuple("Whole").field(text).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Model-side state of one conversation.
///
/// Opened once per session on its first send and reused afterwards. Only
/// completed exchanges are recorded; a failed turn leaves it untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationContext {
    system_instruction: Option<String>,
    history: Vec<Turn>,
}

impl ConversationContext {
    #[must_use]
    pub fn new(system_instruction: Option<String>) -> Self {
        Self {
            system_instruction,
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn system_instruction(&self) -> Option<&str> {
        self.system_instruction.as_deref()
    }

    #[must_use]
    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    /// Build the request for a new user turn on top of the recorded history.
    #[must_use]
    pub fn request_for(&self, user_text: &str) -> LlmRequest {
        let mut turns = self.history.clone();
        turns.push(Turn::user(user_text));
        LlmRequest {
            system_instruction: self.system_instruction.clone(),
            turns,
        }
    }

    /// Record a completed exchange.
    pub fn record_exchange(&mut self, user_text: impl Into<String>, reply: impl Into<String>) {
        self.history.push(Turn::user(user_text));
        self.history.push(Turn::model(reply));
    }
}

/// Sends user turns to the model service through an [`LlmDriver`].
#[derive(Clone)]
pub struct Transport {
    driver: Arc<dyn LlmDriver>,
    mode: TransportMode,
    system_instruction: Option<String>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("mode", &self.mode)
            .field("system_instruction", &self.system_instruction)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a transport speaking the protocol selected by `settings`.
    #[must_use]
    pub fn new(
        settings: LlmSettings,
        mode: TransportMode,
        system_instruction: Option<String>,
    ) -> Self {
        let driver: Arc<dyn LlmDriver> = match settings.effective_protocol() {
            LlmProtocol::Chat => Arc::new(ChatCompletionsDriver::new(settings)),
            LlmProtocol::Gemini | LlmProtocol::Auto => Arc::new(GeminiDriver::new(settings)),
        };
        Self::with_driver(driver, mode, system_instruction)
    }

    /// Create a transport around an explicit driver.
    #[must_use]
    pub fn with_driver(
        driver: Arc<dyn LlmDriver>,
        mode: TransportMode,
        system_instruction: Option<String>,
    ) -> Self {
        Self {
            driver,
            mode,
            system_instruction,
        }
    }

    #[must_use]
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Open a fresh conversation context carrying the system instruction.
    #[must_use]
    pub fn open_context(&self) -> ConversationContext {
        ConversationContext::new(self.system_instruction.clone())
    }

    /// Send one user turn.
    ///
    /// # Errors
    ///
    /// Returns the driver error when the request cannot be sent or is
    /// rejected. In stream mode, later failures arrive through the stream.
    pub async fn send(
        &self,
        context: &ConversationContext,
        user_text: &str,
    ) -> Result<Response, LlmError> {
        let req = context.request_for(user_text);

        tracing::debug!(
            mode = ?self.mode,
            turn_count = req.turns.len(),
            "Sending user turn"
        );

        match self.mode {
            TransportMode::Stream => self.driver.stream(req).await.map(Response::Stream),
            TransportMode::Whole => self.driver.complete(req).await.map(Response::Whole),
        }
    }
}
