//! Conversation transport and model service drivers.
//!
//! This module hides whether the hosted model answers with a whole string or
//! with a sequence of incremental text fragments.
//!
//! # Overview
//!
//! The [`LlmDriver`] trait defines the streaming interface every model
//! service implementation supports. The [`Transport`] builds on top of a
//! driver and decides, per configuration, whether a turn is delivered whole
//! or as a fragment stream.
//!
//! # Drivers
//!
//! - [`GeminiDriver`]: Google Generative Language API (`:streamGenerateContent`)
//! - [`ChatCompletionsDriver`]: OpenAI-compatible Chat Completions API
//! - [`ScriptedDriver`]: queued canned replies, used to test without a network
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cortexluma::llm::{ScriptedDriver, Transport, TransportMode};
//!
//! let driver = Arc::new(ScriptedDriver::new());
//! driver.push_fragments(["Hi ", "there!"]);
//! let transport = Transport::with_driver(driver, TransportMode::Stream, None);
//! assert_eq!(transport.mode(), TransportMode::Stream);
//! ```

pub mod chat_completions;
pub mod error;
pub mod gemini;
pub mod provider;
pub mod scripted;
pub mod sse;
pub mod transport;

pub use chat_completions::ChatCompletionsDriver;
pub use error::{LlmError, LlmErrorKind};
pub use gemini::GeminiDriver;
pub use provider::Provider;
pub use scripted::{ScriptedDriver, ScriptedReply};
pub use transport::{ConversationContext, Response, Transport, TransportMode};

use std::pin::Pin;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};

/// Default model used when `LLM_MODEL` is not set.
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Default base URL used when `LLM_BASE_URL` is not set.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Model service connection settings.
#[derive(Clone)]
pub struct LlmSettings {
    /// Base URL for the model API.
    pub base_url: String,
    /// API credential. `None` leaves the application running in a broken state.
    pub api_key: Option<String>,
    /// Model identifier (e.g., `gemini-2.5-flash`, `gpt-4o-mini`).
    pub model: String,
    /// Wire protocol to speak.
    pub protocol: LlmProtocol,
    /// Provider detected from `base_url`.
    pub provider: Provider,
}

impl std::fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("protocol", &self.protocol)
            .field("provider", &self.provider)
            .finish()
    }
}

impl LlmSettings {
    /// Protocol actually spoken, resolving [`LlmProtocol::Auto`] from the provider.
    #[must_use]
    pub fn effective_protocol(&self) -> LlmProtocol {
        match self.protocol {
            LlmProtocol::Auto => self.provider.default_protocol(),
            other => other,
        }
    }
}

/// Model service protocol variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LlmProtocol {
    /// Pick the protocol from the provider.
    #[default]
    Auto,
    /// Google Generative Language API.
    Gemini,
    /// OpenAI-compatible Chat Completions API.
    Chat,
}

/// Author of a turn in the model-side conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One turn of the model-side conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Request to a model driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmRequest {
    /// Persona instruction configured when the conversation was opened.
    pub system_instruction: Option<String>,
    /// Prior turns followed by the new user turn.
    pub turns: Vec<Turn>,
}

/// Ordered text fragments of a streamed reply.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// Trait for model service drivers.
#[async_trait::async_trait]
pub trait LlmDriver: Send + Sync {
    /// Stream a reply as text fragments.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be sent or is rejected. Errors
    /// after the first fragment are delivered through the stream itself.
    async fn stream(&self, req: LlmRequest) -> Result<FragmentStream, LlmError>;

    /// Produce the whole reply at once.
    ///
    /// The default collects every fragment of [`LlmDriver::stream`].
    async fn complete(&self, req: LlmRequest) -> Result<String, LlmError> {
        let mut stream = self.stream(req).await?;
        let mut content = String::new();
        while let Some(fragment) = stream.next().await {
            content.push_str(&fragment?);
        }
        Ok(content)
    }
}
