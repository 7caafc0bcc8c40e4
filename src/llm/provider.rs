//! Provider-specific configuration and detection.
//!
//! This module handles differences between model API providers, including
//! URL patterns and the protocol each one speaks.

use super::LlmProtocol;

/// Supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Google Gemini (generativelanguage.googleapis.com)
    Gemini,
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// `OpenRouter` (openrouter.ai)
    OpenRouter,
    /// Groq (groq.com)
    Groq,
    /// Generic OpenAI-compatible provider
    Generic,
}

impl Provider {
    /// Detect provider from base URL.
    ///
    /// # Example
    ///
    /// ```rust
    /// use cortexluma::llm::Provider;
    ///
    /// let provider = Provider::detect_from_url("https://generativelanguage.googleapis.com");
    /// assert_eq!(provider, Provider::Gemini);
    /// ```
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("googleapis.com") {
            Self::Gemini
        } else if lower.contains("openrouter.ai") {
            Self::OpenRouter
        } else if lower.contains("groq.com") {
            Self::Groq
        } else if lower.contains("openai.com") {
            Self::OpenAI
        } else {
            Self::Generic
        }
    }

    /// Protocol used when `LLM_PROTOCOL` is `auto`.
    #[must_use]
    pub fn default_protocol(self) -> LlmProtocol {
        match self {
            Self::Gemini => LlmProtocol::Gemini,
            Self::OpenAI | Self::OpenRouter | Self::Groq | Self::Generic => LlmProtocol::Chat,
        }
    }

    /// Build the chat completions URL for this provider.
    #[must_use]
    pub fn build_chat_url(self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::Groq if !base.ends_with("/openai") => format!("{base}/openai/v1/chat/completions"),
            _ => format!("{base}/v1/chat/completions"),
        }
    }

    /// Build a Gemini model method URL, e.g. `generateContent`.
    #[must_use]
    pub fn build_gemini_url(base_url: &str, model: &str, method: &str) -> String {
        let base = base_url.trim_end_matches('/');
        let model = model.trim_start_matches("models/");
        format!("{base}/v1beta/models/{model}:{method}")
    }
}
