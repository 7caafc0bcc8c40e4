//! OpenAI Chat Completions API driver.
//!
//! This module implements the [`LlmDriver`] trait for OpenAI-compatible
//! `/v1/chat/completions` endpoints, streaming assistant text deltas.

use futures::{Stream, StreamExt};

use super::sse::SseDecoder;
use super::{FragmentStream, LlmDriver, LlmError, LlmRequest, LlmSettings, Role};

/// Driver for the OpenAI Chat Completions API.
///
/// Connects to `/v1/chat/completions` and streams `choices[0].delta.content`.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    async fn post(&self, req: &LlmRequest, stream: bool) -> Result<reqwest::Response, LlmError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(LlmError::missing_credential)?;

        let url = self.settings.provider.build_chat_url(&self.settings.base_url);
        let body = serde_json::json!({
            "model": self.settings.model,
            "stream": stream,
            "messages": request_messages(req),
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&text)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(ToString::to_string))
            .unwrap_or(text);
        Err(LlmError::from_status(status, &detail))
    }
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn stream(&self, req: LlmRequest) -> Result<FragmentStream, LlmError> {
        let resp = self.post(&req, true).await?;
        Ok(delta_stream(resp.bytes_stream()))
    }

    async fn complete(&self, req: LlmRequest) -> Result<String, LlmError> {
        let resp = self.post(&req, false).await?;
        let v: serde_json::Value = resp.json().await?;
        v["choices"][0]["message"]["content"]
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| LlmError::invalid_response("No message content in response"))
    }
}

/// Decode an SSE byte stream into text deltas, stopping at `[DONE]`.
fn delta_stream<S, B, E>(byte_stream: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<LlmError> + Send + 'static,
{
    let out = async_stream::try_stream! {
        let mut decoder = SseDecoder::new();
        let mut done = false;

        futures::pin_mut!(byte_stream);
        'frames: while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(Into::<LlmError>::into)?;
            for data in decoder.push(chunk.as_ref()) {
                if data == "[DONE]" {
                    done = true;
                    break 'frames;
                }
                if let Some(text) = parse_delta(&data)? {
                    yield text;
                }
            }
        }

        // Servers that close without [DONE] may leave an unterminated frame
        if !done {
            if let Some(data) = decoder.finish().filter(|data| data != "[DONE]") {
                if let Some(text) = parse_delta(&data)? {
                    yield text;
                }
            }
        }
    };

    Box::pin(out)
}

/// Convert the request to Chat Completions messages.
fn request_messages(req: &LlmRequest) -> Vec<serde_json::Value> {
    let system = req
        .system_instruction
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| serde_json::json!({ "role": "system", "content": s }));

    system
        .into_iter()
        .chain(req.turns.iter().map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Model => "assistant",
            };
            serde_json::json!({ "role": role, "content": turn.text })
        }))
        .collect()
}

/// Extract the assistant text delta from one streamed chunk.
fn parse_delta(data: &str) -> Result<Option<String>, LlmError> {
    let v: serde_json::Value = serde_json::from_str(data)?;

    if let Some(message) = v["error"]["message"].as_str() {
        return Err(LlmError::server_error(message.to_string()));
    }

    Ok(v["choices"][0]["delta"]["content"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(ToString::to_string))
}
