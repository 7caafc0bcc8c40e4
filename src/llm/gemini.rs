//! Google Gemini driver.
//!
//! Talks to the Generative Language API: `:streamGenerateContent?alt=sse` for
//! fragment streams and `:generateContent` for whole replies.

use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use super::sse::SseDecoder;
use super::{FragmentStream, LlmDriver, LlmError, LlmRequest, LlmSettings, Provider, Role};

/// Driver for the Gemini Generative Language API.
#[derive(Clone)]
pub struct GeminiDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for GeminiDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl GeminiDriver {
    /// Create a new Gemini driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    fn endpoint(&self, method: &str, streaming: bool) -> Result<Url, LlmError> {
        let raw = Provider::build_gemini_url(&self.settings.base_url, &self.settings.model, method);
        let mut url = Url::parse(&raw)
            .map_err(|e| LlmError::invalid_request(format!("Invalid base URL {raw}: {e}")))?;
        if streaming {
            url.query_pairs_mut().append_pair("alt", "sse");
        }
        Ok(url)
    }

    async fn post(&self, url: Url, req: &LlmRequest) -> Result<reqwest::Response, LlmError> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(LlmError::missing_credential)?;

        let body = GeminiRequest::from_request(req);
        tracing::debug!(
            url = %url,
            turn_count = body.contents.len(),
            has_system_instruction = body.system_instruction.is_some(),
            "Sending Gemini request"
        );

        let resp = self
            .http
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let text = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<GeminiErrorEnvelope>(&text)
            .map(|envelope| envelope.error.message)
            .unwrap_or(text);
        Err(LlmError::from_status(status, &detail))
    }
}

#[async_trait::async_trait]
impl LlmDriver for GeminiDriver {
    async fn stream(&self, req: LlmRequest) -> Result<FragmentStream, LlmError> {
        let url = self.endpoint("streamGenerateContent", true)?;
        let resp = self.post(url, &req).await?;
        Ok(fragment_stream(resp.bytes_stream()))
    }

    async fn complete(&self, req: LlmRequest) -> Result<String, LlmError> {
        let url = self.endpoint("generateContent", false)?;
        let resp = self.post(url, &req).await?;
        let body = resp.text().await?;
        let parsed: GeminiResponse = serde_json::from_str(&body)?;

        if let Some(err) = parsed.error {
            return Err(err.into_llm_error());
        }
        if parsed.candidates.is_empty() {
            return Err(match parsed.prompt_feedback.and_then(|f| f.block_reason) {
                Some(reason) => LlmError::invalid_response(format!("Prompt blocked: {reason}")),
                None => LlmError::invalid_response("No candidates in response"),
            });
        }
        Ok(parsed.text())
    }
}

/// Decode an SSE byte stream into text fragments.
fn fragment_stream<S, B, E>(byte_stream: S) -> FragmentStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<LlmError> + Send + 'static,
{
    let out = async_stream::try_stream! {
        let mut decoder = SseDecoder::new();

        futures::pin_mut!(byte_stream);
        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(Into::<LlmError>::into)?;
            for data in decoder.push(chunk.as_ref()) {
                if let Some(text) = parse_stream_frame(&data)? {
                    yield text;
                }
            }
        }

        if let Some(data) = decoder.finish() {
            if let Some(text) = parse_stream_frame(&data)? {
                yield text;
            }
        }
    };

    Box::pin(out)
}

/// Extract the text carried by one streamed frame.
///
/// Returns `Ok(None)` for frames without visible text (usage-only frames,
/// thought parts, finish markers).
fn parse_stream_frame(data: &str) -> Result<Option<String>, LlmError> {
    let frame: GeminiResponse = serde_json::from_str(data)?;

    if let Some(err) = frame.error {
        return Err(err.into_llm_error());
    }
    if frame.candidates.is_empty() {
        if let Some(reason) = frame
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(LlmError::invalid_response(format!("Prompt blocked: {reason}")));
        }
    }

    let text = frame.text();
    Ok(if text.is_empty() { None } else { Some(text) })
}

// Gemini API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    contents: Vec<GeminiContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiInstruction<'a>>,
}

impl<'a> GeminiRequest<'a> {
    fn from_request(req: &'a LlmRequest) -> Self {
        let contents = req
            .turns
            .iter()
            .map(|turn| GeminiContent {
                role: match turn.role {
                    Role::User => "user",
                    Role::Model => "model",
                },
                parts: vec![GeminiTextPart { text: &turn.text }],
            })
            .collect();

        let system_instruction = req
            .system_instruction
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|text| GeminiInstruction {
                parts: vec![GeminiTextPart { text }],
            });

        Self {
            contents,
            system_instruction,
        }
    }
}

#[derive(Debug, Serialize)]
struct GeminiContent<'a> {
    role: &'static str,
    parts: Vec<GeminiTextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiInstruction<'a> {
    parts: Vec<GeminiTextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiTextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    prompt_feedback: Option<GeminiPromptFeedback>,
    error: Option<GeminiErrorBody>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate, skipping thought parts.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
    #[allow(dead_code)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

impl GeminiErrorBody {
    fn into_llm_error(self) -> LlmError {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        LlmError::from_status(status, &self.message)
    }
}
