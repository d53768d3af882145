//! Gemini REST backend
//!
//! Implements [`ModelClient`] over the public Generative Language API:
//!
//! - `models/{model}:streamGenerateContent?alt=sse` for streamed replies
//! - `models/{model}:countTokens` for pre-flight token accounting
//! - `models/{model}` for model limits (cached per model)
//!
//! Requests authenticate with the `x-goog-api-key` header.

use std::collections::HashMap;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use eventsource_client as es;
use eventsource_client::Client as _;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::schema::DEFAULT_GEMINI_BASE_URL;
use crate::providers::{
    ChatSession, ChunkStream, Content, GroundingMetadata, ModelClient, ModelInfo, PromptPart,
    ProviderError, SafetySetting, SessionOptions, StreamChunk, Tool, UsageMetadata, WebSource,
};

const PROVIDER_NAME: &str = "gemini";

/// Connection settings for [`GeminiClient`]
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    pub connect_timeout_seconds: u64,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            connect_timeout_seconds: 10,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

// ---------- Wire format ----------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<ApiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<ApiContent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<SafetySetting>,
}

#[derive(Debug, Serialize)]
struct CountTokensRequest {
    contents: Vec<ApiContent>,
}

#[derive(Debug, Serialize)]
struct ApiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<ApiPart>,
}

#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct ApiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<ApiInlineData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_data: Option<ApiFileData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiFileData {
    file_uri: String,
    mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
    usage_metadata: Option<ApiUsage>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCandidate {
    content: Option<ApiCandidateContent>,
    grounding_metadata: Option<ApiGrounding>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidateContent {
    #[serde(default)]
    parts: Vec<ApiResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ApiResponsePart {
    text: Option<String>,
    /// Set on reasoning summaries, which are not part of the answer
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiGrounding {
    #[serde(default)]
    grounding_chunks: Vec<ApiGroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct ApiGroundingChunk {
    web: Option<ApiWeb>,
}

#[derive(Debug, Deserialize)]
struct ApiWeb {
    uri: Option<String>,
    title: Option<String>,
    domain: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUsage {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
    total_token_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountTokensResponse {
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiModel {
    name: String,
    input_token_limit: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<u16>,
    message: Option<String>,
    status: Option<String>,
}

impl ApiErrorBody {
    fn into_provider_error(self, fallback_code: u16) -> ProviderError {
        ProviderError::api(
            self.code.unwrap_or(fallback_code),
            self.status.unwrap_or_else(|| "UNKNOWN".to_string()),
            self.message.unwrap_or_default(),
        )
    }
}

// ---------- Conversions ----------

fn to_api_part(part: &PromptPart) -> ApiPart {
    match part {
        PromptPart::Text(text) => ApiPart {
            text: Some(text.clone()),
            ..ApiPart::default()
        },
        PromptPart::Inline { mime_type, data } => ApiPart {
            inline_data: Some(ApiInlineData {
                mime_type: mime_type.clone(),
                data: BASE64.encode(data),
            }),
            ..ApiPart::default()
        },
        PromptPart::FileUri { uri, mime_type } => ApiPart {
            file_data: Some(ApiFileData {
                file_uri: uri.clone(),
                mime_type: mime_type.clone(),
            }),
            ..ApiPart::default()
        },
    }
}

fn to_api_contents(contents: &[Content]) -> Vec<ApiContent> {
    contents
        .iter()
        .map(|content| ApiContent {
            role: Some(content.role.as_str().to_string()),
            parts: content.parts.iter().map(to_api_part).collect(),
        })
        .collect()
}

fn build_request(contents: &[Content], options: &SessionOptions) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: to_api_contents(contents),
        system_instruction: options.system_instruction.as_ref().map(|text| ApiContent {
            role: None,
            parts: vec![ApiPart {
                text: Some(text.clone()),
                ..ApiPart::default()
            }],
        }),
        tools: options
            .tools
            .iter()
            .map(|tool| match tool {
                Tool::GoogleSearch => serde_json::json!({ "googleSearch": {} }),
            })
            .collect(),
        safety_settings: options.safety_settings.clone(),
    }
}

/// Converts one streamed `data:` payload into a chunk.
fn parse_stream_event(data: &str) -> Result<StreamChunk, ProviderError> {
    let response: GenerateContentResponse = serde_json::from_str(data)?;
    if let Some(error) = response.error {
        return Err(error.into_provider_error(500));
    }

    let mut chunk = StreamChunk::default();

    if let Some(candidate) = response.candidates.into_iter().next() {
        let text: String = candidate
            .content
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter(|part| !part.thought)
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();
        if !text.is_empty() {
            chunk.text = Some(text);
        }

        if let Some(grounding) = candidate.grounding_metadata {
            let sources: Vec<WebSource> = grounding
                .grounding_chunks
                .into_iter()
                .filter_map(|c| c.web)
                .filter_map(|web| {
                    web.uri.map(|uri| WebSource {
                        uri,
                        title: web.title,
                        domain: web.domain,
                    })
                })
                .collect();
            chunk.grounding = Some(GroundingMetadata { sources });
        }
    }

    chunk.usage = response.usage_metadata.map(|usage| UsageMetadata {
        prompt_tokens: usage.prompt_token_count,
        candidates_tokens: usage.candidates_token_count,
        total_tokens: usage.total_token_count,
    });

    Ok(chunk)
}

/// Symbolic status Gemini reports alongside an HTTP code
fn status_name(code: u16) -> &'static str {
    match code {
        400 => "INVALID_ARGUMENT",
        401 => "UNAUTHENTICATED",
        403 => "PERMISSION_DENIED",
        404 => "NOT_FOUND",
        429 => "RESOURCE_EXHAUSTED",
        500 => "INTERNAL",
        503 => "UNAVAILABLE",
        504 => "DEADLINE_EXCEEDED",
        _ => "UNKNOWN",
    }
}

fn model_path(model: &str) -> &str {
    model.strip_prefix("models/").unwrap_or(model)
}

// ---------- Client ----------

/// Gemini implementation of [`ModelClient`]
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    connect_timeout_seconds: u64,
    client: Client,
    model_cache: RwLock<HashMap<String, ModelInfo>>,
}

impl GeminiClient {
    /// Creates a client, failing only if the HTTP client cannot be built.
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        if config.api_key.is_empty() {
            return Err(ProviderError::config("Gemini API key is empty"));
        }

        // No overall timeout: a streamed reply may legitimately take minutes.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .build()
            .map_err(|e| ProviderError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_key: config.api_key,
            base_url: config.base_url,
            connect_timeout_seconds: config.connect_timeout_seconds,
            client,
            model_cache: RwLock::new(HashMap::new()),
        })
    }

    fn url(&self, model: &str, action: &str) -> String {
        format!("{}/models/{}{}", self.base_url, model_path(model), action)
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::timeout(self.connect_timeout_seconds)
        } else if err.is_connect() {
            ProviderError::network(format!("Connection failed: {}", err))
        } else {
            ProviderError::network(format!("Request failed: {}", err))
        }
    }

    /// Turns a non-2xx response into the backend's structured error.
    async fn check_status(response: Response) -> Result<Response, ProviderError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status = %status, "Gemini request rejected");

        match serde_json::from_str::<ApiErrorEnvelope>(&body) {
            Ok(envelope) => Err(envelope.error.into_provider_error(status.as_u16())),
            Err(_) => Err(ProviderError::api(
                status.as_u16(),
                status.canonical_reason().unwrap_or("UNKNOWN"),
                body,
            )),
        }
    }

    /// Opens an SSE stream for a POST request. Nothing is sent until the stream is polled.
    fn open_event_stream(&self, url: &str, body: String) -> Result<EventStream, ProviderError> {
        let builder = es::ClientBuilder::for_url(url)
            .and_then(|b| b.header("x-goog-api-key", &self.api_key))
            .and_then(|b| b.header("content-type", "application/json"))
            .map_err(|e| ProviderError::config(format!("Invalid streaming request: {}", e)))?;

        let client = builder
            .method("POST".to_string())
            .body(body)
            .connect_timeout(Duration::from_secs(self.connect_timeout_seconds))
            .reconnect(es::ReconnectOptions::reconnect(false).build())
            .build();
        Ok(client.stream().boxed())
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Response, ProviderError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        Self::check_status(response).await
    }
}

type EventStream = BoxStream<'static, Result<es::SSE, es::Error>>;

/// Maps a failure reported by the event stream.
///
/// A rejected streaming request carries no parsed error body, only its status.
fn stream_error(err: es::Error, timeout_seconds: u64) -> ProviderError {
    match err {
        es::Error::UnexpectedResponse(response, _) => {
            let code = response.status();
            warn!(status = code, "Gemini streaming request rejected");
            ProviderError::api(code, status_name(code), "Streaming request rejected")
        }
        es::Error::TimedOut => ProviderError::timeout(timeout_seconds),
        other => ProviderError::network(format!("Stream interrupted: {}", other)),
    }
}

/// Pulls the next chunk, skipping keep-alive comments.
///
/// Returns `None` once the server closes the stream.
async fn next_chunk(
    events: &mut EventStream,
    timeout_seconds: u64,
) -> Option<Result<StreamChunk, ProviderError>> {
    loop {
        match events.next().await? {
            Ok(es::SSE::Event(event)) => return Some(parse_stream_event(&event.data)),
            Ok(es::SSE::Comment(_)) => {}
            Ok(es::SSE::Connected(_)) => debug!("Gemini stream connected"),
            Err(es::Error::Eof) => return None,
            Err(e) => return Some(Err(stream_error(e, timeout_seconds))),
        }
    }
}

/// Chains an already-read first chunk with the rest of the stream.
///
/// The stream ends after the first error.
fn chunk_stream(
    first: Option<Result<StreamChunk, ProviderError>>,
    events: EventStream,
    timeout_seconds: u64,
) -> ChunkStream {
    let done = !matches!(first, Some(Ok(_)));
    let rest = stream::unfold((events, done), move |(mut events, done)| async move {
        if done {
            return None;
        }
        let item = next_chunk(&mut events, timeout_seconds).await?;
        let done = item.is_err();
        Some((item, (events, done)))
    });

    stream::iter(first).chain(rest).boxed()
}

#[async_trait::async_trait]
impl ModelClient for GeminiClient {
    async fn create_session(
        &self,
        model: &str,
        options: &SessionOptions,
    ) -> Result<ChatSession, ProviderError> {
        debug!(model = model, tools = options.tools.len(), "Creating chat session");
        Ok(ChatSession::new(model, options.clone()))
    }

    async fn send_streaming(
        &self,
        session: &ChatSession,
        parts: &[PromptPart],
    ) -> Result<ChunkStream, ProviderError> {
        let contents = session.contents_with(parts);
        let request = build_request(&contents, &session.options);

        info!(
            model = %session.model,
            provider = PROVIDER_NAME,
            history_len = session.history.len(),
            part_count = parts.len(),
            "Sending streaming request"
        );

        let url = self.url(&session.model, ":streamGenerateContent?alt=sse");
        let mut events = self.open_event_stream(&url, serde_json::to_string(&request)?)?;

        // Connection and HTTP errors surface here rather than mid-stream
        let timeout = self.connect_timeout_seconds;
        let first = match next_chunk(&mut events, timeout).await {
            Some(Err(e)) => return Err(e),
            first => first,
        };
        Ok(chunk_stream(first, events, timeout))
    }

    async fn count_tokens(&self, model: &str, contents: &[Content]) -> Result<u64, ProviderError> {
        let url = self.url(model, ":countTokens");
        let request = CountTokensRequest {
            contents: to_api_contents(contents),
        };

        let response = self.post_json(&url, &request).await?;
        let body: CountTokensResponse = response.json().await.map_err(|e| {
            ProviderError::serialization(format!("Failed to parse countTokens response: {}", e))
        })?;

        debug!(model = model, total_tokens = body.total_tokens, "Counted prompt tokens");
        Ok(body.total_tokens)
    }

    async fn model_info(&self, model: &str) -> Result<ModelInfo, ProviderError> {
        if let Some(info) = self.model_cache.read().await.get(model) {
            return Ok(info.clone());
        }

        let url = self.url(model, "");
        let response = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let response = Self::check_status(response).await?;

        let body: ApiModel = response.json().await.map_err(|e| {
            ProviderError::serialization(format!("Failed to parse model response: {}", e))
        })?;
        let info = ModelInfo {
            name: body.name,
            input_token_limit: body.input_token_limit,
        };

        info!(
            model = model,
            input_token_limit = info.input_token_limit,
            "Fetched model limits"
        );
        self.model_cache
            .write()
            .await
            .insert(model.to_string(), info.clone());
        Ok(info)
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER_NAME
    }
}
