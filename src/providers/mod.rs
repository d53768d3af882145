//! Model backend integration for relaybot
//!
//! This module defines the trait and types the relay uses to talk to a
//! generative model. The relay only needs four capabilities: open a chat
//! session, stream a reply, count tokens and look up model limits.
//!
//! # Architecture
//!
//! - `ModelClient` trait defines the interface all backends must implement
//! - `ChatSession` keeps the conversation history client-side
//! - `GeminiClient` implements the trait over the Gemini REST API

use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod error;
pub mod gemini;
#[cfg(test)]
pub mod mock;

pub use error::ProviderError;
pub use gemini::{GeminiClient, GeminiConfig};

/// One piece of a prompt sent to the model
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    /// Plain text
    Text(String),
    /// Binary attachment sent inline (image, audio, PDF)
    Inline { mime_type: String, data: Bytes },
    /// Reference to a remote file the backend fetches itself (YouTube video)
    FileUri { uri: String, mime_type: String },
}

impl PromptPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn inline(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::Inline {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    pub fn file_uri(uri: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::FileUri {
            uri: uri.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Returns the text of a text part
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PromptPart::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One turn of the conversation
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<PromptPart>,
}

impl Content {
    pub fn user(parts: Vec<PromptPart>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![PromptPart::Text(text.into())],
        }
    }
}

/// Harm categories the backend filters on
pub const SAFETY_CATEGORIES: [&str; 5] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_CIVIC_INTEGRITY",
];

/// A content filter threshold for one harm category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetySetting {
    pub category: String,
    pub threshold: String,
}

/// Tools the backend may use while answering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    GoogleSearch,
}

/// Settings fixed when a chat session is created
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionOptions {
    pub system_instruction: Option<String>,
    pub tools: Vec<Tool>,
    pub safety_settings: Vec<SafetySetting>,
}

impl SessionOptions {
    /// Options used by the bot: optional search grounding and no content blocking.
    pub fn for_bot(system_instruction: Option<String>, enable_search: bool) -> Self {
        Self {
            system_instruction,
            tools: if enable_search {
                vec![Tool::GoogleSearch]
            } else {
                Vec::new()
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|category| SafetySetting {
                    category: category.to_string(),
                    threshold: "BLOCK_NONE".to_string(),
                })
                .collect(),
        }
    }
}

/// A conversation with one model.
///
/// The backend is stateless, so the history lives here and is replayed on
/// every request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSession {
    pub model: String,
    pub options: SessionOptions,
    pub history: Vec<Content>,
}

impl ChatSession {
    pub fn new(model: impl Into<String>, options: SessionOptions) -> Self {
        Self {
            model: model.into(),
            options,
            history: Vec::new(),
        }
    }

    /// History followed by a new user turn made of `parts`.
    pub fn contents_with(&self, parts: &[PromptPart]) -> Vec<Content> {
        let mut contents = self.history.clone();
        contents.push(Content::user(parts.to_vec()));
        contents
    }

    /// Appends a completed exchange to the history.
    pub fn record_exchange(&mut self, parts: Vec<PromptPart>, reply: impl Into<String>) {
        self.history.push(Content::user(parts));
        self.history.push(Content::model(reply));
    }
}

/// A web page the model used to ground its answer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WebSource {
    pub uri: String,
    pub title: Option<String>,
    pub domain: Option<String>,
}

/// Citation data attached to a streamed chunk
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroundingMetadata {
    pub sources: Vec<WebSource>,
}

/// Token accounting attached to a streamed chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsageMetadata {
    pub prompt_tokens: Option<u64>,
    pub candidates_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// One incremental unit of a streamed response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamChunk {
    pub text: Option<String>,
    pub grounding: Option<GroundingMetadata>,
    pub usage: Option<UsageMetadata>,
}

impl StreamChunk {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_grounding(mut self, grounding: GroundingMetadata) -> Self {
        self.grounding = Some(grounding);
        self
    }

    pub fn with_total_tokens(mut self, total: u64) -> Self {
        self.usage = Some(UsageMetadata {
            total_tokens: Some(total),
            ..UsageMetadata::default()
        });
        self
    }
}

/// Limits advertised by a model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub input_token_limit: u64,
}

/// Lazily produced chunks of one streamed reply
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, ProviderError>>;

/// Trait for generative model backends
///
/// All implementations must be Send + Sync to allow concurrent usage across tasks.
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    /// Opens a new chat session bound to `model`
    async fn create_session(
        &self,
        model: &str,
        options: &SessionOptions,
    ) -> Result<ChatSession, ProviderError>;

    /// Sends `parts` as the next user turn and streams the reply.
    ///
    /// The session is not modified; callers record the exchange once the
    /// stream has been fully consumed.
    async fn send_streaming(
        &self,
        session: &ChatSession,
        parts: &[PromptPart],
    ) -> Result<ChunkStream, ProviderError>;

    /// Counts the tokens `contents` would consume as model input
    async fn count_tokens(&self, model: &str, contents: &[Content]) -> Result<u64, ProviderError>;

    /// Looks up the limits of `model`
    async fn model_info(&self, model: &str) -> Result<ModelInfo, ProviderError>;

    /// Returns the provider name, used for logging
    fn provider_name(&self) -> &'static str;
}
