//! Mock model client for testing
//!
//! Replays a scripted stream of chunks and records what the relay asked for,
//! so relay and router behavior can be checked without a network.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;

use crate::providers::{
    ChatSession, ChunkStream, Content, ModelClient, ModelInfo, PromptPart, ProviderError,
    SessionOptions, StreamChunk,
};
use crate::utils::ManualClock;

/// Mock backend with a configurable reply
pub struct MockModelClient {
    chunks: Mutex<Vec<Result<StreamChunk, ProviderError>>>,
    send_error: Mutex<Option<ProviderError>>,
    token_count: Mutex<u64>,
    input_token_limit: Mutex<u64>,
    sessions_created: Mutex<Vec<String>>,
    stream_calls: Arc<Mutex<Vec<Vec<PromptPart>>>>,
    chunk_delay: Mutex<Option<(Arc<ManualClock>, Duration)>>,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self {
            chunks: Mutex::new(Vec::new()),
            send_error: Mutex::new(None),
            token_count: Mutex::new(10),
            input_token_limit: Mutex::new(1_000_000),
            sessions_created: Mutex::new(Vec::new()),
            stream_calls: Arc::new(Mutex::new(Vec::new())),
            chunk_delay: Mutex::new(None),
        }
    }

    /// Streams one text chunk per entry
    pub fn with_text_chunks(self, texts: &[&str]) -> Self {
        *self.chunks.lock().unwrap() = texts.iter().map(|t| Ok(StreamChunk::text(*t))).collect();
        self
    }

    /// Streams exactly these items
    pub fn with_chunks(self, chunks: Vec<Result<StreamChunk, ProviderError>>) -> Self {
        *self.chunks.lock().unwrap() = chunks;
        self
    }

    /// Fails `send_streaming` before any chunk is produced
    pub fn with_send_error(self, error: ProviderError) -> Self {
        *self.send_error.lock().unwrap() = Some(error);
        self
    }

    /// Advances `clock` by `delay` before each chunk is yielded
    pub fn with_chunk_delay(self, clock: Arc<ManualClock>, delay: Duration) -> Self {
        *self.chunk_delay.lock().unwrap() = Some((clock, delay));
        self
    }

    pub fn with_token_count(self, tokens: u64) -> Self {
        *self.token_count.lock().unwrap() = tokens;
        self
    }

    pub fn with_input_limit(self, limit: u64) -> Self {
        *self.input_token_limit.lock().unwrap() = limit;
        self
    }

    /// Models for which a session was created, in order
    pub fn sessions_created(&self) -> Vec<String> {
        self.sessions_created.lock().unwrap().clone()
    }

    /// Prompt parts of every streaming call, in order
    pub fn stream_calls(&self) -> Vec<Vec<PromptPart>> {
        self.stream_calls.lock().unwrap().clone()
    }
}

impl Default for MockModelClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ModelClient for MockModelClient {
    async fn create_session(
        &self,
        model: &str,
        options: &SessionOptions,
    ) -> Result<ChatSession, ProviderError> {
        self.sessions_created.lock().unwrap().push(model.to_string());
        Ok(ChatSession::new(model, options.clone()))
    }

    async fn send_streaming(
        &self,
        _session: &ChatSession,
        parts: &[PromptPart],
    ) -> Result<ChunkStream, ProviderError> {
        self.stream_calls.lock().unwrap().push(parts.to_vec());

        if let Some(err) = self.send_error.lock().unwrap().clone() {
            return Err(err);
        }

        let chunks = self.chunks.lock().unwrap().clone();
        let stream = futures::stream::iter(chunks);
        match self.chunk_delay.lock().unwrap().clone() {
            Some((clock, delay)) => Ok(stream
                .map(move |chunk| {
                    clock.advance(delay);
                    chunk
                })
                .boxed()),
            None => Ok(stream.boxed()),
        }
    }

    async fn count_tokens(&self, _model: &str, _contents: &[Content]) -> Result<u64, ProviderError> {
        Ok(*self.token_count.lock().unwrap())
    }

    async fn model_info(&self, model: &str) -> Result<ModelInfo, ProviderError> {
        Ok(ModelInfo {
            name: format!("models/{}", model),
            input_token_limit: *self.input_token_limit.lock().unwrap(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
