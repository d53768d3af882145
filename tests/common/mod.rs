//! Shared helpers for integration tests

use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream;
use relaybot::providers::{
    ChatSession, ChunkStream, Content, ModelClient, ModelInfo, PromptPart, ProviderError,
    SessionOptions, StreamChunk,
};

/// Model client that answers every prompt with a fixed reply
pub struct EchoClient {
    sessions_created: AtomicUsize,
}

impl EchoClient {
    pub fn new() -> Self {
        Self {
            sessions_created: AtomicUsize::new(0),
        }
    }

    pub fn sessions_created(&self) -> usize {
        self.sessions_created.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ModelClient for EchoClient {
    async fn create_session(
        &self,
        model: &str,
        options: &SessionOptions,
    ) -> Result<ChatSession, ProviderError> {
        self.sessions_created.fetch_add(1, Ordering::SeqCst);
        Ok(ChatSession::new(model, options.clone()))
    }

    async fn send_streaming(
        &self,
        _session: &ChatSession,
        _parts: &[PromptPart],
    ) -> Result<ChunkStream, ProviderError> {
        Ok(Box::pin(stream::iter(vec![Ok(StreamChunk::text("ok"))])))
    }

    async fn count_tokens(&self, _model: &str, contents: &[Content]) -> Result<u64, ProviderError> {
        Ok(contents.len() as u64)
    }

    async fn model_info(&self, model: &str) -> Result<ModelInfo, ProviderError> {
        Ok(ModelInfo {
            name: model.to_string(),
            input_token_limit: 1_000_000,
        })
    }

    fn provider_name(&self) -> &'static str {
        "echo"
    }
}
