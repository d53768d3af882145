//! Streaming relay between the model and the chat
//!
//! One call to [`StreamRelay::relay`] answers one user message:
//!
//! 1. `Started`: a placeholder reply is sent and the conversation resolved
//! 2. pre-flight: the prompt is token-counted against the model limit and
//!    the rate governor
//! 3. `Streaming`: chunks are appended to the active message, flushed at
//!    most once per interval and split when they outgrow a message
//! 4. `Finalizing`: citations are appended, the text is re-split and the
//!    chat is reconciled with the final chunks
//! 5. `Done` or `Failed`
//!
//! Edits never abort the relay; see [`safe_edit`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::channels::{
    DispatchError, MAX_MESSAGE_LENGTH, MessageDispatcher, ReplyTarget, SentMessage, TextFormat,
    safe_edit, safe_reply,
};
use crate::config::schema::{BotMessages, Config, DEFAULT_STREAMING_UPDATE_INTERVAL};
use crate::governor::RateGovernor;
use crate::providers::{ChatSession, ModelClient, PromptPart, ProviderError, StreamChunk};
use crate::session::SessionStore;
use crate::utils::Clock;

pub mod citations;
pub mod split;
pub mod stream;

pub use citations::append_citations;
pub use split::split_text;
pub use stream::{FinalizePlan, StreamState};

/// Default time between two typing indicators
pub const TYPING_INTERVAL: Duration = Duration::from_secs(4);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RelayError {
    #[error("Prompt too long: {tokens} tokens exceeds the model limit of {limit}")]
    PromptTooLong { tokens: u64, limit: u64 },

    #[error("Rate limit reached")]
    RateLimited,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl RelayError {
    /// Rejected before the model was asked anything
    pub fn is_admission_rejection(&self) -> bool {
        matches!(self, RelayError::PromptTooLong { .. } | RelayError::RateLimited)
    }
}

/// Relay state machine positions, used for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Started,
    Streaming,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::Started => "started",
            RelayState::Streaming => "streaming",
            RelayState::Finalizing => "finalizing",
            RelayState::Done => "done",
            RelayState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal state of one relay
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    Done { messages: usize },
    Failed { error: RelayError },
}

impl RelayOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, RelayOutcome::Done { .. })
    }
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub flush_interval: Duration,
    pub typing_interval: Duration,
    pub messages: BotMessages,
}

impl RelayConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            flush_interval: Duration::try_from_secs_f64(config.streaming_update_interval)
                .unwrap_or(Duration::from_secs_f64(DEFAULT_STREAMING_UPDATE_INTERVAL)),
            typing_interval: TYPING_INTERVAL,
            messages: config.messages.clone(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One user request on its way through the relay
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub target: ReplyTarget,
    pub user_id: String,
    pub model: String,
    pub parts: Vec<PromptPart>,
}

pub struct StreamRelay {
    client: Arc<dyn ModelClient>,
    dispatcher: Arc<dyn MessageDispatcher>,
    sessions: Arc<SessionStore>,
    governor: Arc<RateGovernor>,
    clock: Arc<dyn Clock>,
    config: RelayConfig,
}

impl StreamRelay {
    pub fn new(
        client: Arc<dyn ModelClient>,
        dispatcher: Arc<dyn MessageDispatcher>,
        sessions: Arc<SessionStore>,
        governor: Arc<RateGovernor>,
        clock: Arc<dyn Clock>,
        config: RelayConfig,
    ) -> Self {
        Self {
            client,
            dispatcher,
            sessions,
            governor,
            clock,
            config,
        }
    }

    /// Answers one request, streaming the reply into the chat.
    pub async fn relay(&self, request: RelayRequest) -> RelayOutcome {
        let RelayRequest {
            target,
            user_id,
            model,
            parts,
        } = request;
        debug!(
            state = %RelayState::Started,
            user_id = %user_id,
            model = %model,
            parts = parts.len(),
            "Relay transition"
        );

        let placeholder =
            match safe_reply(&*self.dispatcher, target, &self.config.messages.before_generate_info)
                .await
            {
                Ok(sent) => sent,
                Err(e) => {
                    let error = RelayError::from(e);
                    self.report_failure(target, None, &error).await;
                    return RelayOutcome::Failed { error };
                }
            };

        let mut state = StreamState::new(placeholder, self.clock.now());
        self.send_typing(&mut state, target.chat_id).await;

        match self.run(&mut state, target, &user_id, &model, parts).await {
            Ok(()) => {
                let messages = state.messages().len();
                debug!(state = %RelayState::Done, user_id = %user_id, messages = messages, "Relay transition");
                RelayOutcome::Done { messages }
            }
            Err(error) => {
                self.report_failure(target, Some(state.active()), &error).await;
                RelayOutcome::Failed { error }
            }
        }
    }

    async fn run(
        &self,
        state: &mut StreamState,
        target: ReplyTarget,
        user_id: &str,
        model: &str,
        parts: Vec<PromptPart>,
    ) -> Result<(), RelayError> {
        let context = self.sessions.get_or_create(user_id, model).await?;
        self.sessions.sweep().await;

        let mut session = context.lock_session().await;
        self.admit(&session, &parts).await?;

        debug!(state = %RelayState::Streaming, user_id = user_id, "Relay transition");
        let mut stream = self.client.send_streaming(&session, &parts).await?;
        while let Some(item) = stream.next().await {
            self.apply_chunk(state, target, item?).await?;
        }

        debug!(state = %RelayState::Finalizing, user_id = user_id, "Relay transition");
        self.finalize(state, target).await?;

        if !state.full_text().is_empty() {
            session.record_exchange(parts, state.full_text());
        }
        Ok(())
    }

    /// Pre-flight check against the model's input limit and the rate governor.
    async fn admit(&self, session: &ChatSession, parts: &[PromptPart]) -> Result<(), RelayError> {
        let contents = session.contents_with(parts);
        let tokens = self.client.count_tokens(&session.model, &contents).await?;
        let limit = self.client.model_info(&session.model).await?.input_token_limit;

        if tokens > limit {
            info!(tokens = tokens, limit = limit, model = %session.model, "Prompt exceeds model input limit");
            return Err(RelayError::PromptTooLong { tokens, limit });
        }

        if !self.governor.can_admit(tokens) {
            let (requests, used) = self.governor.snapshot();
            info!(
                tokens = tokens,
                requests_in_window = requests,
                tokens_in_window = used,
                "Rate governor denied request"
            );
            return Err(RelayError::RateLimited);
        }

        Ok(())
    }

    async fn apply_chunk(
        &self,
        state: &mut StreamState,
        target: ReplyTarget,
        chunk: StreamChunk,
    ) -> Result<(), RelayError> {
        if let Some(text) = chunk.text.as_deref().filter(|t| !t.is_empty()) {
            state.push_text(text);

            while let Some(remainder) = state.take_overflow(MAX_MESSAGE_LENGTH) {
                safe_edit(&*self.dispatcher, state.active(), state.active_text()).await;
                let next = safe_reply(
                    &*self.dispatcher,
                    target,
                    &self.config.messages.before_generate_info,
                )
                .await?;
                debug!(message_id = next.message_id, "Reply overflowed into a new message");
                state.open_message(next, remainder);
            }

            let now = self.clock.now();
            if state.flush_due(now, self.config.flush_interval) {
                safe_edit(&*self.dispatcher, state.active(), state.active_text()).await;
                state.mark_flushed(now);
            }
        }

        if let Some(grounding) = chunk.grounding {
            state.set_grounding(grounding);
        }
        if let Some(total) = chunk.usage.and_then(|u| u.total_tokens) {
            state.set_total_tokens(total);
        }

        if state.typing_due(self.clock.now(), self.config.typing_interval) {
            self.send_typing(state, target.chat_id).await;
        }
        Ok(())
    }

    async fn finalize(&self, state: &mut StreamState, target: ReplyTarget) -> Result<(), RelayError> {
        let text = if state.full_text().trim().is_empty() {
            warn!("Model returned no text");
            self.config.messages.empty_response_info.clone()
        } else {
            state.full_text().to_string()
        };
        let text = append_citations(&text, state.grounding());

        let FinalizePlan {
            edits,
            sends,
            deletes,
        } = state.finalize_plan(split_text(&text, MAX_MESSAGE_LENGTH));

        for (sent, chunk) in &edits {
            safe_edit(&*self.dispatcher, *sent, chunk).await;
        }
        for chunk in &sends {
            let sent = safe_reply(&*self.dispatcher, target, chunk).await?;
            state.open_message(sent, chunk.clone());
        }
        for sent in &deletes {
            if let Err(e) = self.dispatcher.delete(*sent).await {
                debug!(message_id = sent.message_id, error = %e, "Failed to delete surplus message");
            }
        }

        if let Some(total) = state.total_tokens() {
            self.governor.record(total);
        }

        info!(
            chars = text.chars().count(),
            messages = edits.len() + sends.len(),
            deleted = deletes.len(),
            total_tokens = ?state.total_tokens(),
            "Reply finalized"
        );
        Ok(())
    }

    async fn send_typing(&self, state: &mut StreamState, chat_id: i64) {
        if let Err(e) = self.dispatcher.send_typing(chat_id).await {
            debug!(chat_id = chat_id, error = %e, "Failed to send typing indicator");
        }
        state.mark_typing(self.clock.now());
    }

    /// Text shown to the user when a relay fails.
    pub fn failure_text(&self, error: &RelayError) -> String {
        let messages = &self.config.messages;
        match error {
            RelayError::PromptTooLong { tokens, limit } => format!(
                "{}\n({} tokens, the model accepts at most {})",
                messages.prompt_too_long_info, tokens, limit
            ),
            RelayError::RateLimited => messages.rate_limit_info.clone(),
            RelayError::Provider(e) if e.is_rate_limit() => {
                format!("{}\n{}", messages.rate_limit_info, e)
            }
            RelayError::Provider(e) if e.is_api_error() => {
                format!("{}\n{}", messages.error_info, e)
            }
            other => format!("{}\nError details: {}", messages.error_info, other),
        }
    }

    async fn report_failure(
        &self,
        target: ReplyTarget,
        placeholder: Option<SentMessage>,
        error: &RelayError,
    ) {
        if error.is_admission_rejection() {
            info!(state = %RelayState::Failed, error = %error, "Relay rejected");
        } else {
            error!(state = %RelayState::Failed, error = %error, "Relay failed");
        }

        let text = self.failure_text(error);
        let result = match placeholder {
            Some(sent) => self.dispatcher.edit(sent, &text, TextFormat::Plain).await,
            None => self
                .dispatcher
                .reply(target, &text, TextFormat::Plain)
                .await
                .map(|_| ()),
        };

        match result {
            Ok(()) | Err(DispatchError::NotModified) => {}
            Err(e) => warn!(
                chat_id = target.chat_id,
                error = %e,
                "Failed to notify user about relay failure"
            ),
        }
    }
}
