//! Routing of user messages to the relay
//!
//! Applies the allow-list, answers commands, tracks YouTube links that are
//! still waiting for a prompt and turns attachments into prompt parts.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::channels::{DispatchError, MessageDispatcher, ReplyTarget, TextFormat, safe_reply};
use crate::chat::types::{Command, IncomingContent, IncomingMessage, MediaAttachment};
use crate::config::schema::{BotMessages, Config};
use crate::providers::PromptPart;
use crate::relay::{RelayOutcome, RelayRequest, StreamRelay};
use crate::session::SessionStore;
use crate::utils::{BotError, WhitelistChecker};

static YOUTUBE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:www\.)?(?:youtube\.com/watch\?v=|youtu\.be/)[^\s]+")
        .expect("YouTube pattern is valid")
});

pub const YOUTUBE_MIME_TYPE: &str = "video/*";
pub const ASK_VIDEO_PROMPT: &str = "What would you like to do with this video?";
pub const HISTORY_CLEARED: &str = "Your history has been cleared";
const WELCOME: &str = "Welcome, you can ask me questions now.\n\
For example: `Who is John Lennon?`\n\n\
/gemini <question> uses the default model\n\
/gemini_pro <question> uses the pro model\n\
/youtube <url> [prompt] asks about a video\n\
/clear forgets the conversation";
const YOUTUBE_HINT: &str = "Please provide a valid YouTube URL after /youtube.";

/// First YouTube link in `text`, with the byte offset where it ends.
pub fn find_youtube_url(text: &str) -> Option<(&str, usize)> {
    YOUTUBE_RE.find(text).map(|m| (m.as_str(), m.end()))
}

/// What the router did with a message
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    Relayed(RelayOutcome),
    Replied,
    Denied,
    Ignored,
}

pub struct ChatRouter {
    relay: Arc<StreamRelay>,
    dispatcher: Arc<dyn MessageDispatcher>,
    sessions: Arc<SessionStore>,
    whitelist: WhitelistChecker,
    model: String,
    pro_model: String,
    messages: BotMessages,
    pending_youtube: RwLock<HashMap<i64, String>>,
}

impl ChatRouter {
    pub fn new(
        relay: Arc<StreamRelay>,
        dispatcher: Arc<dyn MessageDispatcher>,
        sessions: Arc<SessionStore>,
        config: &Config,
    ) -> Self {
        Self {
            relay,
            dispatcher,
            sessions,
            whitelist: WhitelistChecker::new(config.authorized_user_ids.clone()),
            model: config.model.clone(),
            pro_model: config.pro_model.clone(),
            messages: config.messages.clone(),
            pending_youtube: RwLock::new(HashMap::new()),
        }
    }

    pub async fn handle(&self, message: IncomingMessage) -> Result<Routed, DispatchError> {
        if !self.whitelist.is_allowed(message.user_id) {
            debug!(user_id = message.user_id, "Message from non-whitelisted user");
            self.reply(message.target(), &self.messages.access_denied_info)
                .await?;
            return Ok(Routed::Denied);
        }

        let target = message.target();
        let user_id = message.user_id;
        match message.content {
            IncomingContent::Command(command) => self.handle_command(target, user_id, command).await,
            IncomingContent::Text(text) if message.is_private => {
                self.handle_text(target, user_id, text.trim()).await
            }
            IncomingContent::Text(_) => Ok(Routed::Ignored),
            IncomingContent::Media(media) if message.is_private || media.caption.is_some() => {
                self.handle_media(target, user_id, media).await
            }
            IncomingContent::Media(_) => Ok(Routed::Ignored),
        }
    }

    async fn handle_command(
        &self,
        target: ReplyTarget,
        user_id: i64,
        command: Command,
    ) -> Result<Routed, DispatchError> {
        info!(user_id = user_id, command = ?command, "Received command");

        match command {
            Command::Start => {
                self.reply(target, WELCOME).await?;
                Ok(Routed::Replied)
            }
            Command::Gemini(text) => self.ask(target, user_id, "gemini", &self.model, &text).await,
            Command::GeminiPro(text) => {
                self.ask(target, user_id, "gemini_pro", &self.pro_model, &text)
                    .await
            }
            Command::Clear => {
                let removed = self.sessions.clear(&user_id.to_string()).await;
                self.pending_youtube.write().await.remove(&user_id);
                debug!(user_id = user_id, removed = removed, "History cleared");
                self.reply(target, HISTORY_CLEARED).await?;
                Ok(Routed::Replied)
            }
            Command::Youtube(args) => {
                let args = args.trim();
                let (url, prompt) = match args.split_once(char::is_whitespace) {
                    Some((url, prompt)) => (url, prompt.trim()),
                    None => (args, ""),
                };
                if find_youtube_url(url).is_none() {
                    self.reply(target, YOUTUBE_HINT).await?;
                    return Ok(Routed::Replied);
                }
                self.youtube(target, user_id, url, prompt).await
            }
        }
    }

    async fn ask(
        &self,
        target: ReplyTarget,
        user_id: i64,
        command: &str,
        model: &str,
        text: &str,
    ) -> Result<Routed, DispatchError> {
        let text = text.trim();
        if text.is_empty() {
            let hint = format!(
                "Please add what you want to say after /{command}.\nFor example: `/{command} Who is John Lennon?`"
            );
            self.reply(target, &hint).await?;
            return Ok(Routed::Replied);
        }
        Ok(self
            .relay_parts(target, user_id, model, vec![PromptPart::text(text)])
            .await)
    }

    async fn handle_text(
        &self,
        target: ReplyTarget,
        user_id: i64,
        text: &str,
    ) -> Result<Routed, DispatchError> {
        if text.is_empty() {
            return Ok(Routed::Ignored);
        }

        match find_youtube_url(text) {
            Some((url, end)) => self.youtube(target, user_id, url, text[end..].trim()).await,
            None => {
                let pending = self.pending_youtube.write().await.remove(&user_id);
                match pending {
                    Some(url) => self.youtube(target, user_id, &url, text).await,
                    None => Ok(self
                        .relay_parts(target, user_id, &self.model, vec![PromptPart::text(text)])
                        .await),
                }
            }
        }
    }

    /// Relays a question about a video, or remembers the link until a prompt arrives.
    async fn youtube(
        &self,
        target: ReplyTarget,
        user_id: i64,
        url: &str,
        prompt: &str,
    ) -> Result<Routed, DispatchError> {
        if prompt.is_empty() {
            self.pending_youtube
                .write()
                .await
                .insert(user_id, url.to_string());
            debug!(user_id = user_id, url = url, "YouTube link waiting for a prompt");
            self.reply(target, ASK_VIDEO_PROMPT).await?;
            return Ok(Routed::Replied);
        }

        let parts = vec![
            PromptPart::file_uri(url, YOUTUBE_MIME_TYPE),
            PromptPart::text(prompt),
        ];
        Ok(self.relay_parts(target, user_id, &self.model, parts).await)
    }

    async fn handle_media(
        &self,
        target: ReplyTarget,
        user_id: i64,
        media: MediaAttachment,
    ) -> Result<Routed, DispatchError> {
        let data = match self.dispatcher.download(&media.file_id).await {
            Ok(data) => data,
            Err(e) => {
                let error = BotError::download(e.to_string());
                warn!(user_id = user_id, file_id = %media.file_id, error = %error, "Attachment download failed");
                let text = format!("{}\nError details: {}", self.messages.error_info, error);
                self.dispatcher.reply(target, &text, TextFormat::Plain).await?;
                return Ok(Routed::Replied);
            }
        };

        let prompt = media
            .caption
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(media.kind.default_prompt());

        debug!(
            user_id = user_id,
            kind = ?media.kind,
            mime_type = %media.mime_type,
            bytes = data.len(),
            "Relaying attachment"
        );
        let parts = vec![
            PromptPart::inline(media.mime_type, data),
            PromptPart::text(prompt),
        ];
        Ok(self.relay_parts(target, user_id, &self.model, parts).await)
    }

    async fn relay_parts(
        &self,
        target: ReplyTarget,
        user_id: i64,
        model: &str,
        parts: Vec<PromptPart>,
    ) -> Routed {
        let outcome = self
            .relay
            .relay(RelayRequest {
                target,
                user_id: user_id.to_string(),
                model: model.to_string(),
                parts,
            })
            .await;
        Routed::Relayed(outcome)
    }

    async fn reply(&self, target: ReplyTarget, text: &str) -> Result<(), DispatchError> {
        safe_reply(&*self.dispatcher, target, text).await.map(|_| ())
    }

    pub async fn pending_youtube_url(&self, user_id: i64) -> Option<String> {
        self.pending_youtube.read().await.get(&user_id).cloned()
    }
}
