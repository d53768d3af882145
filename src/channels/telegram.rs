use async_trait::async_trait;
use bytes::Bytes;
use teloxide::RequestError;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, MessageId, ParseMode, ReplyParameters};
use thiserror::Error;

use crate::channels::markdown::to_markdown_v2;
use crate::channels::{
    DispatchError, MAX_MESSAGE_LENGTH, MessageDispatcher, ReplyTarget, SentMessage, TextFormat,
};

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Invalid token format: {0}. Check @BotFather (https://t.me/BotFather) for a valid token.")]
    InvalidTokenFormat(String),

    #[error("Telegram API error: {0}")]
    ApiError(String),
}

/// [`MessageDispatcher`] backed by the Telegram Bot API.
///
/// Markdown text is converted to MarkdownV2 before sending.
#[derive(Clone)]
pub struct TelegramDispatcher {
    bot: Bot,
}

impl TelegramDispatcher {
    /// Creates a dispatcher for the bot identified by `token`.
    ///
    /// Token format should be: "123456789:ABCdefGHIjklMNOpqrsTUVwxyz"
    pub fn new(token: &str) -> Result<Self, TelegramError> {
        if !is_valid_token_format(token) {
            return Err(TelegramError::InvalidTokenFormat(
                "Token must be in format: digits:alphanumeric (e.g., 123456789:ABC...)".to_string(),
            ));
        }
        Ok(Self {
            bot: Bot::new(token),
        })
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

/// Renders `text` for the wire, or rejects the formatting up front when the
/// escaped form no longer fits in one message.
fn render(text: &str, format: TextFormat) -> Result<(String, Option<ParseMode>), DispatchError> {
    match format {
        TextFormat::Plain => Ok((text.to_string(), None)),
        TextFormat::Markdown => {
            let converted = to_markdown_v2(text);
            if converted.chars().count() > MAX_MESSAGE_LENGTH {
                return Err(DispatchError::FormatRejected(
                    "escaped text exceeds the message length limit".to_string(),
                ));
            }
            Ok((converted, Some(ParseMode::MarkdownV2)))
        }
    }
}

/// Maps a Bot API failure onto the dispatcher's error kinds.
pub fn classify_error(description: &str) -> DispatchError {
    let lower = description.to_lowercase();
    if lower.contains("message is not modified") {
        DispatchError::NotModified
    } else if lower.contains("can't parse entities") || lower.contains("can't parse") {
        DispatchError::FormatRejected(description.to_string())
    } else {
        DispatchError::Other(description.to_string())
    }
}

fn request_error(err: RequestError) -> DispatchError {
    classify_error(&err.to_string())
}

#[async_trait]
impl MessageDispatcher for TelegramDispatcher {
    async fn reply(
        &self,
        to: ReplyTarget,
        text: &str,
        format: TextFormat,
    ) -> Result<SentMessage, DispatchError> {
        let (body, parse_mode) = render(text, format)?;

        let mut request = self
            .bot
            .send_message(ChatId(to.chat_id), body)
            .reply_parameters(ReplyParameters::new(MessageId(to.message_id)));
        if let Some(mode) = parse_mode {
            request = request.parse_mode(mode);
        }

        let sent = request.await.map_err(request_error)?;
        tracing::debug!(
            chat_id = %to.chat_id,
            message_id = sent.id.0,
            "Sent Telegram reply"
        );
        Ok(SentMessage {
            chat_id: sent.chat.id.0,
            message_id: sent.id.0,
        })
    }

    async fn edit(
        &self,
        sent: SentMessage,
        text: &str,
        format: TextFormat,
    ) -> Result<(), DispatchError> {
        let (body, parse_mode) = render(text, format)?;

        let mut request =
            self.bot
                .edit_message_text(ChatId(sent.chat_id), MessageId(sent.message_id), body);
        if let Some(mode) = parse_mode {
            request = request.parse_mode(mode);
        }

        request.await.map_err(request_error)?;
        Ok(())
    }

    async fn delete(&self, sent: SentMessage) -> Result<(), DispatchError> {
        self.bot
            .delete_message(ChatId(sent.chat_id), MessageId(sent.message_id))
            .await
            .map_err(request_error)?;
        Ok(())
    }

    async fn send_typing(&self, chat_id: i64) -> Result<(), DispatchError> {
        self.bot
            .send_chat_action(ChatId(chat_id), ChatAction::Typing)
            .await
            .map_err(request_error)?;
        Ok(())
    }

    async fn download(&self, file_id: &str) -> Result<Bytes, DispatchError> {
        let file = self
            .bot
            .get_file(file_id)
            .await
            .map_err(request_error)?;

        let mut buffer: Vec<u8> = Vec::with_capacity(download_capacity(file.size));
        self.bot
            .download_file(&file.path, &mut buffer)
            .await
            .map_err(|e| DispatchError::Other(format!("Download failed: {}", e)))?;

        tracing::debug!(file_id = file_id, bytes = buffer.len(), "Downloaded Telegram file");
        Ok(Bytes::from(buffer))
    }
}

/// Bot API downloads are capped at 20 MB
const MAX_DOWNLOAD_BYTES: u32 = 20 * 1024 * 1024;

/// Buffer size for a download. Unknown sizes are reported as `u32::MAX`.
fn download_capacity(reported_size: u32) -> usize {
    reported_size.min(MAX_DOWNLOAD_BYTES) as usize
}

/// Validates Telegram bot token format.
///
/// Expected format: "123456789:ABCdefGHIjklMNOpqrsTUVwxyz"
/// - Bot ID must be all digits
/// - Must contain exactly one colon separator
/// - Secret part must be non-empty
pub fn is_valid_token_format(token: &str) -> bool {
    let Some((bot_id, secret)) = token.split_once(':') else {
        return false;
    };

    if bot_id.is_empty() || !bot_id.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    !secret.is_empty() && !secret.contains(':')
}
