use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::{debug, warn};

pub mod markdown;
#[cfg(test)]
pub mod mock;
pub mod telegram;

pub use markdown::to_markdown_v2;
pub use telegram::{TelegramDispatcher, TelegramError, is_valid_token_format};

/// Telegram's maximum message length, in characters
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// The user message a reply is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyTarget {
    pub chat_id: i64,
    pub message_id: i32,
}

/// A message the bot has sent and may edit later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SentMessage {
    pub chat_id: i64,
    pub message_id: i32,
}

/// How outgoing text should be interpreted by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// Model Markdown, converted to the platform's rich text
    Markdown,
    Plain,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// The platform could not parse the rich-text formatting
    #[error("Formatting rejected: {0}")]
    FormatRejected(String),

    /// The edit would not change the message
    #[error("Message is not modified")]
    NotModified,

    #[error("Chat platform error: {0}")]
    Other(String),
}

/// Chat platform primitives used by the relay and the router.
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    /// Sends `text` as a reply to `to`.
    async fn reply(
        &self,
        to: ReplyTarget,
        text: &str,
        format: TextFormat,
    ) -> Result<SentMessage, DispatchError>;

    /// Replaces the text of a message sent earlier.
    async fn edit(&self, sent: SentMessage, text: &str, format: TextFormat)
    -> Result<(), DispatchError>;

    async fn delete(&self, sent: SentMessage) -> Result<(), DispatchError>;

    /// Shows the "typing" indicator in `chat_id`.
    async fn send_typing(&self, chat_id: i64) -> Result<(), DispatchError>;

    /// Fetches the content of an uploaded file.
    async fn download(&self, file_id: &str) -> Result<Bytes, DispatchError>;
}

/// Edits `sent`, falling back to plain text when formatting is rejected.
///
/// Never fails: an unchanged message is ignored and other errors are logged.
pub async fn safe_edit(dispatcher: &dyn MessageDispatcher, sent: SentMessage, text: &str) {
    if text.is_empty() {
        return;
    }

    let result = match dispatcher.edit(sent, text, TextFormat::Markdown).await {
        Err(DispatchError::FormatRejected(reason)) => {
            debug!(
                message_id = sent.message_id,
                reason = %reason,
                "Markdown rejected, retrying edit as plain text"
            );
            dispatcher.edit(sent, text, TextFormat::Plain).await
        }
        other => other,
    };

    match result {
        Ok(()) | Err(DispatchError::NotModified) => {}
        Err(e) => warn!(
            chat_id = sent.chat_id,
            message_id = sent.message_id,
            error = %e,
            "Failed to edit message"
        ),
    }
}

/// Replies with `text`, falling back to plain text when formatting is rejected.
pub async fn safe_reply(
    dispatcher: &dyn MessageDispatcher,
    to: ReplyTarget,
    text: &str,
) -> Result<SentMessage, DispatchError> {
    match dispatcher.reply(to, text, TextFormat::Markdown).await {
        Err(DispatchError::FormatRejected(reason)) => {
            debug!(reason = %reason, "Markdown rejected, retrying reply as plain text");
            dispatcher.reply(to, text, TextFormat::Plain).await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::mock::{MockDispatcher, Operation};

    const TARGET: ReplyTarget = ReplyTarget {
        chat_id: 7,
        message_id: 1,
    };

    #[tokio::test]
    async fn test_safe_edit_falls_back_to_plain() {
        let dispatcher = MockDispatcher::new().reject_markdown();
        let sent = dispatcher.reply(TARGET, "x", TextFormat::Plain).await.unwrap();

        safe_edit(&dispatcher, sent, "*broken").await;

        assert_eq!(dispatcher.text_of(sent).as_deref(), Some("*broken"));
        assert!(dispatcher.operations().contains(&Operation::Edit {
            message_id: sent.message_id,
            text: "*broken".to_string(),
            format: TextFormat::Plain,
        }));
    }

    #[tokio::test]
    async fn test_safe_edit_ignores_unchanged_and_missing_messages() {
        let dispatcher = MockDispatcher::new();
        let sent = dispatcher.reply(TARGET, "same", TextFormat::Plain).await.unwrap();

        safe_edit(&dispatcher, sent, "same").await;
        safe_edit(
            &dispatcher,
            SentMessage {
                chat_id: 7,
                message_id: 999,
            },
            "gone",
        )
        .await;

        assert_eq!(dispatcher.text_of(sent).as_deref(), Some("same"));
    }

    #[tokio::test]
    async fn test_safe_edit_skips_empty_text() {
        let dispatcher = MockDispatcher::new();
        let sent = dispatcher.reply(TARGET, "keep", TextFormat::Plain).await.unwrap();

        safe_edit(&dispatcher, sent, "").await;

        assert_eq!(dispatcher.text_of(sent).as_deref(), Some("keep"));
        assert_eq!(dispatcher.operations().len(), 1);
    }

    #[tokio::test]
    async fn test_safe_reply_falls_back_to_plain() {
        let dispatcher = MockDispatcher::new().reject_markdown();
        let sent = safe_reply(&dispatcher, TARGET, "hello_").await.unwrap();
        assert_eq!(dispatcher.text_of(sent).as_deref(), Some("hello_"));
    }
}
