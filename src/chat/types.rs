use teloxide::utils::command::BotCommands;

use crate::channels::ReplyTarget;

/// Bot commands, parsed from `/name args` (and `/name@bot args` in groups).
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "snake_case", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show the welcome message")]
    Start,
    #[command(description = "chat with the default model")]
    Gemini(String),
    #[command(description = "chat with the pro model")]
    GeminiPro(String),
    #[command(description = "ask about a YouTube video: /youtube <url> [prompt]")]
    Youtube(String),
    #[command(description = "clear the conversation history")]
    Clear,
}

/// Kind of an uploaded attachment, which decides the default prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Pdf,
    Audio,
}

impl MediaKind {
    pub fn default_prompt(&self) -> &'static str {
        match self {
            MediaKind::Image => "Describe this image.",
            MediaKind::Pdf => "Summarize this document.",
            MediaKind::Audio => "Transcribe and summarize this audio.",
        }
    }

    /// Classifies a document by MIME type. Other documents are not supported.
    pub fn from_document_mime(mime_type: &str) -> Option<Self> {
        if mime_type.starts_with("image/") {
            Some(MediaKind::Image)
        } else if mime_type == "application/pdf" {
            Some(MediaKind::Pdf)
        } else if mime_type.starts_with("audio/") {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }
}

/// An attachment that has not been downloaded yet
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAttachment {
    pub kind: MediaKind,
    pub file_id: String,
    pub mime_type: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IncomingContent {
    Command(Command),
    Text(String),
    Media(MediaAttachment),
}

/// A user message, stripped of platform details
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub user_id: i64,
    pub chat_id: i64,
    pub message_id: i32,
    pub is_private: bool,
    pub content: IncomingContent,
}

impl IncomingMessage {
    pub fn target(&self) -> ReplyTarget {
        ReplyTarget {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }
}
