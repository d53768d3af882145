//! Recording dispatcher for testing
//!
//! Behaves like a small chat: sent messages get increasing ids, edits that do
//! not change the text report `NotModified`, and deleted messages disappear.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::channels::{DispatchError, MessageDispatcher, ReplyTarget, SentMessage, TextFormat};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Reply {
        message_id: i32,
        text: String,
        format: TextFormat,
    },
    Edit {
        message_id: i32,
        text: String,
        format: TextFormat,
    },
    Delete {
        message_id: i32,
    },
    Typing,
}

pub struct MockDispatcher {
    next_id: Mutex<i32>,
    messages: Mutex<BTreeMap<i32, String>>,
    operations: Mutex<Vec<Operation>>,
    files: Mutex<HashMap<String, Bytes>>,
    reject_markdown: bool,
    fail_deletes: bool,
    fail_replies: bool,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(100),
            messages: Mutex::new(BTreeMap::new()),
            operations: Mutex::new(Vec::new()),
            files: Mutex::new(HashMap::new()),
            reject_markdown: false,
            fail_deletes: false,
            fail_replies: false,
        }
    }

    /// Every Markdown request fails with `FormatRejected`
    pub fn reject_markdown(mut self) -> Self {
        self.reject_markdown = true;
        self
    }

    pub fn fail_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn fail_replies(mut self) -> Self {
        self.fail_replies = true;
        self
    }

    pub fn with_file(self, file_id: &str, data: &[u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(file_id.to_string(), Bytes::copy_from_slice(data));
        self
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.operations.lock().unwrap().clone()
    }

    /// Current text of every message still in the chat, oldest first
    pub fn visible_texts(&self) -> Vec<String> {
        self.messages.lock().unwrap().values().cloned().collect()
    }

    pub fn text_of(&self, sent: SentMessage) -> Option<String> {
        self.messages.lock().unwrap().get(&sent.message_id).cloned()
    }

    /// Texts of all replies, in order
    pub fn replies(&self) -> Vec<String> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                Operation::Reply { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    fn check_format(&self, format: TextFormat) -> Result<(), DispatchError> {
        if self.reject_markdown && format == TextFormat::Markdown {
            return Err(DispatchError::FormatRejected(
                "Bad Request: can't parse entities".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MockDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageDispatcher for MockDispatcher {
    async fn reply(
        &self,
        to: ReplyTarget,
        text: &str,
        format: TextFormat,
    ) -> Result<SentMessage, DispatchError> {
        if self.fail_replies {
            return Err(DispatchError::Other("Forbidden: bot was blocked by the user".to_string()));
        }
        self.check_format(format)?;

        let message_id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        self.messages.lock().unwrap().insert(message_id, text.to_string());
        self.operations.lock().unwrap().push(Operation::Reply {
            message_id,
            text: text.to_string(),
            format,
        });

        Ok(SentMessage {
            chat_id: to.chat_id,
            message_id,
        })
    }

    async fn edit(
        &self,
        sent: SentMessage,
        text: &str,
        format: TextFormat,
    ) -> Result<(), DispatchError> {
        self.check_format(format)?;

        let mut messages = self.messages.lock().unwrap();
        let current = messages
            .get_mut(&sent.message_id)
            .ok_or_else(|| DispatchError::Other("Bad Request: message to edit not found".to_string()))?;
        if current.as_str() == text {
            return Err(DispatchError::NotModified);
        }
        *current = text.to_string();

        self.operations.lock().unwrap().push(Operation::Edit {
            message_id: sent.message_id,
            text: text.to_string(),
            format,
        });
        Ok(())
    }

    async fn delete(&self, sent: SentMessage) -> Result<(), DispatchError> {
        if self.fail_deletes {
            return Err(DispatchError::Other("Bad Request: message can't be deleted".to_string()));
        }
        self.messages.lock().unwrap().remove(&sent.message_id);
        self.operations.lock().unwrap().push(Operation::Delete {
            message_id: sent.message_id,
        });
        Ok(())
    }

    async fn send_typing(&self, _chat_id: i64) -> Result<(), DispatchError> {
        self.operations.lock().unwrap().push(Operation::Typing);
        Ok(())
    }

    async fn download(&self, file_id: &str) -> Result<Bytes, DispatchError> {
        self.files
            .lock()
            .unwrap()
            .get(file_id)
            .cloned()
            .ok_or_else(|| DispatchError::Other(format!("Bad Request: invalid file_id {}", file_id)))
    }
}
