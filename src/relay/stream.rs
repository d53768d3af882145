use std::time::{Duration, Instant};

use crate::channels::SentMessage;
use crate::providers::GroundingMetadata;
use crate::relay::split::split_at_chars;

/// Accumulator threaded through one streamed reply.
///
/// `messages` and `buffers` are parallel: the last pair is the active message
/// that new text is appended to.
#[derive(Debug)]
pub struct StreamState {
    messages: Vec<SentMessage>,
    buffers: Vec<String>,
    full_text: String,
    grounding: Option<GroundingMetadata>,
    total_tokens: Option<u64>,
    last_flush: Instant,
    last_typing: Instant,
    dirty: bool,
}

/// What finalization has to do to make the chat match the final text
#[derive(Debug, Default, PartialEq)]
pub struct FinalizePlan {
    pub edits: Vec<(SentMessage, String)>,
    pub sends: Vec<String>,
    pub deletes: Vec<SentMessage>,
}

impl StreamState {
    pub fn new(placeholder: SentMessage, now: Instant) -> Self {
        Self {
            messages: vec![placeholder],
            buffers: vec![String::new()],
            full_text: String::new(),
            grounding: None,
            total_tokens: None,
            last_flush: now,
            last_typing: now,
            dirty: false,
        }
    }

    pub fn active(&self) -> SentMessage {
        self.messages[self.messages.len() - 1]
    }

    pub fn active_text(&self) -> &str {
        &self.buffers[self.buffers.len() - 1]
    }

    pub fn messages(&self) -> &[SentMessage] {
        &self.messages
    }

    pub fn full_text(&self) -> &str {
        &self.full_text
    }

    pub fn grounding(&self) -> Option<&GroundingMetadata> {
        self.grounding.as_ref()
    }

    pub fn total_tokens(&self) -> Option<u64> {
        self.total_tokens
    }

    pub fn push_text(&mut self, text: &str) {
        self.full_text.push_str(text);
        let last = self.buffers.len() - 1;
        self.buffers[last].push_str(text);
        self.dirty = true;
    }

    /// Cuts the active buffer down to `limit` characters.
    ///
    /// Returns the text that no longer fits, which seeds the next message.
    pub fn take_overflow(&mut self, limit: usize) -> Option<String> {
        let last = self.buffers.len() - 1;
        let (head, tail) = split_at_chars(&self.buffers[last], limit)?;
        let (head, tail) = (head.to_string(), tail.to_string());
        self.buffers[last] = head;
        Some(tail)
    }

    /// Makes `sent` the active message, starting with `seed`.
    pub fn open_message(&mut self, sent: SentMessage, seed: String) {
        self.messages.push(sent);
        self.buffers.push(seed);
        self.dirty = true;
    }

    pub fn set_grounding(&mut self, grounding: GroundingMetadata) {
        self.grounding = Some(grounding);
    }

    pub fn set_total_tokens(&mut self, total: u64) {
        self.total_tokens = Some(total);
    }

    /// Whether the active buffer changed and `interval` has passed since the last flush
    pub fn flush_due(&self, now: Instant, interval: Duration) -> bool {
        self.dirty && now.saturating_duration_since(self.last_flush) >= interval
    }

    pub fn mark_flushed(&mut self, now: Instant) {
        self.last_flush = now;
        self.dirty = false;
    }

    pub fn typing_due(&self, now: Instant, interval: Duration) -> bool {
        now.saturating_duration_since(self.last_typing) > interval
    }

    pub fn mark_typing(&mut self, now: Instant) {
        self.last_typing = now;
    }

    /// Matches the final `chunks` against the messages created so far.
    pub fn finalize_plan(&self, chunks: Vec<String>) -> FinalizePlan {
        let mut plan = FinalizePlan::default();
        let mut chunks = chunks.into_iter();

        for sent in &self.messages {
            match chunks.next() {
                Some(chunk) => plan.edits.push((*sent, chunk)),
                None => plan.deletes.push(*sent),
            }
        }
        plan.sends.extend(chunks);
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: i32) -> SentMessage {
        SentMessage {
            chat_id: 1,
            message_id: id,
        }
    }

    #[test]
    fn test_overflow_moves_remainder_to_new_message() {
        let now = Instant::now();
        let mut state = StreamState::new(msg(1), now);
        state.push_text("abcdefgh");

        let tail = state.take_overflow(5).unwrap();
        assert_eq!(state.active_text(), "abcde");
        assert_eq!(tail, "fgh");

        state.open_message(msg(2), tail);
        assert_eq!(state.active(), msg(2));
        assert_eq!(state.active_text(), "fgh");
        assert!(state.take_overflow(5).is_none());
        assert_eq!(state.full_text(), "abcdefgh");
    }

    #[test]
    fn test_flush_requires_new_text_and_elapsed_interval() {
        let start = Instant::now();
        let interval = Duration::from_millis(500);
        let mut state = StreamState::new(msg(1), start);

        assert!(!state.flush_due(start + interval, interval));

        state.push_text("a");
        assert!(!state.flush_due(start + Duration::from_millis(100), interval));
        assert!(state.flush_due(start + interval, interval));

        state.mark_flushed(start + interval);
        assert!(!state.flush_due(start + interval * 3, interval));

        state.push_text("b");
        assert!(state.flush_due(start + interval, Duration::ZERO));
    }

    #[test]
    fn test_typing_interval() {
        let start = Instant::now();
        let mut state = StreamState::new(msg(1), start);
        let interval = Duration::from_secs(4);

        assert!(!state.typing_due(start + interval, interval));
        assert!(state.typing_due(start + Duration::from_millis(4001), interval));
        state.mark_typing(start + Duration::from_secs(5));
        assert!(!state.typing_due(start + Duration::from_secs(6), interval));
    }

    #[test]
    fn test_surplus_messages_are_deleted() {
        let mut state = StreamState::new(msg(1), Instant::now());
        state.open_message(msg(2), String::new());
        state.open_message(msg(3), String::new());

        let plan = state.finalize_plan(vec!["one".to_string(), "two".to_string()]);

        assert_eq!(
            plan.edits,
            vec![(msg(1), "one".to_string()), (msg(2), "two".to_string())]
        );
        assert!(plan.sends.is_empty());
        assert_eq!(plan.deletes, vec![msg(3)]);
    }

    #[test]
    fn test_extra_chunks_become_new_messages() {
        let state = StreamState::new(msg(1), Instant::now());
        let plan = state.finalize_plan(vec!["a".to_string(), "b".to_string(), "c".to_string()]);

        assert_eq!(plan.edits, vec![(msg(1), "a".to_string())]);
        assert_eq!(plan.sends, vec!["b".to_string(), "c".to_string()]);
        assert!(plan.deletes.is_empty());
    }

    #[test]
    fn test_metadata_is_last_wins() {
        let mut state = StreamState::new(msg(1), Instant::now());
        state.set_total_tokens(10);
        state.set_total_tokens(25);
        state.set_grounding(GroundingMetadata::default());
        assert_eq!(state.total_tokens(), Some(25));
        assert!(state.grounding().is_some());
    }
}
