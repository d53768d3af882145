/// Splits `text` into chunks of at most `limit` characters.
///
/// A chunk ends at the last newline inside the window when there is one; the
/// newline itself starts the next chunk. Concatenating the chunks gives back
/// `text`. Empty input yields no chunks.
pub fn split_text(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    if limit == 0 {
        return vec![text.to_string()];
    }

    let mut rest = text;
    while let Some(window_end) = byte_offset(rest, limit) {
        let split_at = match rest[..window_end].rfind('\n') {
            Some(pos) if pos > 0 => pos,
            _ => window_end,
        };
        chunks.push(rest[..split_at].to_string());
        rest = &rest[split_at..];
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

/// Splits `text` after exactly `limit` characters, if it is longer than that.
pub fn split_at_chars(text: &str, limit: usize) -> Option<(&str, &str)> {
    byte_offset(text, limit).map(|at| text.split_at(at))
}

/// Byte offset of character number `chars`, when the text has more
/// characters than that.
fn byte_offset(text: &str, chars: usize) -> Option<usize> {
    let mut indices = text.char_indices().skip(chars);
    indices.next().map(|(offset, _)| offset)
}
