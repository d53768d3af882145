//! Conversion of model Markdown into Telegram MarkdownV2
//!
//! MarkdownV2 rejects any unescaped reserved character, so everything that is
//! not recognized as formatting is escaped. Recognized: fenced code blocks,
//! inline code, `**bold**`, `[label](url)` links, `#` headings and `*`/`-`
//! bullets.

const RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

/// Converts `text` to MarkdownV2.
pub fn to_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    let mut in_code_block = false;

    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }

        if line.trim_start().starts_with("```") {
            in_code_block = !in_code_block;
            out.push_str(line.trim_start());
            continue;
        }

        if in_code_block {
            out.push_str(&escape_code(line));
        } else {
            out.push_str(&convert_line(line));
        }
    }

    // An unterminated fence would make Telegram reject the whole message.
    if in_code_block {
        out.push_str("\n```");
    }
    out
}

fn convert_line(line: &str) -> String {
    let trimmed = line.trim_start();
    let indent = &line[..line.len() - trimmed.len()];

    if let Some(heading) = heading_text(trimmed) {
        let heading = heading.replace("**", "");
        return format!("{}*{}*", indent, convert_inline(&heading));
    }

    if let Some(item) = trimmed
        .strip_prefix("* ")
        .or_else(|| trimmed.strip_prefix("- "))
    {
        return format!("{}• {}", indent, convert_inline(item));
    }

    format!("{}{}", indent, convert_inline(trimmed))
}

fn heading_text(line: &str) -> Option<&str> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    line[level..].strip_prefix(' ').map(str::trim)
}

fn convert_inline(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c == '`' {
            if let Some(end) = find_char(&chars, i + 1, '`') {
                let code: String = chars[i + 1..end].iter().collect();
                out.push('`');
                out.push_str(&escape_code(&code));
                out.push('`');
                i = end + 1;
                continue;
            }
        }

        if c == '*' && chars.get(i + 1) == Some(&'*') {
            if let Some(end) = find_pair(&chars, i + 2, '*') {
                if end > i + 2 {
                    let inner: String = chars[i + 2..end].iter().collect();
                    out.push('*');
                    out.push_str(&convert_inline(&inner));
                    out.push('*');
                    i = end + 2;
                    continue;
                }
            }
        }

        if c == '[' {
            if let Some((label_end, url_end)) = find_link(&chars, i) {
                let label: String = chars[i + 1..label_end].iter().collect();
                let url: String = chars[label_end + 2..url_end].iter().collect();
                out.push('[');
                out.push_str(&escape(&label));
                out.push_str("](");
                out.push_str(&escape_url(&url));
                out.push(')');
                i = url_end + 1;
                continue;
            }
        }

        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
        i += 1;
    }

    out
}

fn find_char(chars: &[char], from: usize, target: char) -> Option<usize> {
    chars
        .get(from..)?
        .iter()
        .position(|c| *c == target)
        .map(|p| p + from)
}

fn find_pair(chars: &[char], from: usize, target: char) -> Option<usize> {
    (from..chars.len().saturating_sub(1)).find(|&j| chars[j] == target && chars[j + 1] == target)
}

/// Returns the positions of `]` and the closing `)` of a link starting at `start`.
fn find_link(chars: &[char], start: usize) -> Option<(usize, usize)> {
    let label_end = find_char(chars, start + 1, ']')?;
    if chars.get(label_end + 1) != Some(&'(') {
        return None;
    }
    let url_end = find_char(chars, label_end + 2, ')')?;
    if url_end == label_end + 2 {
        return None;
    }
    Some((label_end, url_end))
}

/// Escapes every reserved character.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn escape_code(text: &str) -> String {
    text.replace('\\', "\\\\").replace('`', "\\`")
}

fn escape_url(url: &str) -> String {
    url.replace('\\', "\\\\").replace(')', "\\)")
}
