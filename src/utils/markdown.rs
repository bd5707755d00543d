/// Helpers for Telegram MarkdownV2 text.
///
/// Every character with special meaning in MarkdownV2 must be escaped,
/// including the backslash itself, or Telegram rejects the message.
const SPECIAL: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Escapes user-provided text for MarkdownV2.
///
/// ```
/// use todo_reminder_bot::utils::markdown::escape_markdown;
///
/// assert_eq!(escape_markdown("Buy milk (2L)!"), "Buy milk \\(2L\\)\\!");
/// ```
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

pub fn bold(text: &str) -> String {
    format!("*{}*", escape_markdown(text))
}

/// Shortens plain text to `max_chars` characters, marking the cut with `…`.
pub fn truncate_label(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut label: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    label.push('…');
    label
}
