use crate::types::{Message, Role};

/// Title shown for sessions without any user text.
pub const FALLBACK_TITLE: &str = "New Chat";
/// Longest title kept before truncation, in characters.
pub const MAX_TITLE_CHARS: usize = 40;
const ELLIPSIS: &str = "...";

/// Short display title: the first text part of the first user message,
/// trimmed and cut to `MAX_TITLE_CHARS` characters plus an ellipsis.
///
/// Total over any transcript, including an empty one.
pub fn derive_title(messages: &[Message]) -> String {
    let text = messages
        .iter()
        .find(|m| m.role == Role::User)
        .and_then(|m| m.parts.iter().find_map(|p| p.as_text()))
        .map(str::trim)
        .unwrap_or_default();

    if text.is_empty() {
        return FALLBACK_TITLE.to_string();
    }

    match text.char_indices().nth(MAX_TITLE_CHARS) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &text[..cut]),
        None => text.to_string(),
    }
}
