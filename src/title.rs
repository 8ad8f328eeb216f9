//! Conversation title derivation
//!
//! A conversation starts with a placeholder title and is renamed after its first
//! completed exchange, using the opening of the first user message.

/// Default number of characters kept from the first message
pub const DEFAULT_TITLE_MAX_CHARS: usize = 20;

/// Appended when the message was longer than the kept prefix
pub const DEFAULT_TITLE_MARKER: &str = "...";

/// Build a title from the first `max_chars` characters of `text`.
///
/// Counts characters rather than bytes so multi-byte text is never split.
/// `marker` is appended only when something was cut off.
pub fn derive_title(text: &str, max_chars: usize, marker: &str) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], marker),
        None => text.to_string(),
    }
}
