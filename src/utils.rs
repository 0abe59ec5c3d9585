//! Text utilities shared by handlers and delivery notices.

/// Truncates a string to at most `max_chars` characters.
///
/// Telegram rejects messages over 4096 characters, so error text embedded
/// in a user notice is bounded with this before formatting.
///
/// # Examples
///
/// ```
/// use linkdrop::utils::truncate_str;
/// let s = "Привет, мир!";
/// assert_eq!(truncate_str(s, 6), "Привет");
/// ```
#[must_use]
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}
