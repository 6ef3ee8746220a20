//! Shared utility functions.

/// One-line preview of `text` for logs and progress output.
///
/// Newlines and runs of whitespace collapse to single spaces; anything past
/// `max_chars` characters is cut and marked with `…`.
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let kept: String = flat.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", kept)
}
