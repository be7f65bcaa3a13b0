//! Unicode-safe helpers for working with UTF-8 strings.

use unicode_width::UnicodeWidthStr;

/// Convert a character index (0-based) to a byte index in the given string.
/// If `n` exceeds the number of characters, returns `s.len()`.
pub fn char_to_byte_index(s: &str, n: usize) -> usize {
    match s.char_indices().nth(n) {
        Some((i, _)) => i,
        None => s.len(),
    }
}

/// Terminal columns taken by the first `n` characters of `s`.
pub fn display_width_to(s: &str, n: usize) -> usize {
    s[..char_to_byte_index(s, n)].width()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_multibyte_text() {
        assert_eq!(char_to_byte_index("héllo", 2), 3);
        assert_eq!(char_to_byte_index("héllo", 99), 6);
    }

    #[test]
    fn wide_characters_take_two_columns() {
        assert_eq!(display_width_to("日本語", 2), 4);
        assert_eq!(display_width_to("abc", 1), 1);
    }
}
