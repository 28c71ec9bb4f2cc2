//! Normalization of text chunks and names.
//!
//! Offsets stored for tags and tokens point into text normalized by
//! [`clean`], so every producer of offsets must go through these helpers.

use lazy_static::lazy_static;
use regex::Regex;

/// Maximum length, in chars, of tag names, attribute names, document names
/// and tokens.
pub const MAX_NAME_LENGTH: usize = 255;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
}

/// Trim and collapse whitespace runs to a single space.
///
/// ```
/// use tagstore::analysis::normalize::clean;
///
/// assert_eq!(clean("  The   quick,\n quick fox "), "The quick, quick fox");
/// ```
pub fn clean(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Trim, replace whitespace runs with `_` and lowercase.
pub fn strict_clean(text: &str) -> String {
    WHITESPACE
        .replace_all(text.trim(), "_")
        .to_lowercase()
}

/// Truncate `text` to at most `max_chars` chars.
///
/// Returns `true` when something was cut.
pub fn cut(text: &mut String, max_chars: usize) -> bool {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => {
            text.truncate(byte_index);
            true
        }
        None => false,
    }
}

/// Normalize a tag name: clean, case-fold and truncate.
pub fn tag_name(raw: &str) -> String {
    let mut name = clean(raw).to_lowercase();
    cut(&mut name, MAX_NAME_LENGTH);
    name
}

/// Normalize an attribute name: strict clean and truncate.
pub fn attribute_name(raw: &str) -> String {
    let mut name = strict_clean(raw);
    cut(&mut name, MAX_NAME_LENGTH);
    name
}

/// Number of chars in `text`; offsets are counted in chars.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}
