//! Regex-based tokenizer implementation.

use std::sync::Arc;

use regex::Regex;

use super::Tokenizer;
use crate::analysis::normalize::{MAX_NAME_LENGTH, cut};
use crate::analysis::token::{Token, TokenStream};
use crate::error::{Result, TagstoreError};

/// Default minimum token length in chars.
pub const DEFAULT_MIN_TOKEN_LENGTH: usize = 2;

/// A regex-based tokenizer that extracts maximal runs of word characters.
///
/// Tokens are lowercased and truncated to [`MAX_NAME_LENGTH`] chars. Offsets
/// are reported in chars of the input text, not bytes.
#[derive(Clone, Debug)]
pub struct RegexTokenizer {
    /// The regex pattern used to extract tokens
    pattern: Arc<Regex>,
}

impl RegexTokenizer {
    /// Create a tokenizer matching runs of two or more word characters.
    pub fn new() -> Result<Self> {
        Self::with_min_length(DEFAULT_MIN_TOKEN_LENGTH)
    }

    /// Create a tokenizer matching runs of at least `min_length` word characters.
    pub fn with_min_length(min_length: usize) -> Result<Self> {
        if min_length == 0 {
            return Err(TagstoreError::invalid_argument(
                "minimum token length must be at least 1",
            ));
        }
        Self::with_pattern(&format!(r"\w{{{min_length},}}"))
    }

    /// Create a new regex tokenizer with a custom pattern.
    pub fn with_pattern(pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| TagstoreError::invalid_argument(format!("Invalid regex pattern: {e}")))?;

        Ok(RegexTokenizer {
            pattern: Arc::new(regex),
        })
    }
}

impl Tokenizer for RegexTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let mut tokens = Vec::new();
        // Matches come in order, so byte offsets are converted to char
        // offsets by counting only the chars between consecutive matches.
        let mut byte_cursor = 0;
        let mut char_cursor = 0;

        for (position, mat) in self.pattern.find_iter(text).enumerate() {
            char_cursor += text[byte_cursor..mat.start()].chars().count();
            let start = char_cursor;
            let width = mat.as_str().chars().count();
            char_cursor += width;
            byte_cursor = mat.end();

            let mut token_text = mat.as_str().to_lowercase();
            cut(&mut token_text, MAX_NAME_LENGTH);

            tokens.push(Token::with_offsets(
                token_text,
                position,
                start,
                start + width,
            ));
        }

        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "regex"
    }
}
