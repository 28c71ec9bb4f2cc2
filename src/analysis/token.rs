//! Token types produced by tokenizers.
//!
//! Offsets are char offsets into the normalized document text, the same unit
//! used by tag offsets, so a token position can be matched against the tag
//! intervals that enclose it.
//!
//! ```
//! use tagstore::analysis::token::Token;
//!
//! let token = Token::with_offsets("quick", 1, 4, 9);
//! assert_eq!(token.text, "quick");
//! assert_eq!(token.start_offset, 4);
//! assert_eq!(token.char_len(), 5);
//! ```

use serde::{Deserialize, Serialize};

/// A token represents a single unit of text after tokenization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The text content of the token
    pub text: String,

    /// The position of the token in the token stream (0-based)
    pub position: usize,

    /// The char offset where this token starts in the text
    pub start_offset: usize,

    /// The char offset just past the end of this token
    pub end_offset: usize,
}

/// A stream of tokens.
pub type TokenStream = Box<dyn Iterator<Item = Token> + Send>;

impl Token {
    /// Create a new token with text, position, and char offsets.
    pub fn with_offsets<S: Into<String>>(
        text: S,
        position: usize,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset,
            end_offset,
        }
    }

    /// Length of the token in chars.
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }

    /// Check if the token is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
