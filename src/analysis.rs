//! Text analysis for the decomposition pipeline.
//!
//! - [`normalize`] - whitespace and name normalization applied to every
//!   incoming chunk, tag name and attribute
//! - [`token`] - the token type produced by tokenizers
//! - [`tokenizer`] - tokenizers feeding the inverted index pass

pub mod normalize;
pub mod token;
pub mod tokenizer;
