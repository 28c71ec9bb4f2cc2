//! Error types for the Tagstore library.
//!
//! All errors are represented by the [`TagstoreError`] enum. Each variant
//! belongs to one [`ErrorScope`], which tells a batch driver how much work a
//! failure invalidates: the current document, the current input stream, or
//! the whole run.
//!
//! # Examples
//!
//! ```
//! use tagstore::error::{ErrorScope, Result, TagstoreError};
//!
//! fn close_unopened_tag() -> Result<()> {
//!     Err(TagstoreError::structure("end tag without matching start"))
//! }
//!
//! let err = close_unopened_tag().unwrap_err();
//! assert_eq!(err.scope(), ErrorScope::Document);
//! ```

use std::io;

use thiserror::Error;

use crate::store::DocumentSummary;

/// How much work an error invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Abort the current document, keep reading the stream.
    Document,
    /// Abort the current input stream, continue with the next input.
    Stream,
    /// Abort the whole run.
    Run,
}

/// The main error type for Tagstore operations.
#[derive(Error, Debug)]
pub enum TagstoreError {
    /// I/O errors (input files, spool files, output files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Row encoding/decoding errors
    #[error("Row format error: {0}")]
    Csv(#[from] csv::Error),

    /// Errors reported by the relational store
    #[error("Storage error: {0}")]
    Sql(#[from] rusqlite::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The markup tokenizer rejected its input
    #[error("Markup error: {0}")]
    Markup(String),

    /// Offset, nesting or stack invariant violated
    #[error("Structure error: {0}")]
    Structure(String),

    /// The interner could not obtain an id within its retry budget
    #[error("Cannot resolve identifier for {kind} '{value}'")]
    Identity { kind: String, value: String },

    /// A document name is already present in the corpus
    #[error("Duplicate document: '{0}' already exists")]
    DuplicateDocument(String),

    /// `open()` called while buffers are still open
    #[error("Buffers already opened: {}", .0.join(", "))]
    BuffersOpen(Vec<String>),

    /// A boundary tag closed above the depth it opened at
    #[error("Document boundary mismatch: {0}")]
    StreamBoundary(String),

    /// Invalid or missing configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Store-level failures other than driver errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Lookup returned nothing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lookup by name matched several documents
    #[error(
        "{} documents match '{name}': {}",
        .candidates.len(),
        candidate_list(.candidates)
    )]
    AmbiguousDocument {
        name: String,
        candidates: Vec<DocumentSummary>,
    },

    /// A persisted tag has `start > end`
    #[error("Wrong starting and ending offset for tag {tag_id}: {start};{end}")]
    InvalidOffsets { tag_id: i64, start: i64, end: i64 },

    /// Invalid argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

fn candidate_list(candidates: &[DocumentSummary]) -> String {
    candidates
        .iter()
        .map(|c| format!("{} (id {})", c.name, c.id))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for operations that may fail with TagstoreError.
pub type Result<T> = std::result::Result<T, TagstoreError>;

impl TagstoreError {
    /// Create a new markup error.
    pub fn markup<S: Into<String>>(msg: S) -> Self {
        TagstoreError::Markup(msg.into())
    }

    /// Create a new structure error.
    pub fn structure<S: Into<String>>(msg: S) -> Self {
        TagstoreError::Structure(msg.into())
    }

    /// Create a new identity resolution error.
    pub fn identity<K: Into<String>, V: Into<String>>(kind: K, value: V) -> Self {
        TagstoreError::Identity {
            kind: kind.into(),
            value: value.into(),
        }
    }

    /// Create a new duplicate document error.
    pub fn duplicate_document<S: Into<String>>(name: S) -> Self {
        TagstoreError::DuplicateDocument(name.into())
    }

    /// Create a new stream boundary error.
    pub fn stream_boundary<S: Into<String>>(msg: S) -> Self {
        TagstoreError::StreamBoundary(msg.into())
    }

    /// Create a new invalid config error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        TagstoreError::Config(msg.into())
    }

    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        TagstoreError::Storage(msg.into())
    }

    /// Create a new not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        TagstoreError::NotFound(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        TagstoreError::InvalidArgument(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        TagstoreError::Other(msg.into())
    }

    /// Classify the error for batch drivers.
    ///
    /// Structural, identity, duplicate-name and tokenizer errors only
    /// invalidate the document being built. I/O errors on an input are
    /// charged to that input; a boundary mismatch invalidates the whole
    /// split stream. Store and configuration failures end the run.
    pub fn scope(&self) -> ErrorScope {
        match self {
            TagstoreError::Structure(_)
            | TagstoreError::Identity { .. }
            | TagstoreError::DuplicateDocument(_)
            | TagstoreError::Markup(_)
            | TagstoreError::InvalidArgument(_) => ErrorScope::Document,
            TagstoreError::StreamBoundary(_) | TagstoreError::Io(_) => ErrorScope::Stream,
            _ => ErrorScope::Run,
        }
    }
}
