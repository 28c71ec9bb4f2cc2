//! # tagstore
//!
//! Stores XML documents as flat relational rows and rebuilds them.
//!
//! ## Features
//!
//! - Streaming decomposition into documents, tag intervals and attributes
//! - Interned tag names, attribute names, attribute values and tokens
//! - Inverted index with character positions
//! - Batched bulk loads, spooled in memory or in files
//! - Splitting one input into many documents on a boundary tag
//! - Reconstruction of nested markup from the stored intervals

pub mod analysis;
pub mod cli;
pub mod config;
pub mod decompose;
pub mod error;
pub mod ingest;
pub mod interner;
pub mod model;
pub mod preparse;
pub mod reconstruct;
pub mod sink;
pub mod storage;
pub mod store;

pub mod prelude {
    pub use crate::config::{GenerateOptions, IngestConfig, SplitterConfig};
    pub use crate::decompose::{Decomposer, DocumentSplitter, MarkupHandler};
    pub use crate::error::{Result, TagstoreError};
    pub use crate::ingest::{Indexer, IngestReport};
    pub use crate::reconstruct::DocumentGenerator;
    pub use crate::store::{SqliteStore, Store};
}

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
