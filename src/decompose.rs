//! Decomposition of markup documents into relational rows.
//!
//! - [`events`] - the callback interface fed by a markup tokenizer
//! - [`xml`] - adapter driving [`events::MarkupHandler`] from an XML stream
//! - [`pipeline`] - the per-document state machine assigning ids and offsets
//! - [`splitter`] - splits one stream into many documents on a boundary tag
//! - [`memory`] - resident memory probing for flush scheduling

pub mod events;
pub mod memory;
pub mod pipeline;
pub mod splitter;
pub mod xml;

pub use events::MarkupHandler;
pub use memory::{MemoryGuard, MemoryProbe, ProcessMemoryProbe};
pub use pipeline::Decomposer;
pub use splitter::{DocumentSplitter, SplitSummary};
