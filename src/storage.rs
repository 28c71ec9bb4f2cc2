//! Spool buffers backing the bulk sink.
//!
//! Each bulk-loaded table accumulates serialized rows in a [`Spool`]. Two
//! backends share the interface:
//!
//! ## MemorySpool
//! - Growable in-memory buffer
//! - Lost when the process exits
//!
//! ## FileSpool
//! - One file per table in a scratch directory
//! - Bounds memory, and survives the process so a later run can load it
//!
//! # Example
//!
//! ```
//! use std::io::{Read, Write};
//!
//! use tagstore::storage::{OpenMode, SpoolConfig, create_spool};
//! use tagstore::store::Table;
//!
//! # fn main() -> tagstore::error::Result<()> {
//! let mut spool = create_spool(&SpoolConfig::Memory, Table::Documents, OpenMode::Write)?;
//! spool.write_all(b"1\t'a'\t'b'\n")?;
//!
//! let mut rows = String::new();
//! spool.reader()?.read_to_string(&mut rows)?;
//! assert_eq!(rows, "1\t'a'\t'b'\n");
//! # Ok(())
//! # }
//! ```

pub mod file;
pub mod memory;
pub mod traits;

pub use file::FileSpool;
pub use memory::MemorySpool;
pub use traits::{OpenMode, Spool, SpoolConfig, create_spool};
