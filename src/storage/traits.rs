//! Spool abstraction trait and common types.

use std::fmt::Debug;
use std::io::{Read, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TagstoreError};
use crate::storage::file::FileSpool;
use crate::storage::memory::MemorySpool;
use crate::store::Table;

/// An append-only row buffer for one table.
///
/// Writers append serialized rows; [`Spool::reader`] replays everything
/// written since the last [`Spool::clear`]. Callers flush pending writes
/// before asking for a reader.
pub trait Spool: Write + Send + Debug {
    /// Read back every buffered byte.
    fn reader(&self) -> Result<Box<dyn Read + '_>>;

    /// Discard buffered rows.
    fn clear(&mut self) -> Result<()>;

    /// Number of buffered bytes.
    fn size(&self) -> u64;

    /// Flush and release the buffer.
    fn close(&mut self) -> Result<()>;
}

/// Where spooled rows live.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpoolConfig {
    /// Keep rows in memory until flushed.
    #[default]
    Memory,
    /// Write rows to one file per table under `dir`.
    File { dir: PathBuf },
}

impl SpoolConfig {
    /// Check that the scratch directory exists.
    pub fn validate(&self) -> Result<()> {
        match self {
            SpoolConfig::Memory => Ok(()),
            SpoolConfig::File { dir } if dir.is_dir() => Ok(()),
            SpoolConfig::File { dir } => Err(TagstoreError::config(format!(
                "temporary directory '{}' not found",
                dir.display()
            ))),
        }
    }

    pub fn is_file_backed(&self) -> bool {
        matches!(self, SpoolConfig::File { .. })
    }
}

/// How to open a spool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Start empty, truncating any leftover file.
    Write,
    /// Keep rows left by an earlier run (file spools only).
    Resume,
}

/// Create the spool for `table` as described by `config`.
pub fn create_spool(config: &SpoolConfig, table: Table, mode: OpenMode) -> Result<Box<dyn Spool>> {
    match (config, mode) {
        (SpoolConfig::Memory, OpenMode::Write) => Ok(Box::new(MemorySpool::new())),
        (SpoolConfig::Memory, OpenMode::Resume) => Err(TagstoreError::config(
            "spooled rows can only be resumed from temporary files",
        )),
        (SpoolConfig::File { dir }, mode) => {
            config.validate()?;
            let path = dir.join(table.spool_file_name());
            Ok(Box::new(FileSpool::open(path, mode)?))
        }
    }
}
