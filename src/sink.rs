//! Bulk sink: per-table row buffers flushed as one transaction.
//!
//! Rows are serialized on write (see [`row`]) into one [`Spool`] per table.
//! [`BulkSink::flush`] hands every table's buffered rows to
//! [`Store::bulk_load`], which applies them atomically, then clears the
//! buffers. Buffers are left intact when the load fails.

use std::collections::BTreeMap;

use log::{debug, info};

use crate::error::{Result, TagstoreError};
use crate::storage::{OpenMode, Spool, SpoolConfig, create_spool};
use crate::store::{Store, Table, TableLoad};

pub mod row;

pub use row::{Field, Row};

type SpoolWriter = csv::Writer<Box<dyn Spool>>;

/// Buffers rows for every bulk-loaded table.
#[derive(Debug)]
pub struct BulkSink {
    config: SpoolConfig,
    writers: BTreeMap<Table, SpoolWriter>,
    pending_rows: u64,
}

impl BulkSink {
    /// Create a closed sink; call [`BulkSink::open`] before writing.
    pub fn new(config: SpoolConfig) -> Self {
        BulkSink {
            config,
            writers: BTreeMap::new(),
            pending_rows: 0,
        }
    }

    /// Open one buffer per table.
    ///
    /// Fails, naming every table still open, when called twice without an
    /// intervening close.
    pub fn open(&mut self, mode: OpenMode) -> Result<()> {
        if !self.writers.is_empty() {
            let open = self.writers.keys().map(|t| t.name().to_string()).collect();
            return Err(TagstoreError::BuffersOpen(open));
        }

        for table in Table::ALL {
            let spool = create_spool(&self.config, table, mode)?;
            self.writers.insert(table, row::writer_builder().from_writer(spool));
        }
        self.pending_rows = 0;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        !self.writers.is_empty()
    }

    pub fn config(&self) -> &SpoolConfig {
        &self.config
    }

    /// Serialize one row into the buffer of `table`.
    pub fn write_row(&mut self, table: Table, fields: &[Field<'_>]) -> Result<()> {
        let writer = self
            .writers
            .get_mut(&table)
            .ok_or_else(|| TagstoreError::storage(format!("buffer for '{table}' is not open")))?;
        row::write_row(writer, table, fields)?;
        self.pending_rows += 1;
        Ok(())
    }

    /// Serialize a typed row.
    pub fn write<R: Row>(&mut self, row: &R) -> Result<()> {
        self.write_row(R::TABLE, &row.fields())
    }

    /// Rows written since the last flush.
    pub fn pending_rows(&self) -> u64 {
        self.pending_rows
    }

    /// Bytes held across every buffer.
    pub fn buffered_bytes(&self) -> u64 {
        self.writers.values().map(|w| w.get_ref().size()).sum()
    }

    /// Bulk-load every buffer inside one store transaction, then clear them.
    pub fn flush<S: Store + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }

        let bytes = self.buffered_bytes();
        if bytes == 0 {
            debug!("flush skipped, buffers are empty");
            return Ok(());
        }

        {
            let loads = self
                .writers
                .iter()
                .map(|(table, writer)| {
                    Ok(TableLoad {
                        table: *table,
                        rows: writer.get_ref().reader()?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            store.bulk_load(loads)?;
        }

        info!("flushed {} rows ({bytes} bytes)", self.pending_rows);
        self.reset_buffers()
    }

    /// Flush, then release every buffer.
    pub fn close<S: Store + ?Sized>(&mut self, store: &mut S) -> Result<()> {
        self.flush(store)?;
        self.release()
    }

    /// Release every buffer without loading it.
    ///
    /// File spools keep their rows on disk for a later resume.
    pub fn close_without_load(&mut self) -> Result<()> {
        self.release()
    }

    fn reset_buffers(&mut self) -> Result<()> {
        let tables: Vec<Table> = self.writers.keys().copied().collect();
        for table in tables {
            if let Some(writer) = self.writers.remove(&table) {
                let mut spool = into_spool(writer)?;
                spool.clear()?;
                self.writers.insert(table, row::writer_builder().from_writer(spool));
            }
        }
        self.pending_rows = 0;
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        let writers = std::mem::take(&mut self.writers);
        for (_, writer) in writers {
            into_spool(writer)?.close()?;
        }
        self.pending_rows = 0;
        Ok(())
    }
}

fn into_spool(writer: SpoolWriter) -> Result<Box<dyn Spool>> {
    writer
        .into_inner()
        .map_err(|e| TagstoreError::from(e.into_error()))
}
