//! File-backed spool implementation.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, TagstoreError};
use crate::storage::traits::{OpenMode, Spool};

const BUFFER_SIZE: usize = 65536;

/// A spool appending rows to a file in the scratch directory.
#[derive(Debug)]
pub struct FileSpool {
    path: PathBuf,
    writer: BufWriter<File>,
    size: u64,
    closed: bool,
}

impl FileSpool {
    /// Open the spool file at `path`.
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = match mode {
            OpenMode::Write => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path),
            OpenMode::Resume => OpenOptions::new().create(true).append(true).open(&path),
        }
        .map_err(|e| {
            TagstoreError::storage(format!("Failed to open spool '{}': {e}", path.display()))
        })?;

        let size = file.metadata()?.len();

        Ok(FileSpool {
            path,
            writer: BufWriter::with_capacity(BUFFER_SIZE, file),
            size,
            closed: false,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Write for FileSpool {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other("Spool is closed"));
        }

        let bytes_written = self.writer.write(buf)?;
        self.size += bytes_written as u64;
        Ok(bytes_written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

impl Spool for FileSpool {
    fn reader(&self) -> Result<Box<dyn Read + '_>> {
        let file = File::open(&self.path)?;
        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file)))
    }

    fn clear(&mut self) -> Result<()> {
        self.writer.flush()?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        self.writer = BufWriter::with_capacity(BUFFER_SIZE, file);
        self.size = 0;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.writer
                .flush()
                .map_err(|e| TagstoreError::storage(format!("Failed to flush: {e}")))?;
            self.writer
                .get_ref()
                .sync_all()
                .map_err(|e| TagstoreError::storage(format!("Failed to sync: {e}")))?;
            self.closed = true;
        }
        Ok(())
    }
}
