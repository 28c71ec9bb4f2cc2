//! In-memory spool implementation.

use std::io::{Cursor, Read, Write};

use crate::error::Result;
use crate::storage::traits::Spool;

/// A spool keeping rows in a growable buffer.
#[derive(Debug, Default)]
pub struct MemorySpool {
    buffer: Vec<u8>,
    closed: bool,
}

impl MemorySpool {
    /// Create a new empty memory spool.
    pub fn new() -> Self {
        MemorySpool::default()
    }
}

impl Write for MemorySpool {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other("Spool is closed"));
        }

        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        // For memory spools, flushing is a no-op
        Ok(())
    }
}

impl Spool for MemorySpool {
    fn reader(&self) -> Result<Box<dyn Read + '_>> {
        Ok(Box::new(Cursor::new(self.buffer.as_slice())))
    }

    fn clear(&mut self) -> Result<()> {
        self.buffer.clear();
        Ok(())
    }

    fn size(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn close(&mut self) -> Result<()> {
        self.buffer = Vec::new();
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_clear() {
        let mut spool = MemorySpool::new();
        spool.write_all(b"hello\n").unwrap();
        assert_eq!(spool.size(), 6);

        let mut data = Vec::new();
        spool.reader().unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data, b"hello\n");

        spool.clear().unwrap();
        assert_eq!(spool.size(), 0);
    }

    #[test]
    fn test_write_after_close_fails() {
        let mut spool = MemorySpool::new();
        spool.close().unwrap();
        assert!(spool.write_all(b"x").is_err());
    }
}
