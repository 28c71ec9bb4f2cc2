//! Resident memory probing.
//!
//! The check is advisory: a probe that cannot read the memory usage logs a
//! warning and reports no pressure.

use std::fmt::Debug;
use std::fs;

use log::{debug, warn};

use crate::error::{Result, TagstoreError};

/// Share of the ceiling above which buffers are flushed.
pub const FLUSH_THRESHOLD: f64 = 0.8;

/// Reports the resident memory of the running process.
pub trait MemoryProbe: Send + Sync + Debug {
    /// Resident set size in bytes.
    fn resident_bytes(&self) -> Result<u64>;
}

/// Reads `VmRSS` from `/proc/self/status`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessMemoryProbe;

impl MemoryProbe for ProcessMemoryProbe {
    fn resident_bytes(&self) -> Result<u64> {
        let status = fs::read_to_string("/proc/self/status")?;
        parse_vm_rss(&status)
    }
}

fn parse_vm_rss(status: &str) -> Result<u64> {
    let line = status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .ok_or_else(|| TagstoreError::other("VmRSS not reported"))?;

    let kilobytes = line
        .split_whitespace()
        .nth(1)
        .and_then(|value| value.parse::<u64>().ok())
        .ok_or_else(|| TagstoreError::other(format!("unexpected VmRSS line '{line}'")))?;

    Ok(kilobytes * 1024)
}

/// Decides when memory pressure calls for a flush.
#[derive(Debug)]
pub struct MemoryGuard {
    probe: Box<dyn MemoryProbe>,
    ceiling_bytes: u64,
}

impl MemoryGuard {
    pub fn new(probe: Box<dyn MemoryProbe>, ceiling_bytes: u64) -> Self {
        MemoryGuard {
            probe,
            ceiling_bytes,
        }
    }

    /// Guard over the current process.
    pub fn for_process(ceiling_bytes: u64) -> Self {
        Self::new(Box::new(ProcessMemoryProbe), ceiling_bytes)
    }

    pub fn ceiling_bytes(&self) -> u64 {
        self.ceiling_bytes
    }

    /// Whether usage already exceeds the ceiling itself.
    pub fn over_ceiling(&self) -> bool {
        match self.probe.resident_bytes() {
            Ok(used) => used > self.ceiling_bytes,
            Err(e) => {
                warn!("memory probe failed: {e}");
                false
            }
        }
    }

    /// Whether usage exceeds the flush threshold.
    pub fn should_flush(&self) -> bool {
        match self.probe.resident_bytes() {
            Ok(used) => {
                let limit = (self.ceiling_bytes as f64 * FLUSH_THRESHOLD) as u64;
                debug!("resident memory {used} bytes, flush limit {limit} bytes");
                used > limit
            }
            Err(e) => {
                warn!("memory probe failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Probe returning a fixed value.
    #[derive(Debug)]
    pub(crate) struct FixedProbe(pub Option<u64>);

    impl MemoryProbe for FixedProbe {
        fn resident_bytes(&self) -> Result<u64> {
            self.0.ok_or_else(|| TagstoreError::other("unavailable"))
        }
    }

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\ttagstore\nVmPeak:\t  9000 kB\nVmRSS:\t  1234 kB\n";
        assert_eq!(parse_vm_rss(status).unwrap(), 1234 * 1024);
        assert!(parse_vm_rss("Name:\tx\n").is_err());
    }

    #[test]
    fn test_threshold() {
        let guard = MemoryGuard::new(Box::new(FixedProbe(Some(81))), 100);
        assert!(guard.should_flush());

        let guard = MemoryGuard::new(Box::new(FixedProbe(Some(80))), 100);
        assert!(!guard.should_flush());
        assert!(!guard.over_ceiling());

        let guard = MemoryGuard::new(Box::new(FixedProbe(Some(101))), 100);
        assert!(guard.over_ceiling());
    }

    #[test]
    fn test_probe_failure_is_advisory() {
        let guard = MemoryGuard::new(Box::new(FixedProbe(None)), 100);
        assert!(!guard.should_flush());
    }
}
