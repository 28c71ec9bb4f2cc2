//! Batch ingestion of files and directories.
//!
//! The [`Indexer`] walks its inputs one at a time, feeds each through the
//! decomposition pipeline (splitting it into many documents when a boundary
//! tag is configured) and keeps going when an input fails. Failures and
//! warnings are gathered into an [`IngestReport`] returned at the end of the
//! run; only store and configuration failures stop the run early.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::IngestConfig;
use crate::decompose::memory::MemoryGuard;
use crate::decompose::pipeline::Decomposer;
use crate::decompose::splitter::DocumentSplitter;
use crate::decompose::xml;
use crate::error::{ErrorScope, Result, TagstoreError};
use crate::sink::BulkSink;
use crate::storage::{OpenMode, SpoolConfig};
use crate::store::Store;

/// Outcome of an ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Inputs processed without an input-level failure.
    pub done: usize,
    /// Inputs that failed as a whole.
    pub failed: usize,
    /// Documents handed to the store.
    pub documents: usize,
    /// `(input or document, error)` for every failure.
    pub failures: Vec<(String, TagstoreError)>,
    pub warnings: Vec<String>,
}

/// Drives a [`Decomposer`] over files.
#[derive(Debug)]
pub struct Indexer<S: Store> {
    decomposer: Decomposer<S>,
    config: IngestConfig,
    guard: MemoryGuard,
    recursive: bool,
    since_check: usize,
    report: IngestReport,
}

impl<S: Store> Indexer<S> {
    pub fn new(store: S, config: IngestConfig) -> Result<Self> {
        let guard = MemoryGuard::for_process(config.max_memory_bytes());
        Self::with_memory_guard(store, config, guard)
    }

    /// Create an indexer checking memory through `guard`.
    pub fn with_memory_guard(store: S, config: IngestConfig, guard: MemoryGuard) -> Result<Self> {
        let decomposer = Decomposer::new(store, &config)?;
        if guard.over_ceiling() {
            return Err(TagstoreError::config(format!(
                "initial data already uses more than {} MB",
                config.max_memory_mb
            )));
        }

        Ok(Indexer {
            decomposer,
            config,
            guard,
            recursive: false,
            since_check: 0,
            report: IngestReport::default(),
        })
    }

    /// Descend into subdirectories of directory inputs.
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn decomposer(&self) -> &Decomposer<S> {
        &self.decomposer
    }

    /// Expand directories into the files they contain, in name order.
    pub fn collect_inputs(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in paths {
            if path.is_dir() {
                walk(path, self.recursive, &mut files)?;
            } else if path.exists() {
                files.push(path.clone());
            } else {
                return Err(TagstoreError::not_found(format!(
                    "'{}' file not found",
                    path.display()
                )));
            }
        }
        Ok(files)
    }

    /// Index every file under `paths`.
    pub fn index_paths(&mut self, paths: &[PathBuf]) -> Result<()> {
        let files = self.collect_inputs(paths)?;
        info!("{} file(s) found", files.len());
        for file in &files {
            self.index_file(file)?;
        }
        Ok(())
    }

    /// Index one file. Only failures that end the run are returned.
    pub fn index_file(&mut self, path: &Path) -> Result<()> {
        let source = path.display().to_string();
        let result = self.decompose_file(path, &source);

        match result {
            Ok(()) => self.report.done += 1,
            Err(error) if error.scope() == ErrorScope::Run => {
                self.decomposer.abort_document();
                return Err(error);
            }
            Err(error) => {
                self.decomposer.abort_document();
                self.decomposer
                    .warn(format!("indexing '{source}' failed: {error}"));
                self.report.failed += 1;
                self.report.failures.push((source, error));
            }
        }

        self.since_check += 1;
        if self.since_check >= self.config.refresh_frequency {
            self.since_check = 0;
            if self.guard.should_flush() {
                info!("memory above threshold, flushing buffers");
                self.decomposer.flush()?;
            }
        }
        Ok(())
    }

    fn decompose_file(&mut self, path: &Path, source: &str) -> Result<()> {
        let is_xml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if !is_xml {
            let extension = path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(TagstoreError::invalid_argument(format!(
                "wrong file format '.{extension}'"
            )));
        }

        let input = BufReader::new(fs::File::open(path)?);

        match self.config.splitter.clone() {
            Some(splitter_config) => {
                let mut splitter =
                    DocumentSplitter::new(&mut self.decomposer, &splitter_config, source)
                        .with_memory_guard(&self.guard, self.config.refresh_frequency);
                let fed = xml::feed(input, &mut splitter);
                let summary = match fed {
                    Ok(()) => splitter.finish(),
                    Err(error) => {
                        let summary = splitter.abandon();
                        self.absorb_split(summary);
                        return Err(error);
                    }
                };
                self.absorb_split(summary);
                Ok(())
            }
            None => {
                self.decomposer.start_document(Some(source))?;
                xml::feed(input, &mut self.decomposer)?;
                self.decomposer.end_document()?;
                self.report.documents += 1;
                debug!("'{source}' indexed");
                Ok(())
            }
        }
    }

    fn absorb_split(&mut self, summary: crate::decompose::SplitSummary) {
        self.report.documents += summary.documents;
        self.report.failures.extend(summary.failures);
    }

    /// Load every pending row and hand back the report and the store.
    pub fn finish(mut self) -> Result<(IngestReport, S)> {
        self.decomposer.close()?;
        Ok(self.into_parts())
    }

    /// Leave the rows in the spool files without loading them.
    pub fn finish_without_load(mut self) -> Result<(IngestReport, S)> {
        self.decomposer.close_without_load()?;
        Ok(self.into_parts())
    }

    fn into_parts(mut self) -> (IngestReport, S) {
        self.report.warnings = self.decomposer.take_warnings();
        info!(
            "{} file(s) done ({} failed), {} document(s)",
            self.report.done, self.report.failed, self.report.documents
        );
        (self.report, self.decomposer.into_store())
    }
}

fn walk(dir: &Path, recursive: bool, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for entry in entries {
        if entry.is_dir() {
            if recursive {
                walk(&entry, recursive, files)?;
            }
        } else {
            files.push(entry);
        }
    }
    Ok(())
}

/// Load rows left in spool files by an earlier index-only run.
///
/// Returns the number of bytes loaded.
pub fn load_spooled<S: Store + ?Sized>(store: &mut S, spool: &SpoolConfig) -> Result<u64> {
    if !spool.is_file_backed() {
        return Err(TagstoreError::config(
            "loading spooled rows requires temporary files",
        ));
    }

    let mut sink = BulkSink::new(spool.clone());
    sink.open(OpenMode::Resume)?;
    let bytes = sink.buffered_bytes();
    sink.close(store)?;
    info!("{bytes} spooled bytes loaded");
    Ok(bytes)
}
