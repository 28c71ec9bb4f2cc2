//! Command implementations for the tagstore CLI.

use std::collections::BTreeMap;
use std::env;
use std::time::Instant;

use log::{info, warn};

use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::IngestConfig;
use crate::error::{ErrorScope, Result, TagstoreError};
use crate::ingest::{Indexer, load_spooled};
use crate::preparse::Preparser;
use crate::reconstruct::DocumentGenerator;
use crate::storage::SpoolConfig;
use crate::store::{SqliteStore, Store, sqlite};

/// Execute a CLI command.
pub fn execute_command(args: TagstoreArgs) -> Result<()> {
    match &args.command {
        Command::Index(index_args) => index(index_args, &args),
        Command::Generate(generate_args) => generate(generate_args, &args),
        Command::Preparse(preparse_args) => preparse(preparse_args, &args),
        Command::Stats => show_stats(&args),
        Command::Lookup(lookup_args) => lookup(lookup_args, &args),
    }
}

/// Build the ingestion configuration from the config file and the flags.
pub fn ingest_config(args: &IndexArgs) -> Result<IngestConfig> {
    let mut config = match &args.config {
        Some(path) => IngestConfig::from_json_file(path)?,
        None => IngestConfig::default(),
    };

    if args.multiple_documents {
        if config.splitter.is_none() {
            return Err(TagstoreError::config(
                "splitting multiple documents needs a boundary tag in the configuration file",
            ));
        }
    } else {
        config.splitter = None;
    }

    if args.spools_to_files() {
        let dir = match (&args.temp_dir, &config.spool) {
            (Some(dir), _) => dir.clone(),
            (None, SpoolConfig::File { dir }) => dir.clone(),
            (None, SpoolConfig::Memory) => env::temp_dir(),
        };
        config.spool = SpoolConfig::File { dir };
    }
    if let Some(max_mem) = args.max_mem {
        config.max_memory_mb = max_mem;
    }
    if let Some(refresh) = args.refresh {
        config.refresh_frequency = refresh;
    }
    if args.unique_docs {
        config.unique_document_names = true;
    }
    if args.no_tokens {
        config.index_tokens = false;
    }

    config.validate()?;
    Ok(config)
}

/// Index files, spool them, or load an earlier spool.
fn index(args: &IndexArgs, cli_args: &TagstoreArgs) -> Result<()> {
    let config = ingest_config(args)?;
    let mut store = SqliteStore::open(&cli_args.database)?;
    let start_time = Instant::now();

    if args.copy_only {
        let bytes_loaded = load_spooled(&mut store, &config.spool)?;
        return output_result(
            "Spooled rows loaded",
            &CopyResult {
                bytes_loaded,
                duration_ms: start_time.elapsed().as_millis() as u64,
            },
            cli_args,
        );
    }

    if args.paths.is_empty() {
        return Err(TagstoreError::invalid_argument("no input files specified"));
    }

    let mut indexer = Indexer::new(store, config)?.recursive(args.recursive);
    indexer.index_paths(&args.paths)?;
    let (report, _store) = if args.index_only {
        indexer.finish_without_load()?
    } else {
        indexer.finish()?
    };

    let failures = report
        .failures
        .iter()
        .map(|(source, error)| FailureEntry {
            source: source.clone(),
            error: error.to_string(),
        })
        .collect();

    output_result(
        if args.index_only {
            "Rows spooled"
        } else {
            "Indexing finished"
        },
        &IndexResult {
            files_done: report.done,
            files_failed: report.failed,
            documents: report.documents,
            failures,
            warnings: report.warnings.len(),
            duration_ms: start_time.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

/// Rebuild one document into a file.
fn generate(args: &GenerateArgs, cli_args: &TagstoreArgs) -> Result<()> {
    let store = SqliteStore::open(&cli_args.database)?;
    let generator = DocumentGenerator::new(&store);

    let document_id = match (args.id, &args.name) {
        (Some(id), _) => Some(id),
        (None, Some(name)) => Some(generator.find_document(name, args.path_wildcard)?.id),
        (None, None) => None,
    };

    generator.generate_file(document_id, Some(args.output.as_path()), &args.options())?;

    output_result(
        "Document generated",
        &GenerateResult {
            document_id: document_id.unwrap_or_default(),
            output: args.output.display().to_string(),
        },
        cli_args,
    )
}

/// Register names from XML and DTD files.
fn preparse(args: &PreparseArgs, cli_args: &TagstoreArgs) -> Result<()> {
    let mut store = SqliteStore::open(&cli_args.database)?;
    let mut preparser = Preparser::new(&store)?;
    let mut failed = 0;

    for path in &args.paths {
        match preparser.parse_file(path) {
            Ok(()) => info!("'{}' parsed", path.display()),
            Err(e) if e.scope() == ErrorScope::Run => return Err(e),
            Err(e) => {
                warn!("preparsing '{}' failed: {e}", path.display());
                failed += 1;
            }
        }
    }

    let (tag_names, attribute_names) = preparser.commit(&mut store)?;
    output_result(
        "Names registered",
        &PreparseResult {
            files: args.paths.len() - failed,
            failed,
            tag_names,
            attribute_names,
        },
        cli_args,
    )
}

/// Show row counts.
fn show_stats(cli_args: &TagstoreArgs) -> Result<()> {
    let store = SqliteStore::open(&cli_args.database)?;
    let mut tables = BTreeMap::new();
    for name in sqlite::table_names() {
        tables.insert(name.to_string(), store.row_count(name)?);
    }

    output_result("Store statistics", &StoreStats { tables }, cli_args)
}

/// Show the documents and positions of a token.
fn lookup(args: &LookupArgs, cli_args: &TagstoreArgs) -> Result<()> {
    let store = SqliteStore::open(&cli_args.database)?;
    let token = args.token.trim().to_lowercase();
    let postings = store.token_postings(&token)?;

    output_result(
        &format!("{} document(s) contain '{token}'", postings.len()),
        &LookupResult { token, postings },
        cli_args,
    )
}
