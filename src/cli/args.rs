//! Command line argument parsing for the tagstore CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::config::GenerateOptions;

/// tagstore - store markup documents as relational tag intervals
#[derive(Parser, Debug, Clone)]
#[command(name = "tagstore")]
#[command(about = "Decompose XML documents into relational rows and rebuild them")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct TagstoreArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// SQLite database file
    #[arg(
        short,
        long,
        value_name = "PATH",
        env = "TAGSTORE_DATABASE",
        default_value = "tagstore.db",
        global = true
    )]
    pub database: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl TagstoreArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Decompose XML files into the database
    Index(IndexArgs),

    /// Rebuild a stored document as XML
    Generate(GenerateArgs),

    /// Register tag and attribute names from XML or DTD files
    Preparse(PreparseArgs),

    /// Show row counts per table
    Stats,

    /// Show where a token occurs
    Lookup(LookupArgs),
}

/// Arguments for indexing
#[derive(Parser, Debug, Clone)]
pub struct IndexArgs {
    /// Files or directories to index
    #[arg(value_name = "PATHS")]
    pub paths: Vec<PathBuf>,

    /// JSON configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Split every input on the configured boundary tag
    #[arg(short, long)]
    pub multiple_documents: bool,

    /// Descend into subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Spool rows to files instead of memory
    #[arg(long)]
    pub use_temp_files: bool,

    /// Directory holding the spool files
    #[arg(long, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Write the spool files without loading them
    #[arg(long, conflicts_with = "copy_only")]
    pub index_only: bool,

    /// Load spool files left by an earlier --index-only run
    #[arg(long)]
    pub copy_only: bool,

    /// Resident memory ceiling in MB
    #[arg(long, value_name = "MB")]
    pub max_mem: Option<u64>,

    /// Inputs (or split documents) between memory checks
    #[arg(long, value_name = "N")]
    pub refresh: Option<usize>,

    /// Reject documents whose name is already stored
    #[arg(long)]
    pub unique_docs: bool,

    /// Skip the inverted index
    #[arg(long)]
    pub no_tokens: bool,
}

impl IndexArgs {
    /// Whether the run spools to files.
    pub fn spools_to_files(&self) -> bool {
        self.use_temp_files || self.index_only || self.copy_only
    }
}

/// Arguments for document generation
#[derive(Parser, Debug, Clone)]
pub struct GenerateArgs {
    /// Document id
    #[arg(long, conflicts_with = "name")]
    pub id: Option<i64>,

    /// Document name
    #[arg(long)]
    pub name: Option<String>,

    /// Accept any leading directory in the document name
    #[arg(long, requires = "name")]
    pub path_wildcard: bool,

    /// Output file
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Spaces per nesting level (ignored with --no-newline)
    #[arg(short, long, default_value = "2")]
    pub indent: usize,

    /// Produce the document without line breaks
    #[arg(short, long)]
    pub no_newline: bool,

    /// Tags never followed by a line break (comma-separated or repeated)
    #[arg(short = 'x', long, alias = "excluded", value_name = "TAGS", value_delimiter = ',')]
    pub exclude: Vec<String>,
}

impl GenerateArgs {
    /// Reconstruction parameters selected by the flags.
    pub fn options(&self) -> GenerateOptions {
        let mut options = if self.no_newline {
            GenerateOptions::default()
        } else {
            GenerateOptions::pretty(self.indent)
        };
        for tag in &self.exclude {
            options = options.exclude(tag);
        }
        options
    }
}

/// Arguments for preparsing
#[derive(Parser, Debug, Clone)]
pub struct PreparseArgs {
    /// XML or DTD files
    #[arg(value_name = "PATHS", required = true)]
    pub paths: Vec<PathBuf>,
}

/// Arguments for token lookup
#[derive(Parser, Debug, Clone)]
pub struct LookupArgs {
    /// Token to look up
    #[arg(value_name = "TOKEN")]
    pub token: String,
}

/// Output format options
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_index() {
        let args = TagstoreArgs::try_parse_from([
            "tagstore",
            "-vv",
            "--database",
            "corpus.db",
            "index",
            "a.xml",
            "dir",
            "--multiple-documents",
            "--max-mem",
            "512",
        ])
        .unwrap();

        assert_eq!(args.verbosity(), 2);
        assert_eq!(args.database, PathBuf::from("corpus.db"));
        if let Command::Index(index_args) = args.command {
            assert_eq!(index_args.paths.len(), 2);
            assert!(index_args.multiple_documents);
            assert_eq!(index_args.max_mem, Some(512));
            assert!(!index_args.spools_to_files());
        } else {
            panic!("Expected index command");
        }
    }

    #[test]
    fn test_index_only_conflicts_with_copy_only() {
        let result =
            TagstoreArgs::try_parse_from(["tagstore", "index", "--index-only", "--copy-only"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_generate() {
        let args = TagstoreArgs::try_parse_from([
            "tagstore",
            "generate",
            "--name",
            "a.xml",
            "--path-wildcard",
            "-o",
            "out.xml",
            "--indent",
            "4",
            "-x",
            "B,i",
            "-x",
            "em",
        ])
        .unwrap();

        if let Command::Generate(generate_args) = args.command {
            assert_eq!(generate_args.name.as_deref(), Some("a.xml"));
            assert!(generate_args.path_wildcard);
            assert_eq!(generate_args.exclude, vec!["B", "i", "em"]);

            let options = generate_args.options();
            assert!(options.use_newlines);
            assert_eq!(options.indent_width, 4);
            let excluded: Vec<&str> = options.excluded_tags.iter().map(String::as_str).collect();
            assert_eq!(excluded, vec!["b", "em", "i"]);
        } else {
            panic!("Expected generate command");
        }
    }

    #[test]
    fn test_generate_defaults() {
        let args =
            TagstoreArgs::try_parse_from(["tagstore", "generate", "--id", "3", "-o", "out.xml"])
                .unwrap();
        if let Command::Generate(generate_args) = args.command {
            let options = generate_args.options();
            assert!(options.use_newlines);
            assert_eq!(options.indent_width, 2);
            assert!(options.excluded_tags.is_empty());
        } else {
            panic!("Expected generate command");
        }

        let args = TagstoreArgs::try_parse_from([
            "tagstore", "generate", "--id", "3", "-o", "out.xml", "-n", "-i", "8",
        ])
        .unwrap();
        if let Command::Generate(generate_args) = args.command {
            let options = generate_args.options();
            assert!(!options.use_newlines);
            assert_eq!(options.indent_width, 0);
        } else {
            panic!("Expected generate command");
        }
    }

    #[test]
    fn test_quiet_overrides_verbose() {
        let args = TagstoreArgs::try_parse_from(["tagstore", "-q", "-vvv", "stats"]).unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_output_format() {
        let args =
            TagstoreArgs::try_parse_from(["tagstore", "--format", "json", "lookup", "fox"]).unwrap();
        assert_eq!(args.output_format, OutputFormat::Json);
    }
}
