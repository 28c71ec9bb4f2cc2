//! Output formatting for CLI commands.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, TagstoreArgs};
use crate::error::Result;
use crate::store::Posting;

/// Result structure for an indexing run.
#[derive(Debug, Serialize, Deserialize)]
pub struct IndexResult {
    pub files_done: usize,
    pub files_failed: usize,
    pub documents: usize,
    pub failures: Vec<FailureEntry>,
    pub warnings: usize,
    pub duration_ms: u64,
}

/// One failed input or document.
#[derive(Debug, Serialize, Deserialize)]
pub struct FailureEntry {
    pub source: String,
    pub error: String,
}

/// Result structure for a load of spooled rows.
#[derive(Debug, Serialize, Deserialize)]
pub struct CopyResult {
    pub bytes_loaded: u64,
    pub duration_ms: u64,
}

/// Result structure for document generation.
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResult {
    pub document_id: i64,
    pub output: String,
}

/// Result structure for preparsing.
#[derive(Debug, Serialize, Deserialize)]
pub struct PreparseResult {
    pub files: usize,
    pub failed: usize,
    pub tag_names: usize,
    pub attribute_names: usize,
}

/// Row counts per table.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreStats {
    pub tables: BTreeMap<String, u64>,
}

/// Result structure for token lookup.
#[derive(Debug, Serialize, Deserialize)]
pub struct LookupResult {
    pub token: String,
    pub postings: Vec<Posting>,
}

/// Output a result in the specified format.
pub fn output_result<T: Serialize>(message: &str, result: &T, args: &TagstoreArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => output_human(message, result, args),
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output in human-readable format.
fn output_human<T: Serialize>(message: &str, result: &T, args: &TagstoreArgs) -> Result<()> {
    if args.verbosity() > 0 {
        println!("{message}");
        println!();
    }

    let value = serde_json::to_value(result)?;
    output_generic_human(&value, 0);
    Ok(())
}

/// Print nested objects as indented `key: value` lines.
fn output_generic_human(value: &serde_json::Value, depth: usize) {
    let pad = "  ".repeat(depth);
    match value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                match val {
                    serde_json::Value::Object(_) => {
                        println!("{pad}{key}:");
                        output_generic_human(val, depth + 1);
                    }
                    serde_json::Value::Array(items) if items.iter().any(|i| i.is_object()) => {
                        println!("{pad}{key}:");
                        for item in items {
                            output_generic_human(item, depth + 1);
                            println!();
                        }
                    }
                    _ => println!("{pad}{key}: {}", format_value(val)),
                }
            }
        }
        _ => println!("{pad}{}", format_value(value)),
    }
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &TagstoreArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

/// Format a scalar or array for human output.
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            format!("[{}]", items.join(", "))
        }
        serde_json::Value::Object(_) => value.to_string(),
        serde_json::Value::Null => "null".to_string(),
    }
}
