//! Relational storage boundary.
//!
//! The decomposition pipeline and the reconstruction engine only talk to
//! the store through the [`StringTable`] and [`Store`] traits. The store owns
//! id assignment for interned strings, runs bulk loads inside one
//! transaction, and answers the read queries reconstruction needs.
//!
//! [`sqlite::SqliteStore`] is the bundled implementation.

use std::fmt;
use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Kinds of interned strings, one persistent table each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StringKind {
    TagName,
    AttributeName,
    AttributeValue,
    Token,
}

impl StringKind {
    pub const ALL: [StringKind; 4] = [
        StringKind::TagName,
        StringKind::AttributeName,
        StringKind::AttributeValue,
        StringKind::Token,
    ];

    /// Name of the backing table.
    pub fn table_name(&self) -> &'static str {
        match self {
            StringKind::TagName => "tag_names",
            StringKind::AttributeName => "attribute_names",
            StringKind::AttributeValue => "attribute_values",
            StringKind::Token => "tokens",
        }
    }

    /// Name of the string column in the backing table.
    pub fn column_name(&self) -> &'static str {
        match self {
            StringKind::TagName => "name",
            StringKind::AttributeName => "name",
            StringKind::AttributeValue => "value",
            StringKind::Token => "token",
        }
    }
}

impl fmt::Display for StringKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StringKind::TagName => "tag name",
            StringKind::AttributeName => "attribute name",
            StringKind::AttributeValue => "attribute value",
            StringKind::Token => "token",
        };
        f.write_str(label)
    }
}

/// Column types understood by the bulk row format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    /// Integer column where an empty field means NULL.
    NullableInteger,
    Text,
    /// `{p1,p2,...}` list of non-negative integers.
    IntegerArray,
}

/// Tables filled through bulk loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Table {
    Documents,
    Tags,
    TagAttributes,
    InvertedIndex,
}

impl Table {
    /// Load order inside one flush transaction.
    pub const ALL: [Table; 4] = [
        Table::Documents,
        Table::Tags,
        Table::TagAttributes,
        Table::InvertedIndex,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Documents => "documents",
            Table::Tags => "tags",
            Table::TagAttributes => "tag_attributes",
            Table::InvertedIndex => "inverted_index",
        }
    }

    /// File name of the spool buffer backing this table.
    pub fn spool_file_name(&self) -> String {
        format!("tmp_{}.dat", self.name())
    }

    pub fn columns(&self) -> &'static [(&'static str, ColumnType)] {
        match self {
            Table::Documents => &[
                ("id", ColumnType::Integer),
                ("name", ColumnType::Text),
                ("text", ColumnType::Text),
            ],
            Table::Tags => &[
                ("id", ColumnType::Integer),
                ("document_id", ColumnType::Integer),
                ("tag_name_id", ColumnType::Integer),
                ("sibling_index", ColumnType::Integer),
                ("parent_id", ColumnType::NullableInteger),
                ("start_offset", ColumnType::Integer),
                ("end_offset", ColumnType::Integer),
            ],
            Table::TagAttributes => &[
                ("tag_id", ColumnType::Integer),
                ("attribute_name_id", ColumnType::Integer),
                ("attribute_value_id", ColumnType::NullableInteger),
                ("attribute_value", ColumnType::Text),
            ],
            Table::InvertedIndex => &[
                ("document_id", ColumnType::Integer),
                ("token_id", ColumnType::Integer),
                ("positions", ColumnType::IntegerArray),
            ],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tables that hand out monotonic ids on the client side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSequence {
    Documents,
    Tags,
}

/// One table's worth of serialized rows handed to [`Store::bulk_load`].
pub struct TableLoad<'a> {
    pub table: Table,
    pub rows: Box<dyn Read + 'a>,
}

/// A document as listed by name lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub id: i64,
    pub name: String,
}

/// A persisted tag joined with its name and attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTag {
    pub id: i64,
    pub name: String,
    pub parent: Option<i64>,
    pub start_offset: i64,
    pub end_offset: i64,
    /// `(name, value)` pairs in insertion order.
    pub attributes: Vec<(String, String)>,
}

/// Occurrences of one token in one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub document_id: i64,
    pub positions: Vec<u32>,
}

/// Append-only string dictionaries with store-assigned ids.
pub trait StringTable {
    /// Read back every `(value, id)` pair of the table.
    fn strings(&self, kind: StringKind) -> Result<Vec<(String, i64)>>;

    /// Insert `value`, returning `false` when it was already present.
    ///
    /// A duplicate-key conflict is not an error.
    fn insert_string(&mut self, kind: StringKind, value: &str) -> Result<bool>;

    /// Insert several values, returning how many were new.
    fn insert_strings(&mut self, kind: StringKind, values: &[String]) -> Result<usize> {
        let mut inserted = 0;
        for value in values {
            if self.insert_string(kind, value)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }
}

/// The relational store consumed by ingestion and reconstruction.
pub trait Store: StringTable {
    /// Highest id handed out so far for the sequence (0 when empty).
    fn max_id(&self, sequence: IdSequence) -> Result<i64>;

    /// Names of every persisted document.
    fn document_names(&self) -> Result<Vec<String>>;

    /// Load every table's rows inside a single transaction.
    ///
    /// Either all rows land or none do.
    fn bulk_load(&mut self, loads: Vec<TableLoad<'_>>) -> Result<()>;

    /// Raw text of a document.
    fn document_text(&self, document_id: i64) -> Result<Option<String>>;

    /// Documents whose name matches `name`, case-insensitively. With
    /// `path_wildcard` any leading directory path is accepted.
    fn find_documents(&self, name: &str, path_wildcard: bool) -> Result<Vec<DocumentSummary>>;

    /// Tags of a document ordered by start offset descending, then id
    /// descending.
    fn document_tags(&self, document_id: i64) -> Result<Vec<StoredTag>>;

    /// Every document containing `token`, with positions.
    fn token_postings(&self, token: &str) -> Result<Vec<Posting>>;

    /// Number of rows currently in `table_name`.
    fn row_count(&self, table_name: &str) -> Result<u64>;
}
