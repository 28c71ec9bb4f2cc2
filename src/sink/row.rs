//! Bulk row format.
//!
//! Rows are tab-delimited and quoted with `'`; a quote inside a string is
//! doubled. Integers are written bare, a NULL integer is an empty field and
//! position lists are written as `{p1,p2,...}`.

use std::borrow::Cow;
use std::io::{Read, Write};

use csv::{QuoteStyle, Terminator};

use crate::error::{Result, TagstoreError};
use crate::store::{ColumnType, Table};

pub const DELIMITER: u8 = b'\t';
pub const QUOTE: u8 = b'\'';

/// One field of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<'a> {
    Int(i64),
    OptInt(Option<i64>),
    Text(&'a str),
    Positions(&'a [u32]),
}

impl<'a> Field<'a> {
    fn encode(&self) -> Cow<'a, str> {
        match *self {
            Field::Int(value) => Cow::Owned(value.to_string()),
            Field::OptInt(Some(value)) => Cow::Owned(value.to_string()),
            Field::OptInt(None) => Cow::Borrowed(""),
            Field::Text(text) => Cow::Borrowed(text),
            Field::Positions(positions) => Cow::Owned(format_positions(positions)),
        }
    }

    fn fits(&self, column: ColumnType) -> bool {
        matches!(
            (self, column),
            (Field::Int(_), ColumnType::Integer)
                | (Field::Int(_), ColumnType::NullableInteger)
                | (Field::OptInt(_), ColumnType::NullableInteger)
                | (Field::Text(_), ColumnType::Text)
                | (Field::Positions(_), ColumnType::IntegerArray)
        )
    }
}

/// A typed row destined for one table.
pub trait Row {
    const TABLE: Table;

    fn fields(&self) -> Vec<Field<'_>>;
}

/// Builder for writers producing the bulk row format.
pub fn writer_builder() -> csv::WriterBuilder {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(DELIMITER)
        .quote(QUOTE)
        .double_quote(true)
        .quote_style(QuoteStyle::NonNumeric)
        .terminator(Terminator::Any(b'\n'))
        .has_headers(false);
    builder
}

/// Reader over rows in the bulk row format.
pub fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .quote(QUOTE)
        .double_quote(true)
        .has_headers(false)
        .flexible(false)
        .from_reader(input)
}

/// Serialize one row for `table`, checking arity and column types.
pub fn write_row<W: Write>(writer: &mut csv::Writer<W>, table: Table, fields: &[Field<'_>]) -> Result<()> {
    let columns = table.columns();
    if fields.len() != columns.len() {
        return Err(TagstoreError::invalid_argument(format!(
            "table '{table}' expects {} fields, got {}",
            columns.len(),
            fields.len()
        )));
    }
    for (field, (column, column_type)) in fields.iter().zip(columns) {
        if !field.fits(*column_type) {
            return Err(TagstoreError::invalid_argument(format!(
                "field {field:?} does not fit column '{table}.{column}'"
            )));
        }
    }

    let encoded: Vec<Cow<'_, str>> = fields.iter().map(|field| field.encode()).collect();
    writer.write_record(encoded.iter().map(|field| field.as_bytes()))?;
    Ok(())
}

/// `{1,5,9}`
pub fn format_positions(positions: &[u32]) -> String {
    let joined = positions
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{joined}}}")
}

/// Parse a `{1,5,9}` position list.
pub fn parse_positions(text: &str) -> Result<Vec<u32>> {
    let inner = text
        .trim()
        .strip_prefix('{')
        .and_then(|rest| rest.strip_suffix('}'))
        .ok_or_else(|| TagstoreError::storage(format!("malformed position list '{text}'")))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|item| {
            item.trim()
                .parse::<u32>()
                .map_err(|e| TagstoreError::storage(format!("malformed position '{item}': {e}")))
        })
        .collect()
}
