//! Rows produced by decomposition.

use crate::sink::row::{Field, Row};
use crate::store::Table;

/// A finalized document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRow {
    pub id: i64,
    pub name: String,
    pub text: String,
}

impl Row for DocumentRow {
    const TABLE: Table = Table::Documents;

    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::Int(self.id),
            Field::Text(&self.name),
            Field::Text(&self.text),
        ]
    }
}

/// A finalized tag interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRow {
    pub id: i64,
    pub document_id: i64,
    pub name_id: i64,
    /// Earlier siblings carrying the same name.
    pub sibling_index: i64,
    pub parent_id: Option<i64>,
    pub start_offset: i64,
    pub end_offset: i64,
}

impl Row for TagRow {
    const TABLE: Table = Table::Tags;

    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::Int(self.id),
            Field::Int(self.document_id),
            Field::Int(self.name_id),
            Field::Int(self.sibling_index),
            Field::OptInt(self.parent_id),
            Field::Int(self.start_offset),
            Field::Int(self.end_offset),
        ]
    }
}

/// How an attribute value is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Interned(i64),
    Inline(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRow {
    pub tag_id: i64,
    pub name_id: i64,
    pub value: AttributeValue,
}

impl Row for AttributeRow {
    const TABLE: Table = Table::TagAttributes;

    fn fields(&self) -> Vec<Field<'_>> {
        let (value_id, inline) = match &self.value {
            AttributeValue::Interned(id) => (Some(*id), ""),
            AttributeValue::Inline(value) => (None, value.as_str()),
        };
        vec![
            Field::Int(self.tag_id),
            Field::Int(self.name_id),
            Field::OptInt(value_id),
            Field::Text(inline),
        ]
    }
}

/// Every position of one token in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingRow {
    pub document_id: i64,
    pub token_id: i64,
    pub positions: Vec<u32>,
}

impl Row for PostingRow {
    const TABLE: Table = Table::InvertedIndex;

    fn fields(&self) -> Vec<Field<'_>> {
        vec![
            Field::Int(self.document_id),
            Field::Int(self.token_id),
            Field::Positions(&self.positions),
        ]
    }
}
