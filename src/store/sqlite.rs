//! SQLite-backed store.
//!
//! Bulk loads replay the tab-delimited row format through prepared inserts
//! inside one transaction, the same contract a `COPY ... FROM STDIN` load
//! gives on a server database.

use std::collections::HashMap;
use std::path::Path;

use log::debug;
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};

use crate::error::{Result, TagstoreError};
use crate::sink::row::{self, parse_positions};
use crate::store::{
    ColumnType, DocumentSummary, IdSequence, Posting, Store, StoredTag, StringKind, StringTable,
    Table, TableLoad,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS documents (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        text TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_documents_name ON documents(name);

    CREATE TABLE IF NOT EXISTS tag_names (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY,
        document_id INTEGER NOT NULL,
        tag_name_id INTEGER NOT NULL,
        sibling_index INTEGER NOT NULL,
        parent_id INTEGER,
        start_offset INTEGER NOT NULL,
        end_offset INTEGER NOT NULL,
        CHECK (start_offset <= end_offset)
    );
    CREATE INDEX IF NOT EXISTS idx_tags_document ON tags(document_id, start_offset);

    CREATE TABLE IF NOT EXISTS attribute_names (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS attribute_values (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        value TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS tag_attributes (
        tag_id INTEGER NOT NULL,
        attribute_name_id INTEGER NOT NULL,
        attribute_value_id INTEGER,
        attribute_value TEXT NOT NULL,
        PRIMARY KEY (tag_id, attribute_name_id)
    );

    CREATE TABLE IF NOT EXISTS tokens (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        token TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS inverted_index (
        document_id INTEGER NOT NULL,
        token_id INTEGER NOT NULL,
        positions TEXT NOT NULL,
        PRIMARY KEY (document_id, token_id)
    );
";

const KNOWN_TABLES: [&str; 8] = [
    "documents",
    "tags",
    "tag_names",
    "tag_attributes",
    "attribute_names",
    "attribute_values",
    "tokens",
    "inverted_index",
];

/// A [`Store`] over a SQLite database.
pub struct SqliteStore {
    conn: Connection,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = SqliteStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = SqliteStore { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Direct access to the connection, for ad-hoc queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

fn insert_sql(table: Table) -> String {
    let columns = table.columns();
    let names = columns
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {table} ({names}) VALUES ({placeholders})")
}

fn decode_field(raw: &str, column: ColumnType) -> Result<Value> {
    match column {
        ColumnType::Text => Ok(Value::Text(raw.to_string())),
        ColumnType::NullableInteger if raw.is_empty() => Ok(Value::Null),
        ColumnType::Integer | ColumnType::NullableInteger => raw
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|e| TagstoreError::storage(format!("invalid integer '{raw}': {e}"))),
        ColumnType::IntegerArray => {
            // Validate now so a malformed list fails the whole load.
            parse_positions(raw)?;
            Ok(Value::Text(raw.to_string()))
        }
    }
}

fn copy_table(tx: &rusqlite::Transaction<'_>, load: TableLoad<'_>) -> Result<u64> {
    let table = load.table;
    let columns = table.columns();
    let mut stmt = tx.prepare(&insert_sql(table))?;
    let mut reader = row::reader(load.rows);
    let mut count = 0;

    for record in reader.records() {
        let record = record?;
        if record.len() != columns.len() {
            return Err(TagstoreError::storage(format!(
                "expected {} fields, found {}",
                columns.len(),
                record.len()
            )));
        }
        let values = record
            .iter()
            .zip(columns)
            .map(|(raw, (_, column))| decode_field(raw, *column))
            .collect::<Result<Vec<_>>>()?;
        stmt.execute(params_from_iter(values))?;
        count += 1;
    }

    Ok(count)
}

impl StringTable for SqliteStore {
    fn strings(&self, kind: StringKind) -> Result<Vec<(String, i64)>> {
        let sql = format!(
            "SELECT {}, id FROM {}",
            kind.column_name(),
            kind.table_name()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn insert_string(&mut self, kind: StringKind, value: &str) -> Result<bool> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES (?1)",
            kind.table_name(),
            kind.column_name()
        );
        let inserted = self.conn.execute(&sql, params![value])?;
        Ok(inserted > 0)
    }

    fn insert_strings(&mut self, kind: StringKind, values: &[String]) -> Result<usize> {
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES (?1)",
            kind.table_name(),
            kind.column_name()
        );
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for value in values {
                inserted += stmt.execute(params![value])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}

impl Store for SqliteStore {
    fn max_id(&self, sequence: IdSequence) -> Result<i64> {
        let table = match sequence {
            IdSequence::Documents => "documents",
            IdSequence::Tags => "tags",
        };
        let max = self.conn.query_row(
            &format!("SELECT COALESCE(MAX(id), 0) FROM {table}"),
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn document_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT name FROM documents")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<String>>>()?)
    }

    fn bulk_load(&mut self, loads: Vec<TableLoad<'_>>) -> Result<()> {
        let tx = self.conn.transaction()?;
        for load in loads {
            let table = load.table;
            let count = copy_table(&tx, load)
                .map_err(|e| TagstoreError::storage(format!("COPY failed for '{table}': {e}")))?;
            debug!("copied {count} rows into {table}");
        }
        tx.commit()?;
        Ok(())
    }

    fn document_text(&self, document_id: i64) -> Result<Option<String>> {
        let text = self
            .conn
            .query_row(
                "SELECT text FROM documents WHERE id = ?1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(text)
    }

    fn find_documents(&self, name: &str, path_wildcard: bool) -> Result<Vec<DocumentSummary>> {
        let escaped = name
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = if path_wildcard {
            format!("%/{escaped}")
        } else {
            escaped
        };

        let mut stmt = self.conn.prepare(
            "SELECT id, name FROM documents WHERE name LIKE ?1 ESCAPE '\\' ORDER BY id",
        )?;
        let rows = stmt.query_map(params![pattern], |row| {
            Ok(DocumentSummary {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn document_tags(&self, document_id: i64) -> Result<Vec<StoredTag>> {
        let mut attributes: HashMap<i64, Vec<(String, String)>> = HashMap::new();
        {
            let mut stmt = self.conn.prepare(
                "SELECT ta.tag_id, an.name, COALESCE(av.value, ta.attribute_value)
                 FROM tag_attributes ta
                 JOIN tags t ON t.id = ta.tag_id
                 JOIN attribute_names an ON an.id = ta.attribute_name_id
                 LEFT JOIN attribute_values av ON av.id = ta.attribute_value_id
                 WHERE t.document_id = ?1
                 ORDER BY ta.rowid",
            )?;
            let rows = stmt.query_map(params![document_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get(1)?, row.get(2)?))
            })?;
            for row in rows {
                let (tag_id, name, value) = row?;
                attributes.entry(tag_id).or_default().push((name, value));
            }
        }

        let mut stmt = self.conn.prepare(
            "SELECT t.id, n.name, t.parent_id, t.start_offset, t.end_offset
             FROM tags t JOIN tag_names n ON n.id = t.tag_name_id
             WHERE t.document_id = ?1
             ORDER BY t.start_offset DESC, t.id DESC",
        )?;
        let rows = stmt.query_map(params![document_id], |row| {
            Ok(StoredTag {
                id: row.get(0)?,
                name: row.get(1)?,
                parent: row.get(2)?,
                start_offset: row.get(3)?,
                end_offset: row.get(4)?,
                attributes: Vec::new(),
            })
        })?;

        let mut tags = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        for tag in &mut tags {
            if let Some(attrs) = attributes.remove(&tag.id) {
                tag.attributes = attrs;
            }
        }
        Ok(tags)
    }

    fn token_postings(&self, token: &str) -> Result<Vec<Posting>> {
        let mut stmt = self.conn.prepare(
            "SELECT ii.document_id, ii.positions
             FROM inverted_index ii JOIN tokens t ON t.id = ii.token_id
             WHERE t.token = ?1
             ORDER BY ii.document_id",
        )?;
        let rows = stmt.query_map(params![token], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut postings = Vec::new();
        for row in rows {
            let (document_id, positions) = row?;
            postings.push(Posting {
                document_id,
                positions: parse_positions(&positions)?,
            });
        }
        Ok(postings)
    }

    fn row_count(&self, table_name: &str) -> Result<u64> {
        if !KNOWN_TABLES.contains(&table_name) {
            return Err(TagstoreError::invalid_argument(format!(
                "unknown table '{table_name}'"
            )));
        }
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {table_name}"), [], |row| {
                    row.get(0)
                })?;
        Ok(count as u64)
    }
}

/// Every table the store maintains, in schema order.
pub fn table_names() -> &'static [&'static str] {
    &KNOWN_TABLES
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(store: &mut SqliteStore, table: Table, rows: &str) -> Result<()> {
        store.bulk_load(vec![TableLoad {
            table,
            rows: Box::new(rows.as_bytes()),
        }])
    }

    #[test]
    fn test_insert_string_is_idempotent() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert!(store.insert_string(StringKind::TagName, "article").unwrap());
        assert!(!store.insert_string(StringKind::TagName, "article").unwrap());

        let strings = store.strings(StringKind::TagName).unwrap();
        assert_eq!(strings.len(), 1);
        assert_eq!(strings[0].0, "article");
    }

    #[test]
    fn test_bulk_load_documents_and_tags() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert_string(StringKind::TagName, "doc").unwrap();

        load(&mut store, Table::Documents, "7\t'a.xml'\t'it''s '\n").unwrap();
        load(&mut store, Table::Tags, "1\t7\t1\t0\t''\t0\t5\n").unwrap();

        assert_eq!(store.max_id(IdSequence::Documents).unwrap(), 7);
        assert_eq!(store.max_id(IdSequence::Tags).unwrap(), 1);
        assert_eq!(store.document_text(7).unwrap().as_deref(), Some("it's "));

        let tags = store.document_tags(7).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "doc");
        assert_eq!(tags[0].parent, None);
        assert_eq!(tags[0].end_offset, 5);
    }

    #[test]
    fn test_failed_load_rolls_back_every_table() {
        let mut store = SqliteStore::open_in_memory().unwrap();

        let result = store.bulk_load(vec![
            TableLoad {
                table: Table::Documents,
                rows: Box::new("1\t'a'\t'x '\n".as_bytes()),
            },
            TableLoad {
                table: Table::Tags,
                rows: Box::new("1\t1\t1\t0\t\t4\t2\n".as_bytes()),
            },
        ]);

        match result {
            Err(TagstoreError::Storage(msg)) => assert!(msg.contains("COPY failed for 'tags'")),
            other => panic!("expected storage error, got {other:?}"),
        }
        assert_eq!(store.row_count("documents").unwrap(), 0);
        assert_eq!(store.row_count("tags").unwrap(), 0);
    }

    #[test]
    fn test_find_documents_with_path_wildcard() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        load(
            &mut store,
            Table::Documents,
            "1\t'corpus/a.xml'\t''\n2\t'other/a.xml'\t''\n3\t'b.xml'\t''\n",
        )
        .unwrap();

        assert_eq!(store.find_documents("a.xml", false).unwrap().len(), 0);
        assert_eq!(store.find_documents("a.xml", true).unwrap().len(), 2);
        assert_eq!(store.find_documents("B.XML", false).unwrap()[0].id, 3);
    }

    #[test]
    fn test_token_postings() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        store.insert_string(StringKind::Token, "quick").unwrap();
        let id = store.strings(StringKind::Token).unwrap()[0].1;

        load(
            &mut store,
            Table::InvertedIndex,
            &format!("3\t{id}\t'{{4,11}}'\n"),
        )
        .unwrap();

        let postings = store.token_postings("quick").unwrap();
        assert_eq!(postings.len(), 1);
        assert_eq!(postings[0].document_id, 3);
        assert_eq!(postings[0].positions, vec![4, 11]);
    }

    #[test]
    fn test_row_count_rejects_unknown_tables() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.row_count("sqlite_master; DROP TABLE tags").is_err());
        assert_eq!(table_names().len(), 8);
    }
}
