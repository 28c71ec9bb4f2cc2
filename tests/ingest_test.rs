use std::fs;

use tempfile::Builder;

use tagstore::config::{IngestConfig, SplitterConfig};
use tagstore::decompose::{Decomposer, xml};
use tagstore::error::TagstoreError;
use tagstore::ingest::{Indexer, load_spooled};
use tagstore::sink::{BulkSink, Field};
use tagstore::storage::{OpenMode, SpoolConfig};
use tagstore::store::{Posting, SqliteStore, Store, Table};

#[test]
fn test_duplicate_document_name_is_rejected() {
    let config = IngestConfig {
        unique_document_names: true,
        ..Default::default()
    };
    let store = SqliteStore::open_in_memory().unwrap();
    let mut decomposer = Decomposer::new(store, &config).unwrap();

    decomposer.start_document(Some("a.xml")).unwrap();
    xml::feed("<doc>first</doc>".as_bytes(), &mut decomposer).unwrap();
    decomposer.end_document().unwrap();
    decomposer.close().unwrap();

    // A second run sees the persisted name.
    let store = decomposer.into_store();
    let mut decomposer = Decomposer::new(store, &config).unwrap();
    let result = decomposer.start_document(Some("a.xml"));
    assert!(matches!(result, Err(TagstoreError::DuplicateDocument(_))));
    decomposer.abort_document();

    decomposer.start_document(Some("b.xml")).unwrap();
    xml::feed("<doc>second</doc>".as_bytes(), &mut decomposer).unwrap();
    // the rejected document used up id 2
    assert_eq!(decomposer.end_document().unwrap(), 3);
    decomposer.close().unwrap();

    let store = decomposer.into_store();
    assert_eq!(store.row_count("documents").unwrap(), 2);
}

#[test]
fn test_failed_flush_loads_nothing() {
    let mut store = SqliteStore::open_in_memory().unwrap();
    let mut sink = BulkSink::new(SpoolConfig::Memory);
    sink.open(OpenMode::Write).unwrap();

    sink.write_row(
        Table::Documents,
        &[Field::Int(1), Field::Text("a.xml"), Field::Text("text ")],
    )
    .unwrap();
    // start offset after end offset
    sink.write_row(
        Table::Tags,
        &[
            Field::Int(1),
            Field::Int(1),
            Field::Int(1),
            Field::Int(0),
            Field::OptInt(None),
            Field::Int(5),
            Field::Int(2),
        ],
    )
    .unwrap();

    assert!(sink.flush(&mut store).is_err());
    assert_eq!(store.row_count("documents").unwrap(), 0);
    assert_eq!(store.row_count("tags").unwrap(), 0);
    assert_eq!(sink.pending_rows(), 2);
}

#[test]
fn test_token_positions() {
    let store = SqliteStore::open_in_memory().unwrap();
    let mut decomposer = Decomposer::new(store, &IngestConfig::default()).unwrap();
    decomposer.start_document(Some("fox.xml")).unwrap();
    xml::feed(
        "<doc><p>The quick</p><p>brown fox, quick!</p></doc>".as_bytes(),
        &mut decomposer,
    )
    .unwrap();
    decomposer.end_document().unwrap();
    decomposer.close().unwrap();
    let store = decomposer.into_store();

    assert_eq!(
        store.document_text(1).unwrap().as_deref(),
        Some("The quick brown fox, quick! ")
    );
    assert_eq!(
        store.token_postings("quick").unwrap(),
        vec![Posting {
            document_id: 1,
            positions: vec![4, 21],
        }]
    );
    assert_eq!(store.token_postings("fox").unwrap()[0].positions, vec![16]);
    assert!(store.token_postings("a").unwrap().is_empty());
}

#[test]
fn test_index_only_then_copy_only() {
    let corpus = Builder::new().prefix("corpus").tempdir().unwrap();
    let spool_dir = Builder::new().prefix("spool").tempdir().unwrap();
    fs::write(
        corpus.path().join("books.xml"),
        r#"<books><book id="b1"><p>one</p></book><book id="b2"><p>two</p></book></books>"#,
    )
    .unwrap();

    let spool = SpoolConfig::File {
        dir: spool_dir.path().to_path_buf(),
    };
    let config = IngestConfig {
        splitter: Some(SplitterConfig::new("book").with_name_attribute("id")),
        spool: spool.clone(),
        ..Default::default()
    };

    let store = SqliteStore::open_in_memory().unwrap();
    let mut indexer = Indexer::new(store, config).unwrap();
    indexer.index_paths(&[corpus.path().to_path_buf()]).unwrap();
    let (report, mut store) = indexer.finish_without_load().unwrap();

    assert_eq!(report.documents, 2);
    assert!(spool_dir.path().join("tmp_documents.dat").exists());
    assert_eq!(store.row_count("documents").unwrap(), 0);
    // names were interned while indexing
    assert_eq!(store.row_count("tag_names").unwrap(), 2);

    load_spooled(&mut store, &spool).unwrap();
    assert_eq!(store.row_count("documents").unwrap(), 2);
    assert_eq!(store.row_count("tags").unwrap(), 4);
    assert_eq!(store.row_count("tag_attributes").unwrap(), 2);
    assert_eq!(store.find_documents("b2", false).unwrap()[0].id, 2);
}

#[test]
fn test_ids_continue_across_runs() {
    let dir = Builder::new().prefix("runs").tempdir().unwrap();
    let db = dir.path().join("corpus.db");
    let input = dir.path().join("a.xml");
    fs::write(&input, "<doc><p>text</p></doc>").unwrap();

    for _ in 0..2 {
        let store = SqliteStore::open(&db).unwrap();
        let mut indexer = Indexer::new(store, IngestConfig::default()).unwrap();
        indexer.index_file(&input).unwrap();
        indexer.finish().unwrap();
    }

    let store = SqliteStore::open(&db).unwrap();
    assert_eq!(store.row_count("documents").unwrap(), 2);
    let tags = store.document_tags(2).unwrap();
    let ids: Vec<i64> = tags.iter().map(|tag| tag.id).collect();
    assert_eq!(ids, vec![4, 3]);
    assert_eq!(tags[0].parent, Some(3));
}
