//! Multi-document splitting.
//!
//! A [`DocumentSplitter`] sits between a markup stream and a [`Decomposer`]
//! and turns every occurrence of a boundary tag into one document. Content
//! outside boundary tags is ignored. A document that fails is dropped and
//! the splitter skips ahead to the end of its boundary tag; a boundary that
//! closes above the depth it opened at ends the whole stream.

use log::{debug, info};

use crate::analysis::normalize;
use crate::config::SplitterConfig;
use crate::decompose::events::MarkupHandler;
use crate::decompose::memory::MemoryGuard;
use crate::decompose::pipeline::Decomposer;
use crate::error::{ErrorScope, Result, TagstoreError};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SplitState {
    /// Outside any boundary tag.
    Waiting,
    /// Inside a boundary tag opened at `depth`.
    InDocument { depth: usize },
    /// Inside a failed document's boundary tag opened at `depth`.
    Skipping { depth: usize },
}

/// Outcome of splitting one stream.
#[derive(Debug, Default)]
pub struct SplitSummary {
    /// Documents handed to the sink.
    pub documents: usize,
    /// `(document label, error)` for every dropped document.
    pub failures: Vec<(String, TagstoreError)>,
}

/// Splits one input stream into documents.
#[derive(Debug)]
pub struct DocumentSplitter<'a, S: Store> {
    decomposer: &'a mut Decomposer<S>,
    boundary_tag: String,
    name_attribute: Option<String>,
    name_tag: Option<String>,
    guard: Option<&'a MemoryGuard>,
    refresh_frequency: usize,
    source: String,
    state: SplitState,
    depth: usize,
    waiting_for_name: bool,
    documents_seen: usize,
    since_check: usize,
    summary: SplitSummary,
}

impl<'a, S: Store> DocumentSplitter<'a, S> {
    /// Split the stream named `source` into documents fed to `decomposer`.
    pub fn new(decomposer: &'a mut Decomposer<S>, config: &SplitterConfig, source: &str) -> Self {
        let name_attribute = config.name_attribute.as_deref().map(normalize::attribute_name);
        let mut name_tag = config.name_tag.as_deref().map(normalize::tag_name);
        if name_attribute.is_some() && name_tag.is_some() {
            decomposer.warn(format!(
                "both a naming attribute and a naming tag are configured, using attribute '{}'",
                name_attribute.as_deref().unwrap_or_default()
            ));
            name_tag = None;
        }

        DocumentSplitter {
            decomposer,
            boundary_tag: normalize::tag_name(&config.boundary_tag),
            name_attribute,
            name_tag,
            guard: None,
            refresh_frequency: usize::MAX,
            source: source.to_string(),
            state: SplitState::Waiting,
            depth: 0,
            waiting_for_name: false,
            documents_seen: 0,
            since_check: 0,
            summary: SplitSummary::default(),
        }
    }

    /// Check memory every `refresh_frequency` completed documents and flush
    /// when the guard reports pressure.
    pub fn with_memory_guard(mut self, guard: &'a MemoryGuard, refresh_frequency: usize) -> Self {
        self.guard = Some(guard);
        self.refresh_frequency = refresh_frequency.max(1);
        self
    }

    /// Finish the stream. A document still open is dropped.
    pub fn finish(mut self) -> SplitSummary {
        if matches!(self.state, SplitState::InDocument { .. }) {
            let error = TagstoreError::structure(format!(
                "stream ended inside boundary tag '{}'",
                self.boundary_tag
            ));
            self.drop_document(error);
        }
        info!(
            "{}: {} documents, {} failed",
            self.source,
            self.summary.documents,
            self.summary.failures.len()
        );
        self.summary
    }

    /// Give up on the stream after an unrecoverable error, dropping any
    /// open document without charging it as a separate failure.
    pub fn abandon(self) -> SplitSummary {
        self.decomposer.abort_document();
        self.summary
    }

    fn label(&self) -> String {
        match self.decomposer.document_name() {
            Some(name) if !name.is_empty() => format!("{} ({name})", self.source),
            _ => format!("{} #{}", self.source, self.documents_seen),
        }
    }

    fn drop_document(&mut self, error: TagstoreError) {
        let label = self.label();
        self.decomposer.warn(format!("indexing '{label}' failed: {error}"));
        self.decomposer.abort_document();
        self.summary.failures.push((label, error));
        self.waiting_for_name = false;
    }

    /// Route a decomposer result: document-level failures drop the document
    /// and skip to its end, anything else stops the stream.
    fn absorb(&mut self, result: Result<()>, document_depth: usize) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(error) if error.scope() == ErrorScope::Document => {
                self.drop_document(error);
                self.state = SplitState::Skipping {
                    depth: document_depth,
                };
                Ok(())
            }
            Err(error) => {
                self.decomposer.abort_document();
                Err(error)
            }
        }
    }

    fn begin_document(&mut self, attributes: &[(String, String)]) -> Result<()> {
        self.decomposer.start_document(None)?;

        if let Some(attribute) = &self.name_attribute {
            let name = attributes
                .iter()
                .find(|(key, _)| normalize::attribute_name(key) == *attribute)
                .map(|(_, value)| value.clone())
                .ok_or_else(|| {
                    TagstoreError::invalid_argument(format!(
                        "document has no attribute '{attribute}'"
                    ))
                })?;
            self.decomposer.set_document_name(&name)?;
        }
        Ok(())
    }

    fn complete_document(&mut self) -> Result<()> {
        let id = self.decomposer.end_document()?;
        self.summary.documents += 1;
        self.since_check += 1;
        debug!("{}: document {id} complete", self.source);

        if self.since_check >= self.refresh_frequency {
            self.since_check = 0;
            if let Some(guard) = self.guard {
                if guard.should_flush() {
                    info!("memory above threshold, flushing buffers");
                    self.decomposer.flush()?;
                }
            }
        }
        Ok(())
    }
}

impl<S: Store> MarkupHandler for DocumentSplitter<'_, S> {
    fn tag_start(&mut self, name: &str, attributes: &[(String, String)]) -> Result<()> {
        self.depth += 1;
        let normalized = normalize::tag_name(name);

        match self.state {
            SplitState::Waiting => {
                if normalized != self.boundary_tag {
                    return Ok(());
                }
                self.documents_seen += 1;
                let depth = self.depth;
                self.state = SplitState::InDocument { depth };

                let result = self.begin_document(attributes);
                self.absorb(result, depth)?;
                if matches!(self.state, SplitState::InDocument { .. }) {
                    let result = self.decomposer.tag_start(name, attributes);
                    self.absorb(result, depth)?;
                }
                Ok(())
            }
            SplitState::InDocument { depth } => {
                if let Some(tag) = &self.name_tag {
                    if *tag == normalized && self.decomposer.document_name().is_none() {
                        self.waiting_for_name = true;
                    }
                }
                let result = self.decomposer.tag_start(name, attributes);
                self.absorb(result, depth)
            }
            SplitState::Skipping { .. } => Ok(()),
        }
    }

    fn tag_end(&mut self, name: &str) -> Result<()> {
        let normalized = normalize::tag_name(name);
        let depth = self.depth;
        self.depth = self.depth.saturating_sub(1);

        match self.state {
            SplitState::Waiting => Ok(()),
            SplitState::InDocument { depth: start } => {
                if normalized == self.boundary_tag {
                    if depth < start {
                        let error = TagstoreError::stream_boundary(format!(
                            "'{}' closed at depth {depth}, opened at depth {start}",
                            self.boundary_tag
                        ));
                        self.decomposer.abort_document();
                        return Err(error);
                    }
                    if depth > start {
                        self.decomposer.warn(format!(
                            "{}: document contains a nested '{}' tag",
                            self.source, self.boundary_tag
                        ));
                    } else {
                        let result = self
                            .decomposer
                            .tag_end(name)
                            .and_then(|()| self.complete_document());
                        self.state = SplitState::Waiting;
                        self.waiting_for_name = false;
                        return match result {
                            Ok(()) => Ok(()),
                            Err(error) if error.scope() == ErrorScope::Document => {
                                self.drop_document(error);
                                Ok(())
                            }
                            Err(error) => {
                                self.decomposer.abort_document();
                                Err(error)
                            }
                        };
                    }
                }
                let result = self.decomposer.tag_end(name);
                self.absorb(result, start)
            }
            SplitState::Skipping { depth: start } => {
                if normalized == self.boundary_tag {
                    if depth < start {
                        return Err(TagstoreError::stream_boundary(format!(
                            "'{}' closed at depth {depth}, opened at depth {start}",
                            self.boundary_tag
                        )));
                    }
                    if depth == start {
                        self.state = SplitState::Waiting;
                    }
                }
                Ok(())
            }
        }
    }

    fn text(&mut self, chunk: &str) -> Result<()> {
        let SplitState::InDocument { depth } = self.state else {
            return Ok(());
        };

        if self.waiting_for_name {
            let name = normalize::clean(chunk);
            if !name.is_empty() {
                self.waiting_for_name = false;
                let result = self.decomposer.set_document_name(&name);
                self.absorb(result, depth)?;
                if !matches!(self.state, SplitState::InDocument { .. }) {
                    return Ok(());
                }
            }
        }

        let result = self.decomposer.text(chunk);
        self.absorb(result, depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::decompose::memory::tests::FixedProbe;
    use crate::decompose::xml;
    use crate::store::{
        DocumentSummary, IdSequence, Posting, SqliteStore, StoredTag, StringKind, StringTable,
        TableLoad,
    };

    /// Store that never hands out an id for one tag name.
    struct ForgetfulStore {
        inner: SqliteStore,
        lost: &'static str,
    }

    impl StringTable for ForgetfulStore {
        fn strings(&self, kind: StringKind) -> Result<Vec<(String, i64)>> {
            let mut rows = self.inner.strings(kind)?;
            if kind == StringKind::TagName {
                rows.retain(|(value, _)| value != self.lost);
            }
            Ok(rows)
        }

        fn insert_string(&mut self, kind: StringKind, value: &str) -> Result<bool> {
            if kind == StringKind::TagName && value == self.lost {
                return Ok(false);
            }
            self.inner.insert_string(kind, value)
        }
    }

    impl Store for ForgetfulStore {
        fn max_id(&self, sequence: IdSequence) -> Result<i64> {
            self.inner.max_id(sequence)
        }

        fn document_names(&self) -> Result<Vec<String>> {
            self.inner.document_names()
        }

        fn bulk_load(&mut self, loads: Vec<TableLoad<'_>>) -> Result<()> {
            self.inner.bulk_load(loads)
        }

        fn document_text(&self, document_id: i64) -> Result<Option<String>> {
            self.inner.document_text(document_id)
        }

        fn find_documents(&self, name: &str, path_wildcard: bool) -> Result<Vec<DocumentSummary>> {
            self.inner.find_documents(name, path_wildcard)
        }

        fn document_tags(&self, document_id: i64) -> Result<Vec<StoredTag>> {
            self.inner.document_tags(document_id)
        }

        fn token_postings(&self, token: &str) -> Result<Vec<Posting>> {
            self.inner.token_postings(token)
        }

        fn row_count(&self, table_name: &str) -> Result<u64> {
            self.inner.row_count(table_name)
        }
    }

    fn decomposer(unique: bool) -> Decomposer<SqliteStore> {
        let config = IngestConfig {
            unique_document_names: unique,
            ..Default::default()
        };
        Decomposer::new(SqliteStore::open_in_memory().unwrap(), &config).unwrap()
    }

    fn split(d: &mut Decomposer<SqliteStore>, config: &SplitterConfig, input: &str) -> Result<SplitSummary> {
        let mut splitter = DocumentSplitter::new(d, config, "corpus.xml");
        xml::feed(input.as_bytes(), &mut splitter)?;
        Ok(splitter.finish())
    }

    #[test]
    fn test_splits_on_boundary_with_attribute_names() {
        let mut d = decomposer(false);
        let config = SplitterConfig::new("article").with_name_attribute("id");
        let input = r#"<corpus><meta>ignored</meta>
            <article id="a1"><p>first</p></article>
            <article id="a2"><p>second</p></article></corpus>"#;

        let summary = split(&mut d, &config, input).unwrap();
        assert_eq!(summary.documents, 2);
        assert!(summary.failures.is_empty());

        d.close().unwrap();
        let mut names = d.store().document_names().unwrap();
        names.sort();
        assert_eq!(names, vec!["a1".to_string(), "a2".to_string()]);
        // Only article and p tags are stored.
        assert_eq!(d.store().row_count("tags").unwrap(), 4);
        let doc = &d.store().find_documents("a1", false).unwrap()[0];
        assert_eq!(d.store().document_text(doc.id).unwrap().as_deref(), Some("first "));
    }

    #[test]
    fn test_child_tag_names_document() {
        let mut d = decomposer(false);
        let config = SplitterConfig::new("doc").with_name_tag("title");
        let input = "<all><doc><title> Hello  World </title><p>x</p></doc></all>";

        split(&mut d, &config, input).unwrap();
        d.close().unwrap();
        assert_eq!(d.store().document_names().unwrap(), vec!["Hello World".to_string()]);
    }

    #[test]
    fn test_missing_name_attribute_drops_document() {
        let mut d = decomposer(false);
        let config = SplitterConfig::new("doc").with_name_attribute("id");
        let input = r#"<all><doc><p>x</p></doc><doc id="ok"><p>y</p></doc></all>"#;

        let summary = split(&mut d, &config, input).unwrap();
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.failures.len(), 1);
        d.close().unwrap();
        assert_eq!(d.store().document_names().unwrap(), vec!["ok".to_string()]);
    }

    #[test]
    fn test_duplicate_name_skips_to_next_document() {
        let mut d = decomposer(true);
        let config = SplitterConfig::new("doc").with_name_attribute("id");
        let input = r#"<all>
            <doc id="same"><p>one</p></doc>
            <doc id="same"><p>two</p><doc>nested</doc></doc>
            <doc id="other"><p>three</p></doc></all>"#;

        let summary = split(&mut d, &config, input).unwrap();
        assert_eq!(summary.documents, 2);
        assert!(matches!(
            summary.failures[0].1,
            TagstoreError::DuplicateDocument(_)
        ));

        d.close().unwrap();
        let doc = &d.store().find_documents("same", false).unwrap()[0];
        assert_eq!(d.store().document_text(doc.id).unwrap().as_deref(), Some("one "));
    }

    #[test]
    fn test_nested_boundary_is_a_warning() {
        let mut d = decomposer(false);
        let config = SplitterConfig::new("doc");
        let input = "<all><doc><doc>inner</doc>outer</doc></all>";

        let summary = split(&mut d, &config, input).unwrap();
        assert_eq!(summary.documents, 1);
        assert!(d.warnings().iter().any(|w| w.contains("nested 'doc'")));
        d.close().unwrap();
        assert_eq!(d.store().row_count("tags").unwrap(), 2);
    }

    #[test]
    fn test_boundary_closing_above_its_depth_ends_stream() {
        let mut d = decomposer(false);
        let config = SplitterConfig::new("doc");
        let mut splitter = DocumentSplitter::new(&mut d, &config, "s");
        splitter.tag_start("all", &[]).unwrap();
        splitter.tag_start("doc", &[]).unwrap();
        // The wrapper closes first: the document is dropped...
        splitter.tag_end("all").unwrap();
        // ...and the boundary then closes one level too high.
        let err = splitter.tag_end("doc").unwrap_err();
        assert!(matches!(err, TagstoreError::StreamBoundary(_)));

        let summary = splitter.finish();
        assert_eq!(summary.documents, 0);
        assert_eq!(summary.failures.len(), 1);
    }

    #[test]
    fn test_unresolvable_tag_name_drops_only_its_document() {
        let store = ForgetfulStore {
            inner: SqliteStore::open_in_memory().unwrap(),
            lost: "lost",
        };
        let mut d = Decomposer::new(store, &IngestConfig::default()).unwrap();
        let config = SplitterConfig::new("doc").with_name_attribute("id");
        let input = r#"<all><doc id="a"><lost>x</lost></doc><doc id="b"><p>y</p></doc></all>"#;

        let summary = {
            let mut splitter = DocumentSplitter::new(&mut d, &config, "corpus.xml");
            xml::feed(input.as_bytes(), &mut splitter).unwrap();
            splitter.finish()
        };
        assert_eq!(summary.documents, 1);
        assert_eq!(summary.failures.len(), 1);
        assert!(matches!(
            summary.failures[0].1,
            TagstoreError::Identity { .. }
        ));

        d.close().unwrap();
        assert_eq!(d.store().row_count("documents").unwrap(), 1);
        assert_eq!(d.store().document_names().unwrap(), vec!["b".to_string()]);
        assert_eq!(d.store().row_count("tags").unwrap(), 2);
    }

    #[test]
    fn test_memory_pressure_flushes() {
        let mut d = decomposer(false);
        let config = SplitterConfig::new("doc");
        let guard = MemoryGuard::new(Box::new(FixedProbe(Some(90))), 100);
        let input = "<all><doc>a</doc><doc>b</doc><doc>c</doc></all>";
        {
            let mut splitter =
                DocumentSplitter::new(&mut d, &config, "m").with_memory_guard(&guard, 2);
            xml::feed(input.as_bytes(), &mut splitter).unwrap();
            splitter.finish();
        }
        // The first two documents were flushed, the third is still pending.
        assert_eq!(d.store().row_count("documents").unwrap(), 2);
        assert!(d.pending_rows() > 0);
    }
}
