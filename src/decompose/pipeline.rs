//! Decomposition state machine.
//!
//! One [`Decomposer`] owns the store, the bulk sink and the interner for a
//! whole ingestion run. Documents are built one at a time: rows of the open
//! document are kept aside and only reach the sink when the document ends,
//! so an aborted document never leaves rows behind.
//!
//! Offsets count chars of the normalized document text. A tag's start offset
//! is unknown until the first text inside it arrives; a tag that never sees
//! text gets `start == end`.

use std::collections::BTreeMap;

use ahash::{AHashMap, AHashSet};
use log::{debug, info, warn};

use crate::analysis::normalize::{self, MAX_NAME_LENGTH};
use crate::analysis::tokenizer::Tokenizer;
use crate::analysis::tokenizer::regex::RegexTokenizer;
use crate::config::{AttributeValueStorage, IngestConfig, SiblingNumbering};
use crate::decompose::events::MarkupHandler;
use crate::error::{Result, TagstoreError};
use crate::interner::Interner;
use crate::model::{AttributeRow, AttributeValue, DocumentRow, PostingRow, TagRow};
use crate::sink::BulkSink;
use crate::storage::OpenMode;
use crate::store::{IdSequence, Store, StringKind};

/// An open tag.
#[derive(Debug, Clone)]
struct TagFrame {
    id: i64,
    name: String,
    name_id: i64,
    parent_id: Option<i64>,
    sibling_index: i64,
    start_offset: Option<usize>,
    /// Smallest start and largest end among finalized children.
    children_span: Option<(usize, usize)>,
}

/// State of the document being built.
#[derive(Debug)]
struct OpenDocument {
    id: i64,
    name: Option<String>,
    /// Whether `name` was added to the known-name set by this document.
    owns_name: bool,
    text: String,
    text_chars: usize,
    stack: Vec<TagFrame>,
    sibling_counts: AHashMap<(i64, Option<i64>), i64>,
    tags: Vec<TagRow>,
    attributes: Vec<AttributeRow>,
}

impl OpenDocument {
    fn new(id: i64) -> Self {
        OpenDocument {
            id,
            name: None,
            owns_name: false,
            text: String::new(),
            text_chars: 0,
            stack: Vec::new(),
            sibling_counts: AHashMap::new(),
            tags: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

/// Streaming decomposition pipeline.
pub struct Decomposer<S: Store> {
    store: S,
    sink: BulkSink,
    interner: Interner,
    tokenizer: Option<RegexTokenizer>,
    sibling_numbering: SiblingNumbering,
    attribute_values: AttributeValueStorage,
    /// Persisted and pending names, when uniqueness is enforced.
    known_names: Option<AHashSet<String>>,
    last_document_id: i64,
    last_tag_id: i64,
    current: Option<OpenDocument>,
    documents_done: u64,
    warnings: Vec<String>,
}

impl<S: Store> std::fmt::Debug for Decomposer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decomposer")
            .field("sink", &self.sink)
            .field("last_document_id", &self.last_document_id)
            .field("last_tag_id", &self.last_tag_id)
            .field("documents_done", &self.documents_done)
            .finish()
    }
}

impl<S: Store> Decomposer<S> {
    /// Prepare a run over `store`: open the sink, load interned strings and
    /// seed the id sequences.
    pub fn new(store: S, config: &IngestConfig) -> Result<Self> {
        config.validate()?;

        let mut sink = BulkSink::new(config.spool.clone());
        sink.open(OpenMode::Write)?;

        let mut interner = Interner::new(config.retry_limit);
        interner.preload(&store)?;
        for kind in StringKind::ALL {
            debug!("{} {kind} strings read from store", interner.len(kind));
        }

        let known_names = if config.unique_document_names {
            let names: AHashSet<String> = store.document_names()?.into_iter().collect();
            info!("{} existing document names read from store", names.len());
            Some(names)
        } else {
            None
        };

        let tokenizer = if config.index_tokens {
            Some(RegexTokenizer::with_min_length(config.min_token_length)?)
        } else {
            None
        };

        let last_document_id = store.max_id(IdSequence::Documents)?;
        let last_tag_id = store.max_id(IdSequence::Tags)?;

        Ok(Decomposer {
            store,
            sink,
            interner,
            tokenizer,
            sibling_numbering: config.sibling_numbering,
            attribute_values: config.attribute_values,
            known_names,
            last_document_id,
            last_tag_id,
            current: None,
            documents_done: 0,
            warnings: Vec::new(),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Give the store back, dropping any unflushed rows.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Whether a document is being built.
    pub fn in_document(&self) -> bool {
        self.current.is_some()
    }

    /// Id of the open document.
    pub fn document_id(&self) -> Option<i64> {
        self.current.as_ref().map(|doc| doc.id)
    }

    /// Name of the open document, if known yet.
    pub fn document_name(&self) -> Option<&str> {
        self.current.as_ref().and_then(|doc| doc.name.as_deref())
    }

    /// Documents completed since the pipeline was created.
    pub fn documents_done(&self) -> u64 {
        self.documents_done
    }

    /// Anomalies recorded so far.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Log an anomaly and keep it for the run report.
    pub fn warn<S2: Into<String>>(&mut self, message: S2) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }

    /// Begin a new document.
    pub fn start_document(&mut self, name: Option<&str>) -> Result<()> {
        if let Some(doc) = &self.current {
            return Err(TagstoreError::structure(format!(
                "document {} is still open",
                doc.id
            )));
        }

        self.last_document_id += 1;
        self.current = Some(OpenDocument::new(self.last_document_id));
        debug!("document {} started", self.last_document_id);

        if let Some(name) = name {
            self.set_document_name(name)?;
        }
        Ok(())
    }

    /// Name the open document.
    ///
    /// Names longer than the limit are cut with a warning. Fails with
    /// [`TagstoreError::DuplicateDocument`] when uniqueness is enforced and
    /// the name is taken.
    pub fn set_document_name(&mut self, name: &str) -> Result<()> {
        let mut name = name.to_string();
        if normalize::cut(&mut name, MAX_NAME_LENGTH) {
            self.warn(format!(
                "document name is too long (>{MAX_NAME_LENGTH}): '{name}'"
            ));
        }

        let doc = self
            .current
            .as_mut()
            .ok_or_else(|| TagstoreError::structure("no open document to name"))?;

        if let Some(previous) = doc.name.take() {
            if doc.owns_name {
                if let Some(names) = self.known_names.as_mut() {
                    names.remove(&previous);
                }
            }
        }
        doc.owns_name = false;

        if let Some(names) = self.known_names.as_mut() {
            if !name.is_empty() {
                if names.contains(&name) {
                    return Err(TagstoreError::duplicate_document(name));
                }
                names.insert(name.clone());
                doc.owns_name = true;
            }
        }
        doc.name = Some(name);
        Ok(())
    }

    /// Open a tag.
    pub fn tag_start(&mut self, name: &str, attributes: &[(String, String)]) -> Result<()> {
        let name = normalize::tag_name(name);
        if self.current.is_none() {
            return Err(TagstoreError::structure(format!(
                "tag '{name}' outside of any document"
            )));
        }

        let name_id = self
            .interner
            .resolve_id(&mut self.store, StringKind::TagName, &name)?;

        self.last_tag_id += 1;
        let id = self.last_tag_id;

        let doc = self
            .current
            .as_mut()
            .ok_or_else(|| TagstoreError::structure("no open document"))?;
        let parent_id = doc.stack.last().map(|frame| frame.id);
        let counter_key = match self.sibling_numbering {
            SiblingNumbering::ByNameAndParent => (name_id, parent_id),
            SiblingNumbering::ByName => (name_id, None),
        };
        let counter = doc.sibling_counts.entry(counter_key).or_insert(0);
        let sibling_index = *counter;
        *counter += 1;

        doc.stack.push(TagFrame {
            id,
            name,
            name_id,
            parent_id,
            sibling_index,
            start_offset: None,
            children_span: None,
        });

        self.add_attributes(id, attributes)
    }

    fn add_attributes(&mut self, tag_id: i64, attributes: &[(String, String)]) -> Result<()> {
        let mut seen: Vec<String> = Vec::with_capacity(attributes.len());

        for (raw_name, raw_value) in attributes {
            let name = normalize::attribute_name(raw_name);
            if name.is_empty() {
                continue;
            }
            if seen.contains(&name) {
                self.warn(format!(
                    "tag {tag_id} has two attributes named '{name}', keeping the first"
                ));
                continue;
            }

            let name_id = self
                .interner
                .resolve_id(&mut self.store, StringKind::AttributeName, &name)?;
            let value = normalize::clean(raw_value);
            let value = match self.attribute_values {
                AttributeValueStorage::Interned => AttributeValue::Interned(
                    self.interner
                        .resolve_id(&mut self.store, StringKind::AttributeValue, &value)?,
                ),
                AttributeValueStorage::Inline => AttributeValue::Inline(value),
            };

            seen.push(name);
            if let Some(doc) = self.current.as_mut() {
                doc.attributes.push(AttributeRow {
                    tag_id,
                    name_id,
                    value,
                });
            }
        }
        Ok(())
    }

    /// Append a text chunk.
    pub fn text(&mut self, chunk: &str) -> Result<()> {
        let doc = self
            .current
            .as_mut()
            .ok_or_else(|| TagstoreError::structure("text outside of any document"))?;

        let chunk = normalize::clean(chunk);
        if chunk.is_empty() {
            return Ok(());
        }

        let position = doc.text_chars;
        for frame in doc.stack.iter_mut().rev() {
            if frame.start_offset.is_some() {
                break;
            }
            frame.start_offset = Some(position);
        }

        doc.text_chars += normalize::char_len(&chunk) + 1;
        doc.text.push_str(&chunk);
        doc.text.push(' ');
        Ok(())
    }

    /// Close the innermost open tag, which must be named `name`.
    pub fn tag_end(&mut self, name: &str) -> Result<()> {
        let name = normalize::tag_name(name);
        let doc = self
            .current
            .as_mut()
            .ok_or_else(|| TagstoreError::structure(format!("end of '{name}' outside of any document")))?;

        let frame = doc.stack.pop().ok_or_else(|| {
            TagstoreError::structure(format!("end of '{name}' without matching start"))
        })?;
        if frame.name != name {
            return Err(TagstoreError::structure(format!(
                "end of '{name}' while '{}' is open",
                frame.name
            )));
        }

        let end = doc.text_chars;
        let start = frame.start_offset.unwrap_or(end);
        if start > end {
            return Err(TagstoreError::InvalidOffsets {
                tag_id: frame.id,
                start: start as i64,
                end: end as i64,
            });
        }
        if let Some((child_start, child_end)) = frame.children_span {
            if child_start < start || child_end > end {
                return Err(TagstoreError::structure(format!(
                    "tag {} [{start};{end}] does not contain its children [{child_start};{child_end}]",
                    frame.id
                )));
            }
        }

        if let Some(parent) = doc.stack.last_mut() {
            parent.children_span = Some(match parent.children_span {
                Some((s, e)) => (s.min(start), e.max(end)),
                None => (start, end),
            });
        }

        doc.tags.push(TagRow {
            id: frame.id,
            document_id: doc.id,
            name_id: frame.name_id,
            sibling_index: frame.sibling_index,
            parent_id: frame.parent_id,
            start_offset: start as i64,
            end_offset: end as i64,
        });
        Ok(())
    }

    /// Finalize the open document: tokenize its text and hand every row to
    /// the sink.
    pub fn end_document(&mut self) -> Result<i64> {
        let doc = self
            .current
            .take()
            .ok_or_else(|| TagstoreError::structure("no open document to end"))?;
        if !doc.stack.is_empty() {
            let unclosed = doc
                .stack
                .iter()
                .map(|frame| frame.name.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            self.current = Some(doc);
            return Err(TagstoreError::structure(format!(
                "document ends with unclosed tags: {unclosed}"
            )));
        }

        let postings = match self.index_tokens(doc.id, &doc.text) {
            Ok(postings) => postings,
            Err(e) => {
                self.current = Some(doc);
                return Err(e);
            }
        };

        let name = match doc.name {
            Some(name) => name,
            None => {
                self.warn(format!("document {} has no name", doc.id));
                String::new()
            }
        };

        self.sink.write(&DocumentRow {
            id: doc.id,
            name,
            text: doc.text,
        })?;
        for tag in &doc.tags {
            self.sink.write(tag)?;
        }
        for attribute in &doc.attributes {
            self.sink.write(attribute)?;
        }
        for posting in &postings {
            self.sink.write(posting)?;
        }

        self.documents_done += 1;
        debug!(
            "document {} ended: {} tags, {} attributes, {} tokens",
            doc.id,
            doc.tags.len(),
            doc.attributes.len(),
            postings.len()
        );
        Ok(doc.id)
    }

    fn index_tokens(&mut self, document_id: i64, text: &str) -> Result<Vec<PostingRow>> {
        let Some(tokenizer) = &self.tokenizer else {
            return Ok(Vec::new());
        };

        let mut positions: BTreeMap<i64, Vec<u32>> = BTreeMap::new();
        for token in tokenizer.tokenize(text)? {
            let token_id =
                self.interner
                    .resolve_id(&mut self.store, StringKind::Token, &token.text)?;
            positions
                .entry(token_id)
                .or_default()
                .push(token.start_offset as u32);
        }

        Ok(positions
            .into_iter()
            .map(|(token_id, positions)| PostingRow {
                document_id,
                token_id,
                positions,
            })
            .collect())
    }

    /// Drop the open document and every row it produced.
    pub fn abort_document(&mut self) {
        if let Some(doc) = self.current.take() {
            if doc.owns_name {
                if let (Some(names), Some(name)) = (self.known_names.as_mut(), doc.name.as_ref()) {
                    names.remove(name);
                }
            }
            debug!("document {} aborted", doc.id);
        }
    }

    /// Bulk-load every completed document.
    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush(&mut self.store)
    }

    /// Flush and release the sink.
    pub fn close(&mut self) -> Result<()> {
        self.abort_document();
        self.sink.close(&mut self.store)
    }

    /// Release the sink without loading, leaving spool files in place.
    pub fn close_without_load(&mut self) -> Result<()> {
        self.abort_document();
        self.sink.close_without_load()
    }

    /// Rows written to the sink and not yet loaded.
    pub fn pending_rows(&self) -> u64 {
        self.sink.pending_rows()
    }
}

impl<S: Store> MarkupHandler for Decomposer<S> {
    fn tag_start(&mut self, name: &str, attributes: &[(String, String)]) -> Result<()> {
        Decomposer::tag_start(self, name, attributes)
    }

    fn tag_end(&mut self, name: &str) -> Result<()> {
        Decomposer::tag_end(self, name)
    }

    fn text(&mut self, chunk: &str) -> Result<()> {
        Decomposer::text(self, chunk)
    }
}
