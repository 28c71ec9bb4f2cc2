//! Document lookup and file generation.

use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::config::GenerateOptions;
use crate::error::{Result, TagstoreError};
use crate::reconstruct::{layout, render};
use crate::store::{DocumentSummary, Store};

/// Rebuilds persisted documents as markup.
#[derive(Debug)]
pub struct DocumentGenerator<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> DocumentGenerator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        DocumentGenerator { store }
    }

    /// The single document matching `name`, case-insensitively.
    ///
    /// With `path_wildcard` any leading directory is accepted. Several
    /// matches are reported with every candidate rather than resolved.
    pub fn find_document(&self, name: &str, path_wildcard: bool) -> Result<DocumentSummary> {
        let mut candidates = self.store.find_documents(name, path_wildcard)?;
        match candidates.len() {
            0 => Err(TagstoreError::not_found(format!("document '{name}'"))),
            1 => Ok(candidates.remove(0)),
            _ => Err(TagstoreError::AmbiguousDocument {
                name: name.to_string(),
                candidates,
            }),
        }
    }

    /// Markup of document `document_id`.
    pub fn reconstruct(&self, document_id: i64, options: &GenerateOptions) -> Result<String> {
        let text = self
            .store
            .document_text(document_id)?
            .ok_or_else(|| TagstoreError::not_found(format!("document {document_id}")))?;
        let tags = self.store.document_tags(document_id)?;
        debug!("document {document_id}: {} tags read", tags.len());

        let markers = layout::arrange(&tags)?;
        render::render(&text, &markers, options)
    }

    /// Write the markup of a document to `output`.
    ///
    /// Nothing is written unless reconstruction succeeds.
    pub fn generate_file(
        &self,
        document_id: Option<i64>,
        output: Option<&Path>,
        options: &GenerateOptions,
    ) -> Result<()> {
        let document_id = document_id
            .ok_or_else(|| TagstoreError::invalid_argument("no document id or name specified"))?;
        let output =
            output.ok_or_else(|| TagstoreError::invalid_argument("no output file specified"))?;

        let markup = self.reconstruct(document_id, options)?;
        fs::write(output, markup)?;
        info!("document {document_id} written to {}", output.display());
        Ok(())
    }
}
