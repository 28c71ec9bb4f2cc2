//! Configuration for ingestion and reconstruction.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::normalize;
use crate::error::{Result, TagstoreError};
use crate::interner::DEFAULT_RETRY_LIMIT;
use crate::storage::SpoolConfig;

/// How `tag_num` counts earlier siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiblingNumbering {
    /// Count siblings with the same name under the same parent.
    #[default]
    ByNameAndParent,
    /// Count every earlier tag with the same name in the document.
    ByName,
}

/// How attribute values are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeValueStorage {
    #[default]
    Interned,
    Inline,
}

/// Multi-document splitting.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitterConfig {
    /// Tag delimiting one logical document.
    pub boundary_tag: String,
    /// Attribute of the boundary tag holding the document name.
    pub name_attribute: Option<String>,
    /// Child tag whose text is the document name.
    pub name_tag: Option<String>,
}

impl SplitterConfig {
    pub fn new<S: Into<String>>(boundary_tag: S) -> Self {
        SplitterConfig {
            boundary_tag: boundary_tag.into(),
            ..Default::default()
        }
    }

    pub fn with_name_attribute<S: Into<String>>(mut self, attribute: S) -> Self {
        self.name_attribute = Some(attribute.into());
        self
    }

    pub fn with_name_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.name_tag = Some(tag.into());
        self
    }
}

/// Configuration of an ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Split every input on a boundary tag.
    pub splitter: Option<SplitterConfig>,
    /// Resident memory ceiling in megabytes.
    pub max_memory_mb: u64,
    /// Completed documents (or inputs) between memory checks.
    pub refresh_frequency: usize,
    pub spool: SpoolConfig,
    /// Reject a document whose name is already present.
    pub unique_document_names: bool,
    pub index_tokens: bool,
    pub min_token_length: usize,
    pub sibling_numbering: SiblingNumbering,
    pub attribute_values: AttributeValueStorage,
    pub retry_limit: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            splitter: None,
            max_memory_mb: 2000,
            refresh_frequency: 100,
            spool: SpoolConfig::Memory,
            unique_document_names: false,
            index_tokens: true,
            min_token_length: 2,
            sibling_numbering: SiblingNumbering::default(),
            attribute_values: AttributeValueStorage::default(),
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }
}

impl IngestConfig {
    /// Load a JSON configuration file. Missing keys take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            TagstoreError::config(format!("cannot read '{}': {e}", path.display()))
        })?;
        let config: IngestConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Reject settings that would fail the run later on.
    pub fn validate(&self) -> Result<()> {
        self.spool.validate()?;

        if let Some(splitter) = &self.splitter {
            if splitter.boundary_tag.trim().is_empty() {
                return Err(TagstoreError::config("boundary tag must not be empty"));
            }
        }
        if self.retry_limit == 0 {
            return Err(TagstoreError::config("retry limit must be at least 1"));
        }
        if self.min_token_length == 0 {
            return Err(TagstoreError::config(
                "minimum token length must be at least 1",
            ));
        }
        if self.refresh_frequency == 0 {
            return Err(TagstoreError::config(
                "refresh frequency must be at least 1",
            ));
        }
        Ok(())
    }

    /// Memory ceiling in bytes.
    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_mb.saturating_mul(1024 * 1024)
    }
}

/// Parameters of one reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    /// Spaces per nesting level (newline mode only).
    pub indent_width: usize,
    pub use_newlines: bool,
    /// Tags never followed by a line break.
    pub excluded_tags: BTreeSet<String>,
}

impl GenerateOptions {
    pub fn pretty(indent_width: usize) -> Self {
        GenerateOptions {
            indent_width,
            use_newlines: true,
            excluded_tags: BTreeSet::new(),
        }
    }

    /// Keep `tag` inline. The name is normalized like stored tag names.
    pub fn exclude(mut self, tag: &str) -> Self {
        let name = normalize::tag_name(tag);
        if !name.is_empty() {
            self.excluded_tags.insert(name);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = IngestConfig::default();
        assert_eq!(config.max_memory_mb, 2000);
        assert_eq!(config.refresh_frequency, 100);
        assert_eq!(config.retry_limit, 4);
        assert!(config.index_tokens);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_file_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"splitter": {{"boundary_tag": "article", "name_attribute": "id"}},
                "unique_document_names": true,
                "sibling_numbering": "by_name"}}"#
        )
        .unwrap();

        let config = IngestConfig::from_json_file(file.path()).unwrap();
        let splitter = config.splitter.as_ref().unwrap();
        assert_eq!(splitter.boundary_tag, "article");
        assert_eq!(splitter.name_attribute.as_deref(), Some("id"));
        assert!(config.unique_document_names);
        assert_eq!(config.sibling_numbering, SiblingNumbering::ByName);
        assert_eq!(config.min_token_length, 2);
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let config = IngestConfig {
            spool: SpoolConfig::File {
                dir: "/definitely/not/here".into(),
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(TagstoreError::Config(_))));

        let config = IngestConfig {
            splitter: Some(SplitterConfig::new("  ")),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = IngestConfig {
            retry_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generate_options() {
        let options = GenerateOptions::pretty(2).exclude("b");
        assert!(options.use_newlines);
        assert!(options.excluded_tags.contains("b"));

        let options = GenerateOptions::default().exclude(" Em ").exclude("B").exclude("  ");
        let excluded: Vec<&str> = options.excluded_tags.iter().map(String::as_str).collect();
        assert_eq!(excluded, vec!["b", "em"]);
    }
}
