//! Registration of tag and attribute names ahead of indexing.
//!
//! Names are collected from XML documents or from DTDs and interned in one
//! commit, so ids of known vocabularies are assigned up front.

use std::collections::BTreeSet;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ahash::AHashSet;
use lazy_static::lazy_static;
use log::{info, warn};
use regex::Regex;

use crate::analysis::normalize;
use crate::decompose::events::MarkupHandler;
use crate::decompose::xml;
use crate::error::Result;
use crate::store::{StringKind, StringTable};

lazy_static! {
    static ref DTD_ELEMENT: Regex = Regex::new(r"<!ELEMENT (\w*) .*>").unwrap();
    static ref DTD_ATTLIST: Regex = Regex::new(r"<!ATTLIST \w* (\w*) .*>").unwrap();
}

/// Names found in one input.
#[derive(Debug, Default)]
struct NameSet {
    tags: BTreeSet<String>,
    attributes: BTreeSet<String>,
}

impl NameSet {
    fn add_tag(&mut self, raw: &str) {
        let name = normalize::tag_name(raw);
        if !name.is_empty() {
            self.tags.insert(name);
        }
    }

    fn add_attribute(&mut self, raw: &str) {
        let name = normalize::attribute_name(raw);
        if !name.is_empty() {
            self.attributes.insert(name);
        }
    }
}

impl MarkupHandler for NameSet {
    fn tag_start(&mut self, name: &str, attributes: &[(String, String)]) -> Result<()> {
        self.add_tag(name);
        for (attribute, _) in attributes {
            self.add_attribute(attribute);
        }
        Ok(())
    }

    fn tag_end(&mut self, _name: &str) -> Result<()> {
        Ok(())
    }

    fn text(&mut self, _chunk: &str) -> Result<()> {
        Ok(())
    }
}

/// Collects names not yet known to the store.
#[derive(Debug)]
pub struct Preparser {
    existing_tags: AHashSet<String>,
    existing_attributes: AHashSet<String>,
    found: NameSet,
}

impl Preparser {
    pub fn new<T: StringTable + ?Sized>(store: &T) -> Result<Self> {
        let load = |kind| -> Result<AHashSet<String>> {
            Ok(store.strings(kind)?.into_iter().map(|(name, _)| name).collect())
        };
        Ok(Preparser {
            existing_tags: load(StringKind::TagName)?,
            existing_attributes: load(StringKind::AttributeName)?,
            found: NameSet::default(),
        })
    }

    /// Collect names from a file: `.dtd` files are scanned for element and
    /// attribute declarations, anything else is read as XML.
    ///
    /// Names of a file that fails to parse are discarded.
    pub fn parse_file(&mut self, path: &Path) -> Result<()> {
        let is_dtd = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dtd"));

        if is_dtd {
            let content = fs::read_to_string(path)?;
            self.parse_dtd(&content);
            Ok(())
        } else {
            let file = fs::File::open(path)?;
            self.parse_xml(BufReader::new(file))
        }
    }

    pub fn parse_xml<R: BufRead>(&mut self, input: R) -> Result<()> {
        let mut names = NameSet::default();
        xml::feed(input, &mut names)?;
        self.merge(names);
        Ok(())
    }

    pub fn parse_dtd(&mut self, content: &str) {
        let mut names = NameSet::default();
        for capture in DTD_ELEMENT.captures_iter(content) {
            names.add_tag(&capture[1]);
        }
        for capture in DTD_ATTLIST.captures_iter(content) {
            names.add_attribute(&capture[1]);
        }
        self.merge(names);
    }

    fn merge(&mut self, names: NameSet) {
        self.found.tags.extend(
            names
                .tags
                .into_iter()
                .filter(|name| !self.existing_tags.contains(name)),
        );
        self.found.attributes.extend(
            names
                .attributes
                .into_iter()
                .filter(|name| !self.existing_attributes.contains(name)),
        );
    }

    /// New tag names found so far.
    pub fn tag_names(&self) -> &BTreeSet<String> {
        &self.found.tags
    }

    /// New attribute names found so far.
    pub fn attribute_names(&self) -> &BTreeSet<String> {
        &self.found.attributes
    }

    /// Intern every collected name. Returns `(tags, attributes)` inserted.
    pub fn commit<T: StringTable + ?Sized>(self, store: &mut T) -> Result<(usize, usize)> {
        let tags: Vec<String> = self.found.tags.into_iter().collect();
        let attributes: Vec<String> = self.found.attributes.into_iter().collect();

        let new_tags = store.insert_strings(StringKind::TagName, &tags)?;
        let new_attributes = store.insert_strings(StringKind::AttributeName, &attributes)?;
        if new_tags < tags.len() || new_attributes < attributes.len() {
            warn!("some names were registered concurrently");
        }
        info!("{new_tags} tag names and {new_attributes} attribute names registered");
        Ok((new_tags, new_attributes))
    }
}
