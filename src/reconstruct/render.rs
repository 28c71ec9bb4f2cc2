//! Serialization of markers and text.

use quick_xml::escape::{escape, partial_escape};

use crate::config::GenerateOptions;
use crate::error::{Result, TagstoreError};
use crate::reconstruct::layout::{Marker, MarkerKind};
use crate::store::StoredTag;

fn attribute_string(tag: &StoredTag) -> String {
    tag.attributes
        .iter()
        .map(|(name, value)| format!(" {name}=\"{}\"", escape(value.as_str())))
        .collect()
}

fn markup(marker: &Marker<'_>) -> String {
    let tag = marker.tag;
    match marker.kind {
        MarkerKind::Open => format!("<{}{}>", tag.name, attribute_string(tag)),
        MarkerKind::SelfClosing => format!("<{}{}/>", tag.name, attribute_string(tag)),
        MarkerKind::Close => format!("</{}>", tag.name),
    }
}

/// Char-indexed view over the document text.
struct CharText<'a> {
    text: &'a str,
    /// Byte index of every char, plus the text length.
    bounds: Vec<usize>,
}

impl<'a> CharText<'a> {
    fn new(text: &'a str) -> Self {
        let mut bounds: Vec<usize> = text.char_indices().map(|(index, _)| index).collect();
        bounds.push(text.len());
        CharText { text, bounds }
    }

    fn len(&self) -> usize {
        self.bounds.len() - 1
    }

    fn slice(&self, from: usize, to: usize) -> Result<&'a str> {
        match (self.bounds.get(from), self.bounds.get(to)) {
            (Some(&start), Some(&end)) if from <= to => Ok(&self.text[start..end]),
            _ => Err(TagstoreError::structure(format!(
                "offsets {from}..{to} outside of text of {} chars",
                self.len()
            ))),
        }
    }
}

/// Interleave `markers` with `text`.
///
/// In newline mode every text slice ends a line and so does every close or
/// self-closing marker, as well as any marker directly followed by another
/// marker at the same position. Markers of excluded tags never end a line.
/// Lines are indented by `indent_width` spaces per open tag.
pub fn render(text: &str, markers: &[Marker<'_>], options: &GenerateOptions) -> Result<String> {
    let text = CharText::new(text);
    let newlines = options.use_newlines;
    let mut out = String::with_capacity(text.text.len() * 2);
    let mut current = 0;
    let mut depth: usize = 0;

    let indent = |out: &mut String, depth: usize| {
        if newlines && (out.is_empty() || out.ends_with('\n')) {
            out.extend(std::iter::repeat_n(' ', depth * options.indent_width));
        }
    };

    for (i, marker) in markers.iter().enumerate() {
        let chunk = text.slice(current, marker.position)?;
        if !chunk.is_empty() {
            indent(&mut out, depth);
            out.push_str(&partial_escape(chunk));
            if newlines {
                out.push('\n');
            }
        }

        if marker.kind == MarkerKind::Close {
            depth = depth.saturating_sub(1);
        }
        indent(&mut out, depth);
        out.push_str(&markup(marker));
        current = marker.position;

        let mut line_break = match marker.kind {
            MarkerKind::Open => {
                depth += 1;
                false
            }
            MarkerKind::Close | MarkerKind::SelfClosing => true,
        };
        if markers
            .get(i + 1)
            .is_some_and(|next| next.position == marker.position)
        {
            line_break = true;
        }
        if options.excluded_tags.contains(&marker.tag.name) {
            line_break = false;
        }
        if newlines && line_break {
            out.push('\n');
        }
    }

    let tail = text.slice(current, text.len())?;
    out.push_str(&partial_escape(tail));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconstruct::layout::arrange;

    fn tag(id: i64, name: &str, parent: Option<i64>, start: i64, end: i64) -> StoredTag {
        StoredTag {
            id,
            name: name.to_string(),
            parent,
            start_offset: start,
            end_offset: end,
            attributes: Vec::new(),
        }
    }

    fn sample() -> Vec<StoredTag> {
        // doc [0,12] > p [0,6], br [6,6], p [6,12]; text "hello world "
        let mut doc = tag(1, "doc", None, 0, 12);
        doc.attributes.push(("title".into(), "a \"b\" & c".into()));
        vec![
            tag(4, "p", Some(1), 6, 12),
            tag(3, "br", Some(1), 6, 6),
            tag(2, "p", Some(1), 0, 6),
            doc,
        ]
    }

    #[test]
    fn test_compact_output() {
        let tags = sample();
        let markers = arrange(&tags).unwrap();
        let xml = render("hello world ", &markers, &GenerateOptions::default()).unwrap();
        assert_eq!(
            xml,
            "<doc title=\"a &quot;b&quot; &amp; c\"><p>hello </p><br/><p>world </p></doc>"
        );
    }

    #[test]
    fn test_pretty_output() {
        let tags = sample();
        let markers = arrange(&tags).unwrap();
        let xml = render("hello world ", &markers, &GenerateOptions::pretty(2)).unwrap();
        let expected = "<doc title=\"a &quot;b&quot; &amp; c\">\n  <p>hello \n  </p>\n  <br/>\n  <p>world \n  </p>\n</doc>\n";
        assert_eq!(xml, expected);
    }

    #[test]
    fn test_excluded_tags_stay_inline() {
        // p [0,9] > b [0,5]; text "bold end "
        let tags = vec![tag(2, "b", Some(1), 0, 5), tag(1, "p", None, 0, 9)];
        let markers = arrange(&tags).unwrap();
        let options = GenerateOptions::pretty(0).exclude("b");
        let xml = render("bold end ", &markers, &options).unwrap();
        assert_eq!(xml, "<p>\n<b>bold \n</b>end \n</p>\n");
    }

    #[test]
    fn test_excluded_tag_names_ignore_case() {
        let tags = vec![tag(2, "b", Some(1), 0, 5), tag(1, "p", None, 0, 9)];
        let markers = arrange(&tags).unwrap();
        let options = GenerateOptions::pretty(0).exclude("B");
        let xml = render("bold end ", &markers, &options).unwrap();
        assert_eq!(xml, "<p>\n<b>bold \n</b>end \n</p>\n");
    }

    #[test]
    fn test_text_is_escaped_and_offsets_are_chars() {
        let tags = vec![tag(1, "t", None, 2, 4)];
        let markers = arrange(&tags).unwrap();
        let xml = render("é<ü> ", &markers, &GenerateOptions::default()).unwrap();
        assert_eq!(xml, "é&lt;<t>ü&gt;</t> ");
    }

    #[test]
    fn test_offsets_beyond_text_fail() {
        let tags = vec![tag(1, "t", None, 0, 40)];
        let markers = arrange(&tags).unwrap();
        assert!(render("short ", &markers, &GenerateOptions::default()).is_err());
    }
}
