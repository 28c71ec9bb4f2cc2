//! XML tokenizer adapter built on `quick-xml`.
//!
//! Empty elements are reported as a start immediately followed by an end,
//! CDATA sections as text, and entities are unescaped. Comments, processing
//! instructions and the doctype are skipped.

use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::decompose::events::MarkupHandler;
use crate::error::{Result, TagstoreError};

/// Feed every event of `input` to `handler`.
pub fn feed<R: BufRead, H: MarkupHandler + ?Sized>(input: R, handler: &mut H) -> Result<()> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(false);

    let mut buf = Vec::new();
    loop {
        let event = reader.read_event_into(&mut buf).map_err(|e| {
            TagstoreError::markup(format!("at byte {}: {e}", reader.error_position()))
        })?;

        match event {
            Event::Start(start) => {
                let (name, attributes) = decode_start(&start)?;
                handler.tag_start(&name, &attributes)?;
            }
            Event::Empty(start) => {
                let (name, attributes) = decode_start(&start)?;
                handler.tag_start(&name, &attributes)?;
                handler.tag_end(&name)?;
            }
            Event::End(end) => {
                let name = decode_name(end.name().as_ref())?;
                handler.tag_end(&name)?;
            }
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|e| TagstoreError::markup(e.to_string()))?;
                handler.text(&text)?;
            }
            Event::CData(data) => {
                let raw = data.into_inner();
                let text = std::str::from_utf8(&raw)
                    .map_err(|e| TagstoreError::markup(format!("invalid UTF-8 in CDATA: {e}")))?;
                handler.text(text)?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(())
}

fn decode_name(raw: &[u8]) -> Result<String> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|e| TagstoreError::markup(format!("invalid UTF-8 in name: {e}")))
}

fn decode_start(start: &BytesStart<'_>) -> Result<(String, Vec<(String, String)>)> {
    let name = decode_name(start.name().as_ref())?;

    let mut attributes = Vec::new();
    let mut iter = start.attributes();
    // Duplicates are reported downstream, not rejected here.
    iter.with_checks(false);
    for attribute in iter {
        let attribute = attribute.map_err(|e| TagstoreError::markup(e.to_string()))?;
        let key = decode_name(attribute.key.as_ref())?;
        let value = attribute
            .unescape_value()
            .map_err(|e| TagstoreError::markup(e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok((name, attributes))
}
