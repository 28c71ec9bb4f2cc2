//! Markup event callbacks.

use crate::error::Result;

/// Receiver of SAX-style markup events.
///
/// Attribute order carries no meaning. Returning an error stops the
/// producer.
pub trait MarkupHandler {
    fn tag_start(&mut self, name: &str, attributes: &[(String, String)]) -> Result<()>;

    fn tag_end(&mut self, name: &str) -> Result<()>;

    fn text(&mut self, chunk: &str) -> Result<()>;
}

/// Records events, mostly useful in tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EventLog {
    pub events: Vec<String>,
}

impl MarkupHandler for EventLog {
    fn tag_start(&mut self, name: &str, attributes: &[(String, String)]) -> Result<()> {
        let attrs: Vec<String> = attributes.iter().map(|(k, v)| format!(" {k}={v}")).collect();
        self.events.push(format!("<{name}{}>", attrs.concat()));
        Ok(())
    }

    fn tag_end(&mut self, name: &str) -> Result<()> {
        self.events.push(format!("</{name}>"));
        Ok(())
    }

    fn text(&mut self, chunk: &str) -> Result<()> {
        self.events.push(chunk.to_string());
        Ok(())
    }
}
