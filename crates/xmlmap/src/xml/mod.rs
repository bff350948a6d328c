//! Stream abstraction consumed by the engines.
//!
//! The engines never touch a parser or writer directly. They read tokens from
//! an [`XmlSource`] and emit them to an [`XmlSink`]; both are forward-only and
//! never buffer beyond the current node. [`QuickXmlSource`] and
//! [`QuickXmlSink`] implement them over quick-xml.
//!
//! ## Tokens
//!
//! | Token | Produced for |
//! |-------|--------------|
//! | [`XmlToken::Start`] | `<a ...>` and the opening half of `<a/>` |
//! | [`XmlToken::End`] | `</a>` and the closing half of `<a/>` |
//! | [`XmlToken::Text`] | character data, CDATA and entity references, coalesced |
//! | [`XmlToken::Eof`] | end of input |
//!
//! Comments, processing instructions and the XML declaration are dropped.
//! Namespace declarations are consumed by the source and never show up as
//! attributes.

mod reader;
mod writer;

pub use reader::QuickXmlSource;
pub use writer::QuickXmlSink;

use crate::error::{Position, ReadError, Result};
use crate::name::Tag;
use crate::utils::XSI_NAMESPACE;

/// One attribute of a start tag, with its namespace resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub name: Tag,
    pub value: String,
}

/// A start tag with resolved names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartElement {
    pub tag: Tag,
    pub attributes: Vec<XmlAttribute>,
    /// Resolved `xsi:type` value.
    pub type_hint: Option<Tag>,
    pub position: Option<Position>,
    /// Written as `<a/>` rather than `<a></a>`.
    pub self_closing: bool,
}

impl StartElement {
    pub fn attribute(&self, name: &Tag) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == *name)
            .map(|a| a.value.as_str())
    }

    /// Checks for `xsi:nil="true"`.
    pub fn is_nil(&self) -> bool {
        self.attribute(&Tag::new(Some(XSI_NAMESPACE), "nil"))
            .is_some_and(|v| matches!(v.trim(), "true" | "1"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlToken {
    Start(StartElement),
    End(Tag),
    Text(String),
    Eof,
}

/// Forward-only token reader.
pub trait XmlSource {
    /// Returns the next token without consuming it.
    fn peek(&mut self) -> Result<&XmlToken>;

    fn next_token(&mut self) -> Result<XmlToken>;

    /// Position of the most recently consumed token.
    fn position(&self) -> Option<Position>;

    /// Namespace bound to a prefix at the most recently read start tag, for
    /// converters that parse qualified names out of text.
    fn namespace_of(&self, prefix: &str) -> Option<&str>;

    /// Skips the rest of the element whose start tag was just consumed,
    /// including its end tag.
    fn skip_subtree(&mut self) -> Result<()> {
        let mut depth = 1usize;
        loop {
            match self.next_token()? {
                XmlToken::Start(_) => depth += 1,
                XmlToken::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                XmlToken::Text(_) => {}
                XmlToken::Eof => {
                    return Err(ReadError::UnexpectedEof {
                        location: self.position().into(),
                    }
                    .into());
                }
            }
        }
    }
}

/// Forward-only token writer.
///
/// The sink owns namespace bookkeeping: elements and attributes are started
/// with resolved [`Tag`]s and the sink picks prefixes, declaring any that are
/// not yet in scope on the element being written.
pub trait XmlSink {
    /// Queues namespace bindings (prefix, namespace) to be declared on the
    /// next element started. An empty prefix binds the default namespace.
    fn declare_namespaces(&mut self, bindings: &[(String, String)]);

    fn start_element(&mut self, tag: &Tag) -> Result<()>;

    /// Adds an attribute to the element just started. Fails once content has
    /// been written to it.
    fn attribute(&mut self, name: &Tag, value: &str) -> Result<()>;

    /// Returns the qualified name (`p:local`) for a tag used inside an
    /// attribute value, declaring its namespace on the current element when
    /// it is not in scope.
    fn qualify(&mut self, tag: &Tag) -> Result<String>;

    fn text(&mut self, text: &str) -> Result<()>;

    fn end_element(&mut self) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_marker() {
        let start = StartElement {
            tag: Tag::unqualified("Name"),
            attributes: vec![XmlAttribute {
                name: Tag::new(Some(XSI_NAMESPACE), "nil"),
                value: "true".to_string(),
            }],
            type_hint: None,
            position: None,
            self_closing: true,
        };
        assert!(start.is_nil());
        assert_eq!(start.attribute(&Tag::unqualified("nil")), None);
    }
}
