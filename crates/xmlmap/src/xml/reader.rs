//! [`XmlSource`] over a quick-xml reader.

use std::collections::VecDeque;

use quick_xml::Reader;
use quick_xml::escape;
use quick_xml::events::{BytesRef, BytesStart, Event};

use crate::error::{MapError, Position, ReadError, Result};
use crate::name::Tag;
use crate::utils::{XML_NAMESPACE, XSI_NAMESPACE};

use super::{StartElement, XmlAttribute, XmlSource, XmlToken};

/// Incremental byte offset to line/column translation.
#[derive(Debug, Clone, Copy)]
struct LineCursor {
    offset: usize,
    line: usize,
    column: usize,
}

impl LineCursor {
    fn new() -> Self {
        Self {
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    fn advance(&mut self, input: &[u8], offset: usize) -> Position {
        let offset = offset.min(input.len());
        if offset < self.offset {
            *self = LineCursor::new();
        }
        for &b in &input[self.offset..offset] {
            if b == b'\n' {
                self.line += 1;
                self.column = 1;
            } else if b & 0xC0 != 0x80 {
                // Continuation bytes belong to the previous column.
                self.column += 1;
            }
        }
        self.offset = offset;
        Position {
            line: self.line,
            column: self.column,
        }
    }
}

/// Reads tokens from an in-memory document.
///
/// The source keeps its own namespace scope stack so element and attribute
/// names come out resolved, and reports the line/column of every start tag.
pub struct QuickXmlSource<'a> {
    reader: Reader<&'a [u8]>,
    input: &'a [u8],
    lookahead: VecDeque<XmlToken>,
    scopes: Vec<Vec<(String, String)>>,
    open: Vec<Tag>,
    cursor: LineCursor,
    last_position: Option<Position>,
}

impl<'a> QuickXmlSource<'a> {
    pub fn new(xml: &'a str) -> Self {
        let mut reader = Reader::from_str(xml);
        let config = reader.config_mut();
        config.expand_empty_elements = false;
        config.trim_text(false);
        Self {
            reader,
            input: xml.as_bytes(),
            lookahead: VecDeque::new(),
            scopes: Vec::new(),
            open: Vec::new(),
            cursor: LineCursor::new(),
            last_position: None,
        }
    }

    fn position_at<O: TryInto<usize>>(&mut self, offset: O) -> Position {
        let offset = offset.try_into().unwrap_or(usize::MAX);
        self.cursor.advance(self.input, offset)
    }

    fn syntax_error(&mut self, message: impl std::fmt::Display) -> MapError {
        let position = self.position_at(self.reader.error_position());
        MapError::syntax(message, Some(position))
    }

    /// Reads events until one token is complete.
    fn fill(&mut self) -> Result<()> {
        let mut text: Option<String> = None;
        loop {
            let offset = self.reader.buffer_position();
            let event = match self.reader.read_event() {
                Ok(event) => event,
                Err(err) => return Err(self.syntax_error(err)),
            };
            let token = match event {
                Event::Text(e) => {
                    let chunk = std::str::from_utf8(&e).map_err(|err| self.syntax_error(err))?;
                    text.get_or_insert_with(String::new).push_str(chunk);
                    continue;
                }
                Event::CData(e) => {
                    let chunk = std::str::from_utf8(&e).map_err(|err| self.syntax_error(err))?;
                    text.get_or_insert_with(String::new).push_str(chunk);
                    continue;
                }
                Event::GeneralRef(e) => {
                    let resolved = self.resolve_reference(&e)?;
                    text.get_or_insert_with(String::new).push(resolved);
                    continue;
                }
                Event::Start(e) => {
                    let position = self.position_at(offset);
                    XmlToken::Start(self.start_element(&e, position)?)
                }
                Event::Empty(e) => {
                    let position = self.position_at(offset);
                    let mut start = self.start_element(&e, position)?;
                    start.self_closing = true;
                    let end = self.close_element();
                    if let Some(t) = text.take() {
                        self.lookahead.push_back(XmlToken::Text(t));
                    }
                    self.lookahead.push_back(XmlToken::Start(start));
                    self.lookahead.push_back(end);
                    return Ok(());
                }
                Event::End(_) => self.close_element(),
                Event::Eof => XmlToken::Eof,
                Event::Comment(_) | Event::PI(_) | Event::Decl(_) | Event::DocType(_) => continue,
            };
            if let Some(t) = text.take() {
                self.lookahead.push_back(XmlToken::Text(t));
            }
            self.lookahead.push_back(token);
            return Ok(());
        }
    }

    fn close_element(&mut self) -> XmlToken {
        self.scopes.pop();
        XmlToken::End(self.open.pop().unwrap_or_else(|| Tag::unqualified("")))
    }

    fn resolve_reference(&mut self, e: &BytesRef<'_>) -> Result<char> {
        let name = std::str::from_utf8(e).map_err(|err| self.syntax_error(err))?;
        let resolved = if let Some(num) = name.strip_prefix('#') {
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => num.parse().ok(),
            };
            code.and_then(char::from_u32)
        } else {
            escape::resolve_predefined_entity(name).and_then(|s| s.chars().next())
        };
        match resolved {
            Some(c) => Ok(c),
            None => Err(self.syntax_error(format!("unknown entity reference '&{};'", name))),
        }
    }

    fn lookup(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, ns)| ns.as_str())
            .filter(|ns| !ns.is_empty())
    }

    fn resolve_name(&self, qname: &str, is_attribute: bool, position: Position) -> Result<Tag> {
        match qname.split_once(':') {
            Some((prefix, local)) => match self.lookup(prefix) {
                Some(ns) => Ok(Tag::new(Some(ns), local)),
                None => Err(ReadError::UnboundPrefix {
                    prefix: prefix.to_string(),
                    location: Some(position).into(),
                }
                .into()),
            },
            // Unprefixed attributes are never in the default namespace.
            None if is_attribute => Ok(Tag::unqualified(qname)),
            None => Ok(Tag::new(self.lookup(""), qname)),
        }
    }

    fn start_element(&mut self, e: &BytesStart<'_>, position: Position) -> Result<StartElement> {
        let mut bindings = Vec::new();
        let mut raw = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(|err| MapError::syntax(err, Some(position)))?;
            let key = std::str::from_utf8(attr.key.as_ref())
                .map_err(|err| MapError::syntax(err, Some(position)))?;
            let value = std::str::from_utf8(&attr.value)
                .map_err(|err| MapError::syntax(err, Some(position)))?;
            let value = escape::unescape(value)
                .map_err(|err| MapError::syntax(err, Some(position)))?
                .into_owned();
            if key == "xmlns" {
                bindings.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                bindings.push((prefix.to_string(), value));
            } else {
                raw.push((key.to_string(), value));
            }
        }
        self.scopes.push(bindings);

        let qname = std::str::from_utf8(e.name().as_ref())
            .map_err(|err| MapError::syntax(err, Some(position)))?
            .to_string();
        let tag = self.resolve_name(&qname, false, position)?;

        let xsi_type = Tag::new(Some(XSI_NAMESPACE), "type");
        let mut attributes = Vec::with_capacity(raw.len());
        let mut type_hint = None;
        for (key, value) in raw {
            let name = self.resolve_name(&key, true, position)?;
            if name == xsi_type {
                type_hint = Some(self.resolve_name(value.trim(), false, position)?);
            }
            attributes.push(XmlAttribute { name, value });
        }

        self.open.push(tag.clone());
        Ok(StartElement {
            tag,
            attributes,
            type_hint,
            position: Some(position),
            self_closing: false,
        })
    }
}

impl XmlSource for QuickXmlSource<'_> {
    fn peek(&mut self) -> Result<&XmlToken> {
        if self.lookahead.is_empty() {
            self.fill()?;
        }
        self.lookahead
            .front()
            .ok_or_else(|| MapError::syntax("token stream exhausted", self.last_position))
    }

    fn next_token(&mut self) -> Result<XmlToken> {
        if self.lookahead.is_empty() {
            self.fill()?;
        }
        let token = self
            .lookahead
            .pop_front()
            .ok_or_else(|| MapError::syntax("token stream exhausted", self.last_position))?;
        if let XmlToken::Start(start) = &token {
            self.last_position = start.position;
        }
        Ok(token)
    }

    fn position(&self) -> Option<Position> {
        self.last_position
    }

    fn namespace_of(&self, prefix: &str) -> Option<&str> {
        self.lookup(prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(xml: &str) -> Vec<XmlToken> {
        let mut source = QuickXmlSource::new(xml);
        let mut out = Vec::new();
        loop {
            let token = source.next_token().unwrap();
            let done = token == XmlToken::Eof;
            out.push(token);
            if done {
                return out;
            }
        }
    }

    #[test]
    fn test_empty_element_yields_start_and_end() {
        let toks = tokens("<a/>");
        assert!(matches!(&toks[0], XmlToken::Start(s) if s.tag.local() == "a"));
        assert_eq!(toks[1], XmlToken::End(Tag::unqualified("a")));
        assert_eq!(toks[2], XmlToken::Eof);
    }

    #[test]
    fn test_self_closing_is_reported() {
        let toks = tokens("<a><b/><c></c></a>");
        assert!(matches!(&toks[1], XmlToken::Start(s) if s.self_closing));
        assert!(matches!(&toks[3], XmlToken::Start(s) if !s.self_closing));
        assert!(matches!(&toks[4], XmlToken::End(t) if t.local() == "c"));
    }

    #[test]
    fn test_text_is_coalesced() {
        let toks = tokens("<a>x &amp; y<![CDATA[<z>]]>&#65;</a>");
        assert_eq!(toks[1], XmlToken::Text("x & y<z>A".to_string()));
        assert!(matches!(toks[2], XmlToken::End(_)));
    }

    #[test]
    fn test_namespaces_resolve_and_declarations_are_hidden() {
        let xml = r#"<p:a xmlns:p="urn:p" xmlns="urn:d" p:x="1" y="2"><b/></p:a>"#;
        let toks = tokens(xml);
        let XmlToken::Start(a) = &toks[0] else {
            panic!("expected start");
        };
        assert_eq!(a.tag, Tag::new(Some("urn:p"), "a"));
        assert_eq!(a.attributes.len(), 2);
        assert_eq!(a.attribute(&Tag::new(Some("urn:p"), "x")), Some("1"));
        assert_eq!(a.attribute(&Tag::unqualified("y")), Some("2"));
        let XmlToken::Start(b) = &toks[1] else {
            panic!("expected start");
        };
        assert_eq!(b.tag, Tag::new(Some("urn:d"), "b"));
    }

    #[test]
    fn test_type_hint_and_undeclared_default() {
        let xml = concat!(
            r#"<a xmlns="urn:d" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:s="urn:s">"#,
            r#"<b xsi:type="s:Circle"/><c xmlns=""/></a>"#
        );
        let toks = tokens(xml);
        let XmlToken::Start(b) = &toks[1] else {
            panic!("expected start");
        };
        assert_eq!(b.type_hint, Some(Tag::new(Some("urn:s"), "Circle")));
        let XmlToken::Start(c) = &toks[3] else {
            panic!("expected start");
        };
        assert_eq!(c.tag, Tag::unqualified("c"));
    }

    #[test]
    fn test_unbound_prefix_is_reported() {
        let mut source = QuickXmlSource::new("<a>\n  <q:b/></a>");
        source.next_token().unwrap();
        let err = source.next_token().unwrap_err();
        assert!(matches!(
            err,
            MapError::Read(ReadError::UnboundPrefix { ref prefix, .. }) if prefix == "q"
        ));
        assert_eq!(err.position(), Some(Position { line: 2, column: 3 }));
    }

    #[test]
    fn test_positions_and_skip_subtree() {
        let mut source = QuickXmlSource::new("<a>\n  <b><c/>text</b>\n  <d/>\n</a>");
        source.next_token().unwrap();
        source.next_token().unwrap();
        let XmlToken::Start(b) = source.next_token().unwrap() else {
            panic!("expected start");
        };
        assert_eq!(b.position, Some(Position { line: 2, column: 3 }));
        source.skip_subtree().unwrap();
        source.next_token().unwrap();
        let XmlToken::Start(d) = source.next_token().unwrap() else {
            panic!("expected start");
        };
        assert_eq!(d.tag.local(), "d");
        assert_eq!(source.position(), Some(Position { line: 3, column: 3 }));
    }
}
