//! [`XmlSink`] over a quick-xml writer.

use std::io::Write;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{MapError, Result};
use crate::name::Tag;
use crate::utils::{XSI_NAMESPACE, XSI_PREFIX};

use super::XmlSink;

/// Writes tokens through a quick-xml writer.
///
/// A start tag is held back until its first child, text or end arrives, so
/// attributes and namespace declarations can still be added, and so elements
/// without content come out self-closing.
pub struct QuickXmlSink<W: Write> {
    writer: Writer<W>,
    pending: Option<BytesStart<'static>>,
    open: Vec<String>,
    /// Namespace bindings (prefix, namespace) declared on each open element.
    scopes: Vec<Vec<(String, String)>>,
    queued: Vec<(String, String)>,
    generated: usize,
    xml_declaration: bool,
}

impl<W: Write> QuickXmlSink<W> {
    pub fn new(inner: W) -> Self {
        Self::with_options(inner, None, false)
    }

    pub fn with_options(inner: W, indent: Option<usize>, xml_declaration: bool) -> Self {
        let writer = match indent {
            Some(size) => Writer::new_with_indent(inner, b' ', size),
            None => Writer::new(inner),
        };
        Self {
            writer,
            pending: None,
            open: Vec::new(),
            scopes: Vec::new(),
            queued: Vec::new(),
            generated: 0,
            xml_declaration,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn flush_pending(&mut self) -> Result<()> {
        if let Some(start) = self.pending.take() {
            self.writer.write_event(Event::Start(start))?;
        }
        Ok(())
    }

    /// Namespace bound to a prefix at the current point; `None` when unbound.
    fn bound(&self, prefix: &str) -> Option<&str> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .find(|(p, _)| p == prefix)
            .map(|(_, ns)| ns.as_str())
            .filter(|ns| !ns.is_empty())
    }

    /// A non-empty prefix currently bound to the namespace.
    fn prefix_for(&self, namespace: &str) -> Option<String> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|scope| scope.iter().rev())
            .filter(|(p, ns)| !p.is_empty() && ns == namespace)
            .map(|(p, _)| p.clone())
            .find(|p| self.bound(p) == Some(namespace))
    }

    fn fresh_prefix(&mut self, namespace: &str) -> String {
        if namespace == XSI_NAMESPACE && self.bound(XSI_PREFIX).is_none() {
            return XSI_PREFIX.to_string();
        }
        loop {
            self.generated += 1;
            let candidate = format!("ns{}", self.generated);
            if self.bound(&candidate).is_none() {
                return candidate;
            }
        }
    }

    /// Binds a prefix on the pending element.
    fn bind(&mut self, prefix: &str, namespace: &str) -> Result<()> {
        let start = self
            .pending
            .as_mut()
            .ok_or_else(|| MapError::syntax("namespace declared outside a start tag", None))?;
        let key = if prefix.is_empty() {
            "xmlns".to_string()
        } else {
            format!("xmlns:{}", prefix)
        };
        start.push_attribute((key.as_str(), namespace));
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((prefix.to_string(), namespace.to_string()));
        }
        Ok(())
    }

    /// Prefix for a namespace used by an attribute or attribute value,
    /// declaring one when needed.
    fn ensure_prefix(&mut self, namespace: &str) -> Result<String> {
        if let Some(prefix) = self.prefix_for(namespace) {
            return Ok(prefix);
        }
        let prefix = self.fresh_prefix(namespace);
        self.bind(&prefix, namespace)?;
        Ok(prefix)
    }
}

impl<W: Write> XmlSink for QuickXmlSink<W> {
    fn declare_namespaces(&mut self, bindings: &[(String, String)]) {
        self.queued.extend(bindings.iter().cloned());
    }

    fn start_element(&mut self, tag: &Tag) -> Result<()> {
        self.flush_pending()?;
        if self.xml_declaration {
            self.xml_declaration = false;
            self.writer
                .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;
        }

        // Queued bindings already apply to the element's own name.
        self.scopes.push(Vec::new());
        let queued = std::mem::take(&mut self.queued);
        for (prefix, namespace) in &queued {
            if let Some(scope) = self.scopes.last_mut() {
                scope.push((prefix.clone(), namespace.clone()));
            }
        }

        let mut declare: Option<(String, String)> = None;
        let qname = match tag.namespace() {
            None => {
                if self.bound("").is_some() {
                    declare = Some((String::new(), String::new()));
                }
                tag.local().to_string()
            }
            Some(ns) if self.bound("") == Some(ns) => tag.local().to_string(),
            Some(ns) => match self.prefix_for(ns) {
                Some(prefix) => format!("{}:{}", prefix, tag.local()),
                None => {
                    let prefix = self.fresh_prefix(ns);
                    let qname = format!("{}:{}", prefix, tag.local());
                    declare = Some((prefix, ns.to_string()));
                    qname
                }
            },
        };

        let mut start = BytesStart::new(qname.clone());
        for (prefix, namespace) in &queued {
            if prefix.is_empty() {
                start.push_attribute(("xmlns", namespace.as_str()));
            } else {
                start.push_attribute((format!("xmlns:{}", prefix).as_str(), namespace.as_str()));
            }
        }
        self.pending = Some(start);
        self.open.push(qname);
        if let Some((prefix, namespace)) = declare {
            self.bind(&prefix, &namespace)?;
        }
        Ok(())
    }

    fn attribute(&mut self, name: &Tag, value: &str) -> Result<()> {
        let qname = match name.namespace() {
            None => name.local().to_string(),
            Some(ns) => format!("{}:{}", self.ensure_prefix(ns)?, name.local()),
        };
        let start = self
            .pending
            .as_mut()
            .ok_or_else(|| MapError::syntax("attribute written outside a start tag", None))?;
        start.push_attribute((qname.as_str(), value));
        Ok(())
    }

    fn qualify(&mut self, tag: &Tag) -> Result<String> {
        match tag.namespace() {
            None => Ok(tag.local().to_string()),
            Some(ns) if self.bound("") == Some(ns) => Ok(tag.local().to_string()),
            Some(ns) => Ok(format!("{}:{}", self.ensure_prefix(ns)?, tag.local())),
        }
    }

    fn text(&mut self, text: &str) -> Result<()> {
        self.flush_pending()?;
        if !text.is_empty() {
            self.writer.write_event(Event::Text(BytesText::new(text)))?;
        }
        Ok(())
    }

    fn end_element(&mut self) -> Result<()> {
        let name = self
            .open
            .pop()
            .ok_or_else(|| MapError::syntax("end tag without matching start tag", None))?;
        self.scopes.pop();
        match self.pending.take() {
            Some(start) => self.writer.write_event(Event::Empty(start))?,
            None => self.writer.write_event(Event::End(BytesEnd::new(name)))?,
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.flush_pending()?;
        self.writer.get_mut().flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(f: impl FnOnce(&mut QuickXmlSink<Vec<u8>>) -> Result<()>) -> String {
        let mut sink = QuickXmlSink::new(Vec::new());
        f(&mut sink).unwrap();
        sink.flush().unwrap();
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn test_empty_elements_self_close() {
        let xml = render(|s| {
            s.start_element(&Tag::unqualified("a"))?;
            s.attribute(&Tag::unqualified("x"), "1 < 2")?;
            s.start_element(&Tag::unqualified("b"))?;
            s.end_element()?;
            s.start_element(&Tag::unqualified("c"))?;
            s.text("t&t")?;
            s.end_element()?;
            s.end_element()
        });
        assert_eq!(xml, r#"<a x="1 &lt; 2"><b/><c>t&amp;t</c></a>"#);
    }

    #[test]
    fn test_queued_bindings_and_default_namespace() {
        let xml = render(|s| {
            s.declare_namespaces(&[
                (String::new(), "urn:d".to_string()),
                ("as".to_string(), "urn:s".to_string()),
            ]);
            s.start_element(&Tag::new(Some("urn:d"), "Root"))?;
            s.start_element(&Tag::new(Some("urn:s"), "Circle"))?;
            s.end_element()?;
            s.start_element(&Tag::unqualified("Plain"))?;
            s.end_element()?;
            s.end_element()
        });
        assert_eq!(
            xml,
            r#"<Root xmlns="urn:d" xmlns:as="urn:s"><as:Circle/><Plain xmlns=""/></Root>"#
        );
    }

    #[test]
    fn test_unregistered_namespace_is_declared_locally() {
        let xml = render(|s| {
            s.start_element(&Tag::unqualified("Root"))?;
            s.start_element(&Tag::new(Some("urn:x"), "A"))?;
            let qname = s.qualify(&Tag::new(Some("urn:y"), "T"))?;
            s.attribute(&Tag::new(Some(XSI_NAMESPACE), "type"), &qname)?;
            s.end_element()?;
            s.start_element(&Tag::new(Some("urn:x"), "B"))?;
            s.end_element()?;
            s.end_element()
        });
        assert_eq!(
            xml,
            concat!(
                r#"<Root><ns1:A xmlns:ns1="urn:x" xmlns:ns2="urn:y" "#,
                r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:type="ns2:T"/>"#,
                r#"<ns3:B xmlns:ns3="urn:x"/></Root>"#
            )
        );
    }

    #[test]
    fn test_attribute_after_content_fails() {
        let mut sink = QuickXmlSink::new(Vec::new());
        sink.start_element(&Tag::unqualified("a")).unwrap();
        sink.text("x").unwrap();
        assert!(sink.attribute(&Tag::unqualified("late"), "1").is_err());
    }
}
