//! Qualified names.
//!
//! Two name forms flow through the engine:
//!
//! - [`QualifiedName`] is the *logical* name of a type: its declared name plus
//!   the origin namespace it belongs to in configuration (for example
//!   `Acme.Shapes` / `Circle`).
//! - [`Tag`] is the *wire* name: the local name plus the XML namespace URI that
//!   actually appears in documents.
//!
//! The namespace registry translates between the two. Both order by
//! `(namespace, name)` so maps keyed by them iterate deterministically.

use std::fmt;

/// Logical name of a mapped type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    namespace: Option<String>,
    name: String,
}

impl QualifiedName {
    /// Creates a name in the given origin namespace.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            namespace: if namespace.is_empty() {
                None
            } else {
                Some(namespace)
            },
            name: name.into(),
        }
    }

    /// Creates a name without an origin namespace.
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Parses `Namespace.Path.Name`; the last dot-separated segment is the name.
    pub fn parse(dotted: &str) -> Self {
        match dotted.rsplit_once('.') {
            Some((namespace, name)) => Self::new(namespace, name),
            None => Self::local(dotted),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}.{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl From<&str> for QualifiedName {
    fn from(dotted: &str) -> Self {
        QualifiedName::parse(dotted)
    }
}

/// Wire name of an element or attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    namespace: Option<String>,
    local: String,
}

impl Tag {
    pub fn new(namespace: Option<&str>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.filter(|ns| !ns.is_empty()).map(str::to_string),
            local: local.into(),
        }
    }

    /// A tag with no namespace (unqualified attributes, namespace-less documents).
    pub fn unqualified(local: impl Into<String>) -> Self {
        Self {
            namespace: None,
            local: local.into(),
        }
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns the same local name in another namespace.
    pub fn with_namespace(&self, namespace: Option<&str>) -> Tag {
        Tag::new(namespace, self.local.clone())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{}}}{}", ns, self.local),
            None => f.write_str(&self.local),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_parse_dotted_name() {
        let name = QualifiedName::parse("Acme.Shapes.Circle");
        assert_eq!(name.namespace(), Some("Acme.Shapes"));
        assert_eq!(name.name(), "Circle");
        assert_eq!(name.to_string(), "Acme.Shapes.Circle");

        let bare = QualifiedName::parse("Circle");
        assert_eq!(bare.namespace(), None);
        assert_eq!(bare.to_string(), "Circle");
    }

    #[test]
    fn test_empty_namespace_is_none() {
        assert_eq!(QualifiedName::new("", "A"), QualifiedName::local("A"));
        assert_eq!(Tag::new(Some(""), "a"), Tag::unqualified("a"));
    }

    #[test]
    fn test_ordering_by_namespace_then_name() {
        let set: BTreeSet<QualifiedName> = [
            QualifiedName::new("B", "a"),
            QualifiedName::new("A", "z"),
            QualifiedName::new("A", "b"),
            QualifiedName::local("q"),
        ]
        .into_iter()
        .collect();
        let ordered: Vec<String> = set.iter().map(|n| n.to_string()).collect();
        assert_eq!(ordered, vec!["q", "A.b", "A.z", "B.a"]);
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(
            Tag::new(Some("urn:shapes"), "Circle").to_string(),
            "{urn:shapes}Circle"
        );
        assert_eq!(Tag::unqualified("Id").to_string(), "Id");
    }
}
