//! Run-time options threaded through the registry and both engines.
//!
//! Options are a plain value: build them in code or load them from a JSON
//! document.
//!
//! ```
//! use xmlmap::options::{MapperOptions, NameCase};
//!
//! let options = MapperOptions::from_json_str(
//!     r#"{ "defaultNamespace": "urn:acme", "elementCase": "camel", "ignoreUnknown": true }"#,
//! )?;
//! assert_eq!(options.element_case, NameCase::Camel);
//! # Ok::<(), xmlmap::MapError>(())
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Casing transform applied to member names that have no explicit wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NameCase {
    /// Use the declared member name unchanged.
    #[default]
    AsDeclared,
    /// `firstName`
    Camel,
    /// `FirstName`
    Pascal,
    /// `first_name`
    Snake,
    /// `first-name`
    Kebab,
}

/// Formatting conventions for numbers and dates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Culture {
    /// Separator between integral and fractional digits.
    pub decimal_separator: char,
    /// chrono format string for date-times; RFC 3339 when absent.
    pub date_time_format: Option<String>,
    /// chrono format string for dates; `%Y-%m-%d` when absent.
    pub date_format: Option<String>,
    /// chrono format string for times; `%H:%M:%S%.f` when absent.
    pub time_format: Option<String>,
}

impl Culture {
    /// The culture-neutral conventions used unless configured otherwise.
    pub fn invariant() -> Self {
        Self {
            decimal_separator: '.',
            date_time_format: None,
            date_format: None,
            time_format: None,
        }
    }

    pub fn is_invariant(&self) -> bool {
        *self == Culture::invariant()
    }
}

impl Default for Culture {
    fn default() -> Self {
        Culture::invariant()
    }
}

/// Options for a mapper and the engines created from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MapperOptions {
    /// Wire namespace for types whose origin namespace has no explicit mapping.
    pub default_namespace: Option<String>,

    /// Casing for attribute names derived from member names.
    pub attribute_case: NameCase,

    /// Casing for element names derived from member names.
    pub element_case: NameCase,

    /// Skip unknown attributes and elements instead of failing.
    pub ignore_unknown: bool,

    /// Write null nullable members as empty elements with `xsi:nil="true"`
    /// and honor that marker on read.
    pub nil_markers: bool,

    /// Parse enum variants case-insensitively.
    pub enum_case_insensitive: bool,

    pub culture: Culture,

    /// Register object types without a constructor. Such types can be
    /// written but reading them fails.
    pub tolerate_missing_constructor: bool,

    /// Indent nested elements by this many spaces.
    pub indent: Option<usize>,

    /// Emit an `<?xml version="1.0" encoding="utf-8"?>` declaration.
    pub xml_declaration: bool,
}

impl Default for MapperOptions {
    fn default() -> Self {
        Self {
            default_namespace: None,
            attribute_case: NameCase::AsDeclared,
            element_case: NameCase::AsDeclared,
            ignore_unknown: false,
            nil_markers: true,
            enum_case_insensitive: false,
            culture: Culture::invariant(),
            tolerate_missing_constructor: false,
            indent: None,
            xml_declaration: false,
        }
    }
}

impl MapperOptions {
    /// Loads options from JSON; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = Some(namespace.into());
        self
    }

    pub fn with_ignore_unknown(mut self, ignore: bool) -> Self {
        self.ignore_unknown = ignore;
        self
    }

    pub fn with_nil_markers(mut self, enabled: bool) -> Self {
        self.nil_markers = enabled;
        self
    }

    pub fn with_name_case(mut self, attributes: NameCase, elements: NameCase) -> Self {
        self.attribute_case = attributes;
        self.element_case = elements;
        self
    }

    pub fn with_indent(mut self, indent: usize) -> Self {
        self.indent = Some(indent);
        self
    }
}
