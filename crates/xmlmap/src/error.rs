//! Error types for registration, writing, reading, and value conversion.
//!
//! The hierarchy separates the failure categories a caller reacts to
//! differently:
//!
//! - [`RegistrationError`]: the type configuration itself is unusable; raised
//!   once while the type graph is registered.
//! - [`ReadError`]: the document does not fit the registered types.
//! - [`ConversionError`]: a single text value cannot be parsed or formatted.
//! - [`WriteError`]: the object graph does not fit the registered types.
//!
//! Read-side errors carry the line/column of the offending token when the
//! underlying stream knows it.

// Variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use thiserror::Error;

use crate::name::{QualifiedName, Tag};

/// One-based line/column of a token in the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// Optional position, rendered as ` at line L, column C` when known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location(pub Option<Position>);

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(p) => write!(f, " at line {}, column {}", p.line, p.column),
            None => Ok(()),
        }
    }
}

impl From<Option<Position>> for Location {
    fn from(p: Option<Position>) -> Self {
        Location(p)
    }
}

/// The primary error type for all mapping operations.
#[derive(Error, Debug)]
pub enum MapError {
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Write(#[from] WriteError),

    /// Malformed XML reported by the tokenizer.
    #[error("XML syntax error{location}: {message}")]
    Syntax { message: String, location: Location },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid options document.
    #[error("invalid options: {0}")]
    Options(#[from] serde_json::Error),
}

impl MapError {
    pub(crate) fn syntax(message: impl fmt::Display, position: Option<Position>) -> Self {
        MapError::Syntax {
            message: message.to_string(),
            location: Location(position),
        }
    }

    /// Position of the offending token, when known.
    pub fn position(&self) -> Option<Position> {
        match self {
            MapError::Read(e) => e.position(),
            MapError::Conversion(e) => e.location.0,
            MapError::Syntax { location, .. } => location.0,
            _ => None,
        }
    }
}

impl From<quick_xml::Error> for MapError {
    fn from(err: quick_xml::Error) -> Self {
        MapError::syntax(err, None)
    }
}

/// Errors raised while registering a type graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistrationError {
    #[error("type '{type_name}' requires a default constructor to be deserializable")]
    MissingConstructor { type_name: QualifiedName },

    #[error("type '{type_name}' is referenced but never declared")]
    UndeclaredType { type_name: QualifiedName },

    #[error("invalid configuration for '{type_name}': {message}")]
    InvalidConfiguration {
        type_name: QualifiedName,
        message: String,
    },
}

impl RegistrationError {
    pub(crate) fn invalid(type_name: &QualifiedName, message: impl Into<String>) -> Self {
        RegistrationError::InvalidConfiguration {
            type_name: type_name.clone(),
            message: message.into(),
        }
    }
}

/// Structural errors while reading a document.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReadError {
    #[error("unrecognized element '{tag}'{location}")]
    UnrecognizedElement { tag: Tag, location: Location },

    #[error("unknown attribute '{name}' on '{owner}'{location}")]
    UnknownAttribute {
        owner: QualifiedName,
        name: Tag,
        location: Location,
    },

    #[error("unknown element '{tag}' in '{owner}'{location}")]
    UnknownElement {
        owner: QualifiedName,
        tag: Tag,
        location: Location,
    },

    #[error("element '{element}' resolved to '{actual}', which is not assignable to '{expected}'{location}")]
    TypeMismatch {
        element: Tag,
        expected: QualifiedName,
        actual: QualifiedName,
        location: Location,
    },

    #[error("type '{type_name}' cannot be constructed{location}")]
    MissingConstructor {
        type_name: QualifiedName,
        location: Location,
    },

    #[error("unexpected text content in '{owner}'{location}")]
    UnexpectedText {
        owner: QualifiedName,
        location: Location,
    },

    #[error("unexpected end of document{location}")]
    UnexpectedEof { location: Location },

    #[error("document contains no root element")]
    EmptyDocument,

    #[error("prefix '{prefix}' is not bound{location}")]
    UnboundPrefix { prefix: String, location: Location },
}

impl ReadError {
    pub fn position(&self) -> Option<Position> {
        match self {
            ReadError::UnrecognizedElement { location, .. }
            | ReadError::UnknownAttribute { location, .. }
            | ReadError::UnknownElement { location, .. }
            | ReadError::TypeMismatch { location, .. }
            | ReadError::MissingConstructor { location, .. }
            | ReadError::UnexpectedText { location, .. }
            | ReadError::UnexpectedEof { location }
            | ReadError::UnboundPrefix { location, .. } => location.0,
            ReadError::EmptyDocument => None,
        }
    }
}

/// Errors raised while writing an object graph.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WriteError {
    #[error("no type is registered for '{type_name}'")]
    Unregistered { type_name: String },

    #[error("value of kind '{kind}' does not fit '{expected}' in member '{member}'")]
    ShapeMismatch {
        member: String,
        expected: QualifiedName,
        kind: &'static str,
    },

    #[error("'{actual}' is not assignable to '{expected}' in member '{member}'")]
    TypeMismatch {
        member: String,
        expected: QualifiedName,
        actual: QualifiedName,
    },

    #[error("reference member '{member}' needs an identifier but '{type_name}' declares none")]
    MissingIdentifier {
        member: String,
        type_name: QualifiedName,
    },
}

/// A text value that could not be converted.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("cannot convert '{text}' to {expected}{location}: {reason}")]
pub struct ConversionError {
    pub text: String,
    pub expected: String,
    pub reason: String,
    pub location: Location,
}

impl ConversionError {
    pub fn new(
        text: impl Into<String>,
        expected: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self {
            text: text.into(),
            expected: expected.into(),
            reason: reason.to_string(),
            location: Location(None),
        }
    }

    /// Attaches a position unless one is already present.
    pub fn at(mut self, position: Option<Position>) -> Self {
        if self.location.0.is_none() {
            self.location = Location(position);
        }
        self
    }
}

/// Result type alias for mapping operations.
pub type Result<T> = std::result::Result<T, MapError>;
