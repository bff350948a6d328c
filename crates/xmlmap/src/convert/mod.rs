//! Value conversion layer.
//!
//! Text conversion picks the first of: the member's converter, the type's
//! converter, and the built-in table for simple types and enums. A converter
//! is either a [`TextConverter`] (the value has a text form, usable in
//! attributes) or a [`StreamConverter`] (the converter reads and writes the
//! element content itself).

pub mod builtin;
pub mod escape;

use std::fmt;
use std::sync::Arc;

use crate::descriptor::{TypeDescriptor, TypeKind};
use crate::error::{ConversionError, Result};
use crate::options::MapperOptions;
use crate::value::{EnumValue, Scalar, Value};
use crate::xml::{StartElement, XmlSink, XmlSource};

/// Converts values of one type to and from text.
pub trait TextConverter: Send + Sync {
    fn to_text(&self, value: &Value) -> std::result::Result<String, ConversionError>;

    fn from_text(&self, text: &str) -> std::result::Result<Value, ConversionError>;
}

/// Writes and reads the content of an element directly.
///
/// `write` runs after the element's start tag; it may add attributes before
/// emitting content. `read` runs after the start tag was consumed and reads
/// up to, but not including, the matching end tag.
pub trait StreamConverter: Send + Sync {
    fn write(&self, value: &Value, sink: &mut dyn XmlSink) -> Result<()>;

    fn read(&self, start: &StartElement, source: &mut dyn XmlSource) -> Result<Value>;
}

/// A converter attached to a type or member.
#[derive(Clone)]
pub enum Converter {
    Text(Arc<dyn TextConverter>),
    Stream(Arc<dyn StreamConverter>),
}

impl Converter {
    pub fn text(converter: impl TextConverter + 'static) -> Self {
        Converter::Text(Arc::new(converter))
    }

    pub fn stream(converter: impl StreamConverter + 'static) -> Self {
        Converter::Stream(Arc::new(converter))
    }

    /// A text converter from a pair of functions.
    pub fn from_fns<F, G>(to_text: F, from_text: G) -> Self
    where
        F: Fn(&Value) -> std::result::Result<String, ConversionError> + Send + Sync + 'static,
        G: Fn(&str) -> std::result::Result<Value, ConversionError> + Send + Sync + 'static,
    {
        Converter::text(FnConverter { to_text, from_text })
    }

    pub fn as_text(&self) -> Option<&dyn TextConverter> {
        match self {
            Converter::Text(c) => Some(c.as_ref()),
            Converter::Stream(_) => None,
        }
    }

    pub fn as_stream(&self) -> Option<&dyn StreamConverter> {
        match self {
            Converter::Stream(c) => Some(c.as_ref()),
            Converter::Text(_) => None,
        }
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Converter::Text(_) => f.write_str("Converter::Text(..)"),
            Converter::Stream(_) => f.write_str("Converter::Stream(..)"),
        }
    }
}

struct FnConverter<F, G> {
    to_text: F,
    from_text: G,
}

impl<F, G> TextConverter for FnConverter<F, G>
where
    F: Fn(&Value) -> std::result::Result<String, ConversionError> + Send + Sync,
    G: Fn(&str) -> std::result::Result<Value, ConversionError> + Send + Sync,
{
    fn to_text(&self, value: &Value) -> std::result::Result<String, ConversionError> {
        (self.to_text)(value)
    }

    fn from_text(&self, text: &str) -> std::result::Result<Value, ConversionError> {
        (self.from_text)(text)
    }
}

/// Picks the text converter for a member or type.
pub(crate) fn text_converter<'a>(
    member: Option<&'a Converter>,
    ty: &'a TypeDescriptor,
) -> Option<&'a dyn TextConverter> {
    member
        .and_then(Converter::as_text)
        .or_else(|| ty.converter().and_then(Converter::as_text))
}

/// Picks the stream converter for a member or type. A member text converter
/// hides a type stream converter.
pub(crate) fn stream_converter<'a>(
    member: Option<&'a Converter>,
    ty: &'a TypeDescriptor,
) -> Option<&'a dyn StreamConverter> {
    match member {
        Some(c) => c.as_stream(),
        None => ty.converter().and_then(Converter::as_stream),
    }
}

/// Formats a value as text.
pub(crate) fn to_text(
    value: &Value,
    member: Option<&Converter>,
    ty: &TypeDescriptor,
    options: &MapperOptions,
) -> std::result::Result<String, ConversionError> {
    if let Some(converter) = text_converter(member, ty) {
        return converter.to_text(value);
    }
    match value {
        Value::Scalar(scalar) => Ok(builtin::format_scalar(scalar, &options.culture)),
        Value::Ref(id) => Ok(escape::escape(id).into_owned()),
        other => Err(ConversionError::new(
            other.kind(),
            ty.name().to_string(),
            "value has no text form",
        )),
    }
}

/// Parses text as a value of the given type.
pub(crate) fn from_text(
    text: &str,
    member: Option<&Converter>,
    ty: &TypeDescriptor,
    options: &MapperOptions,
) -> std::result::Result<Value, ConversionError> {
    if let Some(converter) = text_converter(member, ty) {
        return converter.from_text(text);
    }
    match ty.kind() {
        TypeKind::Simple(simple) => {
            Ok(Value::Scalar(builtin::parse_scalar(text, *simple, &options.culture)?))
        }
        TypeKind::Enum(variants) => {
            parse_enum(text, ty, variants, options.enum_case_insensitive).map(Value::from)
        }
        // Untyped text falls back to the literal string.
        TypeKind::Any => Ok(Value::Scalar(Scalar::String(
            escape::unescape(text)?.into_owned(),
        ))),
        TypeKind::Object | TypeKind::List | TypeKind::Map => Err(ConversionError::new(
            text,
            ty.name().to_string(),
            "type has no text form",
        )),
    }
}

fn parse_enum(
    text: &str,
    ty: &TypeDescriptor,
    variants: &[String],
    case_insensitive: bool,
) -> std::result::Result<EnumValue, ConversionError> {
    let trimmed = text.trim();
    variants
        .iter()
        .find(|v| v.as_str() == trimmed)
        .or_else(|| {
            case_insensitive
                .then(|| variants.iter().find(|v| v.eq_ignore_ascii_case(trimmed)))
                .flatten()
        })
        .map(|v| EnumValue::new(ty.name().clone(), v.clone()))
        .ok_or_else(|| {
            ConversionError::new(
                text,
                ty.name().to_string(),
                format!("expected one of: {}", variants.join(", ")),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::TypeHandle;
    use crate::name::Tag;
    use crate::value::SimpleType;

    fn descriptor(kind: TypeKind) -> TypeDescriptor {
        TypeDescriptor::reserve(
            TypeHandle(0),
            "Acme.Color".into(),
            Tag::unqualified("Color"),
            "Acme".to_string(),
            kind,
        )
    }

    fn upper() -> Converter {
        Converter::from_fns(
            |v| Ok(v.as_str().unwrap_or_default().to_uppercase()),
            |t| Ok(Value::from(t.to_lowercase())),
        )
    }

    #[test]
    fn test_builtin_round_trip() {
        let options = MapperOptions::default();
        let ty = descriptor(TypeKind::Simple(SimpleType::I32));
        let text = to_text(&Value::from(42), None, &ty, &options).unwrap();
        assert_eq!(text, "42");
        assert_eq!(from_text(&text, None, &ty, &options).unwrap(), Value::from(42));
    }

    #[test]
    fn test_member_converter_wins_over_type_converter() {
        let options = MapperOptions::default();
        let mut ty = descriptor(TypeKind::Simple(SimpleType::String));
        ty.converter = Some(Converter::from_fns(
            |_| Ok("type".to_string()),
            |_| Ok(Value::from("type")),
        ));
        let member = upper();
        assert_eq!(
            to_text(&Value::from("abc"), Some(&member), &ty, &options).unwrap(),
            "ABC"
        );
        assert_eq!(to_text(&Value::from("abc"), None, &ty, &options).unwrap(), "type");
    }

    #[test]
    fn test_enum_case_sensitivity() {
        let ty = descriptor(TypeKind::Enum(vec!["Red".into(), "Green".into()]));
        let mut options = MapperOptions::default();
        assert!(from_text("red", None, &ty, &options).is_err());
        options.enum_case_insensitive = true;
        assert_eq!(
            from_text("red", None, &ty, &options).unwrap(),
            Value::from(EnumValue::new("Acme.Color", "Red"))
        );
    }

    #[test]
    fn test_object_without_converter_has_no_text_form() {
        let options = MapperOptions::default();
        let ty = descriptor(TypeKind::Object);
        let err = from_text("x", None, &ty, &options).unwrap_err();
        assert_eq!(err.expected, "Acme.Color");
    }
}
