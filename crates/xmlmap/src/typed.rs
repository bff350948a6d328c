//! Bridge between Rust types and the dynamic object model.
//!
//! Implement [`XmlMapped`] for a struct to declare its mapping next to the
//! type and convert it to and from [`Value`]. Simple types, `Option`, `Vec`
//! and `BTreeMap` are covered already.
//!
//! ```
//! use xmlmap::mapper::Mapper;
//! use xmlmap::options::MapperOptions;
//! use xmlmap::schema::Schema;
//!
//! let mut mapper = Mapper::new(Schema::new(), MapperOptions::default());
//! mapper.register_typed::<Vec<i32>>()?;
//! let mappings = mapper.seal();
//!
//! let xml = mappings.to_typed_string(&vec![1, 2])?;
//! assert_eq!(xml, "<ArrayOfInt><int>1</int><int>2</int></ArrayOfInt>");
//! assert_eq!(mappings.from_typed_str::<Vec<i32>>(&xml)?, vec![1, 2]);
//! # Ok::<(), xmlmap::MapError>(())
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::descriptor::TypeHandle;
use crate::error::{ConversionError, RegistrationError, Result};
use crate::mapper::{Mapper, Mappings};
use crate::name::QualifiedName;
use crate::schema::{Schema, TypeRef};
use crate::value::{Scalar, SimpleType, Value};

/// A Rust type with a mapping.
pub trait XmlMapped: Sized {
    fn type_ref() -> TypeRef;

    /// Adds the declarations the type needs to a schema. Types built from
    /// simple types and anonymous aggregates need none.
    fn declare(_schema: &mut Schema) {}

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> std::result::Result<Self, ConversionError>;
}

/// Error for a value whose shape does not fit the Rust type.
pub fn shape_error(value: &Value, expected: impl Into<String>) -> ConversionError {
    ConversionError::new(value.kind(), expected, "value has the wrong shape")
}

macro_rules! impl_simple {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl XmlMapped for $ty {
                fn type_ref() -> TypeRef {
                    TypeRef::Simple(SimpleType::$variant)
                }

                fn to_value(&self) -> Value {
                    Value::from(self.clone())
                }

                fn from_value(value: Value) -> std::result::Result<Self, ConversionError> {
                    match value {
                        Value::Scalar(Scalar::$variant(v)) => Ok(v),
                        other => Err(shape_error(&other, SimpleType::$variant.type_name())),
                    }
                }
            }
        )*
    };
}

impl_simple! {
    bool => Bool,
    char => Char,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    String => String,
    DateTime<FixedOffset> => DateTime,
    NaiveDate => Date,
    NaiveTime => Time,
    TimeDelta => Duration,
    Uuid => Uuid,
}

impl<T: XmlMapped> XmlMapped for Option<T> {
    fn type_ref() -> TypeRef {
        T::type_ref()
    }

    fn declare(schema: &mut Schema) {
        T::declare(schema)
    }

    fn to_value(&self) -> Value {
        self.as_ref().map_or(Value::Null, T::to_value)
    }

    fn from_value(value: Value) -> std::result::Result<Self, ConversionError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: XmlMapped> XmlMapped for Vec<T> {
    fn type_ref() -> TypeRef {
        TypeRef::list(T::type_ref())
    }

    fn declare(schema: &mut Schema) {
        T::declare(schema)
    }

    fn to_value(&self) -> Value {
        Value::List(self.iter().map(T::to_value).collect())
    }

    fn from_value(value: Value) -> std::result::Result<Self, ConversionError> {
        match value {
            Value::List(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(shape_error(&other, Self::type_ref().to_string())),
        }
    }
}

impl<K: XmlMapped + Ord, V: XmlMapped> XmlMapped for BTreeMap<K, V> {
    fn type_ref() -> TypeRef {
        TypeRef::map(K::type_ref(), V::type_ref())
    }

    fn declare(schema: &mut Schema) {
        K::declare(schema);
        V::declare(schema);
    }

    fn to_value(&self) -> Value {
        Value::Map(
            self.iter()
                .map(|(k, v)| (k.to_value(), v.to_value()))
                .collect(),
        )
    }

    fn from_value(value: Value) -> std::result::Result<Self, ConversionError> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
                .collect(),
            other => Err(shape_error(&other, Self::type_ref().to_string())),
        }
    }
}

impl Mapper {
    /// Declares and registers a Rust type.
    pub fn register_typed<T: XmlMapped>(&mut self) -> Result<TypeHandle> {
        T::declare(self.schema_mut());
        self.register(T::type_ref())
    }
}

impl Mappings {
    pub fn to_typed_string<T: XmlMapped>(&self, value: &T) -> Result<String> {
        self.render(&value.to_value(), self.typed_handle::<T>()?)
    }

    /// Reads a document whose root must be assignable to `T`.
    pub fn from_typed_str<T: XmlMapped>(&self, xml: &str) -> Result<T> {
        let value = self.reader(xml).read_as(self.typed_handle::<T>()?)?;
        Ok(T::from_value(value)?)
    }

    fn typed_handle<T: XmlMapped>(&self) -> Result<TypeHandle> {
        let ty = T::type_ref();
        let handle = self.lookup(&ty).ok_or_else(|| RegistrationError::UndeclaredType {
            type_name: QualifiedName::local(ty.to_string()),
        })?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapError;
    use crate::options::MapperOptions;
    use crate::schema::TypeDecl;
    use crate::value::Object;

    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
        label: Option<String>,
    }

    impl XmlMapped for Point {
        fn type_ref() -> TypeRef {
            TypeRef::from("Geo.Point")
        }

        fn declare(schema: &mut Schema) {
            schema.declare(
                TypeDecl::object("Geo.Point")
                    .default_constructor()
                    .attribute("X", SimpleType::I32)
                    .attribute("Y", SimpleType::I32)
                    .element("Label", SimpleType::String),
            );
        }

        fn to_value(&self) -> Value {
            Object::new("Geo.Point")
                .with("X", self.x)
                .with("Y", self.y)
                .with("Label", self.label.to_value())
                .into()
        }

        fn from_value(value: Value) -> std::result::Result<Self, ConversionError> {
            let Value::Object(mut obj) = value else {
                return Err(shape_error(&value, "Geo.Point"));
            };
            let mut take = |name: &str| obj.take(name).unwrap_or(Value::Null);
            Ok(Point {
                x: i32::from_value(take("X"))?,
                y: i32::from_value(take("Y"))?,
                label: Option::<String>::from_value(take("Label"))?,
            })
        }
    }

    fn mappings<T: XmlMapped>() -> Mappings {
        let mut mapper = Mapper::new(Schema::new(), MapperOptions::default());
        mapper.register_typed::<T>().unwrap();
        mapper.seal()
    }

    #[test]
    fn test_struct_round_trip() {
        let mappings = mappings::<Vec<Point>>();
        let points = vec![
            Point { x: 1, y: 2, label: Some("a".to_string()) },
            Point { x: 3, y: 4, label: None },
        ];
        let xml = mappings.to_typed_string(&points).unwrap();
        assert_eq!(
            xml,
            concat!(
                r#"<ArrayOfPoint><Point X="1" Y="2"><Label>a</Label></Point>"#,
                r#"<Point X="3" Y="4"/></ArrayOfPoint>"#
            )
        );
        assert_eq!(mappings.from_typed_str::<Vec<Point>>(&xml).unwrap(), points);
    }

    #[test]
    fn test_map_of_simple_types() {
        let mappings = mappings::<BTreeMap<String, u16>>();
        let ports = BTreeMap::from([("http".to_string(), 80u16), ("ssh".to_string(), 22)]);
        let xml = mappings.to_typed_string(&ports).unwrap();
        assert_eq!(
            xml,
            concat!(
                r#"<MapOfStringUnsignedShort><unsignedShort Key="http">80</unsignedShort>"#,
                r#"<unsignedShort Key="ssh">22</unsignedShort></MapOfStringUnsignedShort>"#
            )
        );
        assert_eq!(mappings.from_typed_str::<BTreeMap<String, u16>>(&xml).unwrap(), ports);
    }

    #[test]
    fn test_wrong_root_type() {
        let mut mapper = Mapper::new(Schema::new(), MapperOptions::default());
        mapper.register_typed::<Point>().unwrap();
        mapper.register_typed::<Vec<String>>().unwrap();
        let mappings = mapper.seal();
        let err = mappings
            .from_typed_str::<Point>("<ArrayOfString/>")
            .unwrap_err();
        assert!(matches!(err, MapError::Read(_)));
        let err = mappings.from_typed_str::<Vec<u8>>("<ArrayOfUnsignedByte/>").unwrap_err();
        assert!(matches!(err, MapError::Registration(_)));
    }
}
