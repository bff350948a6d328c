//! Dynamic object model the engines traverse.
//!
//! Every node of an object graph is a [`Value`]: a null marker, a simple
//! [`Scalar`], a structured [`Object`], an anonymous list or map, or an
//! unresolved reference id. The variant is resolved once per item while the
//! engines walk the graph, so no runtime downcasting is needed.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeDelta};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::name::QualifiedName;

/// Built-in simple types understood by the value conversion layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SimpleType {
    Bool,
    Char,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Decimal,
    String,
    DateTime,
    Date,
    Time,
    Duration,
    Uuid,
    Bytes,
}

impl SimpleType {
    pub const ALL: [SimpleType; 20] = [
        SimpleType::Bool,
        SimpleType::Char,
        SimpleType::I8,
        SimpleType::I16,
        SimpleType::I32,
        SimpleType::I64,
        SimpleType::U8,
        SimpleType::U16,
        SimpleType::U32,
        SimpleType::U64,
        SimpleType::F32,
        SimpleType::F64,
        SimpleType::Decimal,
        SimpleType::String,
        SimpleType::DateTime,
        SimpleType::Date,
        SimpleType::Time,
        SimpleType::Duration,
        SimpleType::Uuid,
        SimpleType::Bytes,
    ];

    /// Wire name of the type when it appears as an element (collection items,
    /// dictionary values, document roots).
    pub fn wire_name(self) -> &'static str {
        match self {
            SimpleType::Bool => "boolean",
            SimpleType::Char => "char",
            SimpleType::I8 => "byte",
            SimpleType::I16 => "short",
            SimpleType::I32 => "int",
            SimpleType::I64 => "long",
            SimpleType::U8 => "unsignedByte",
            SimpleType::U16 => "unsignedShort",
            SimpleType::U32 => "unsignedInt",
            SimpleType::U64 => "unsignedLong",
            SimpleType::F32 => "float",
            SimpleType::F64 => "double",
            SimpleType::Decimal => "decimal",
            SimpleType::String => "string",
            SimpleType::DateTime => "dateTime",
            SimpleType::Date => "date",
            SimpleType::Time => "time",
            SimpleType::Duration => "duration",
            SimpleType::Uuid => "guid",
            SimpleType::Bytes => "base64Binary",
        }
    }

    /// Logical type name, used in error messages and as the registry key.
    pub fn type_name(self) -> &'static str {
        match self {
            SimpleType::Bool => "Boolean",
            SimpleType::Char => "Char",
            SimpleType::I8 => "SByte",
            SimpleType::I16 => "Int16",
            SimpleType::I32 => "Int32",
            SimpleType::I64 => "Int64",
            SimpleType::U8 => "Byte",
            SimpleType::U16 => "UInt16",
            SimpleType::U32 => "UInt32",
            SimpleType::U64 => "UInt64",
            SimpleType::F32 => "Single",
            SimpleType::F64 => "Double",
            SimpleType::Decimal => "Decimal",
            SimpleType::String => "String",
            SimpleType::DateTime => "DateTime",
            SimpleType::Date => "DateOnly",
            SimpleType::Time => "TimeOnly",
            SimpleType::Duration => "TimeSpan",
            SimpleType::Uuid => "Guid",
            SimpleType::Bytes => "ByteArray",
        }
    }
}

/// An enumeration value: the declaring enum type plus the variant name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub type_name: QualifiedName,
    pub variant: String,
}

impl EnumValue {
    pub fn new(type_name: impl Into<QualifiedName>, variant: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            variant: variant.into(),
        }
    }
}

/// A simple value with a textual wire form.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Char(char),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    String(String),
    DateTime(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
    Duration(TimeDelta),
    Uuid(Uuid),
    Bytes(Vec<u8>),
    Enum(EnumValue),
}

impl Scalar {
    /// The built-in simple type of this scalar; `None` for enum values, whose
    /// type is the declaring enum.
    pub fn simple_type(&self) -> Option<SimpleType> {
        Some(match self {
            Scalar::Bool(_) => SimpleType::Bool,
            Scalar::Char(_) => SimpleType::Char,
            Scalar::I8(_) => SimpleType::I8,
            Scalar::I16(_) => SimpleType::I16,
            Scalar::I32(_) => SimpleType::I32,
            Scalar::I64(_) => SimpleType::I64,
            Scalar::U8(_) => SimpleType::U8,
            Scalar::U16(_) => SimpleType::U16,
            Scalar::U32(_) => SimpleType::U32,
            Scalar::U64(_) => SimpleType::U64,
            Scalar::F32(_) => SimpleType::F32,
            Scalar::F64(_) => SimpleType::F64,
            Scalar::Decimal(_) => SimpleType::Decimal,
            Scalar::String(_) => SimpleType::String,
            Scalar::DateTime(_) => SimpleType::DateTime,
            Scalar::Date(_) => SimpleType::Date,
            Scalar::Time(_) => SimpleType::Time,
            Scalar::Duration(_) => SimpleType::Duration,
            Scalar::Uuid(_) => SimpleType::Uuid,
            Scalar::Bytes(_) => SimpleType::Bytes,
            Scalar::Enum(_) => return None,
        })
    }
}

/// Aggregate content carried by objects whose type is itself a collection or
/// dictionary shape.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Aggregate {
    #[default]
    None,
    Items(Vec<Value>),
    Entries(Vec<(Value, Value)>),
}

/// A structured value: runtime type, member values, and aggregate content.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    type_name: QualifiedName,
    members: BTreeMap<String, Value>,
    aggregate: Aggregate,
}

impl Object {
    pub fn new(type_name: impl Into<QualifiedName>) -> Self {
        Self {
            type_name: type_name.into(),
            members: BTreeMap::new(),
            aggregate: Aggregate::None,
        }
    }

    /// Builder-style member assignment.
    pub fn with(mut self, member: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(member, value);
        self
    }

    /// Builder-style item append for collection-shaped types.
    pub fn with_item(mut self, item: impl Into<Value>) -> Self {
        self.push_item(item.into());
        self
    }

    /// Builder-style entry append for dictionary-shaped types.
    pub fn with_entry(mut self, key: impl Into<Value>, value: impl Into<Value>) -> Self {
        self.push_entry(key.into(), value.into());
        self
    }

    pub fn type_name(&self) -> &QualifiedName {
        &self.type_name
    }

    pub fn get(&self, member: &str) -> Option<&Value> {
        self.members.get(member)
    }

    pub fn get_mut(&mut self, member: &str) -> Option<&mut Value> {
        self.members.get_mut(member)
    }

    /// Assigns a member. Assigning [`Value::Null`] removes it.
    pub fn set(&mut self, member: impl Into<String>, value: impl Into<Value>) {
        let member = member.into();
        match value.into() {
            Value::Null => {
                self.members.remove(&member);
            }
            value => {
                self.members.insert(member, value);
            }
        }
    }

    pub fn take(&mut self, member: &str) -> Option<Value> {
        self.members.remove(member)
    }

    pub fn contains(&self, member: &str) -> bool {
        self.members.contains_key(member)
    }

    pub fn members(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.members.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn aggregate(&self) -> &Aggregate {
        &self.aggregate
    }

    pub fn items(&self) -> &[Value] {
        match &self.aggregate {
            Aggregate::Items(items) => items,
            _ => &[],
        }
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        match &self.aggregate {
            Aggregate::Entries(entries) => entries,
            _ => &[],
        }
    }

    pub fn push_item(&mut self, item: Value) {
        match &mut self.aggregate {
            Aggregate::Items(items) => items.push(item),
            other => *other = Aggregate::Items(vec![item]),
        }
    }

    pub fn push_entry(&mut self, key: Value, value: Value) {
        match &mut self.aggregate {
            Aggregate::Entries(entries) => entries.push((key, value)),
            other => *other = Aggregate::Entries(vec![(key, value)]),
        }
    }

    pub(crate) fn set_type_name(&mut self, type_name: QualifiedName) {
        self.type_name = type_name;
    }

    pub(crate) fn set_aggregate(&mut self, aggregate: Aggregate) {
        self.aggregate = aggregate;
    }
}

/// A node of an object graph.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Scalar(Scalar),
    Object(Object),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    /// Identifier of an object serialized by reference.
    Ref(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Short variant name for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Scalar(_) => "scalar",
            Value::Object(_) => "object",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Ref(_) => "reference",
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Scalar {
                fn from(v: $ty) -> Self {
                    Scalar::$variant(v)
                }
            }

            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Scalar(Scalar::$variant(v))
                }
            }
        )*
    };
}

scalar_from! {
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
    Vec<u8> => Bytes,
    EnumValue => Enum,
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Scalar(Scalar::String(s.to_string()))
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Value::List(iter.into_iter().map(Into::into).collect())
    }
}
