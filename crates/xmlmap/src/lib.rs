//! # xmlmap
//!
//! Descriptor-driven XML object mapping. A type graph is declared once in a
//! [`Schema`], registered into descriptors by a [`Mapper`], and sealed into
//! immutable [`Mappings`] that write and read [`Value`] graphs as XML.
//!
//! ## Features
//!
//! - **Declarative schema**: members map to attributes, wrapped or flattened
//!   elements, a single content element or element text, with per-member
//!   names, namespaces, order, defaults and converters.
//! - **Polymorphism**: values of derived types are tagged with `xsi:type`,
//!   and collection items can be given their own element names per type.
//! - **Namespaces**: wire namespaces get stable prefixes, declared once on
//!   the document root.
//! - **Streaming**: both engines work token by token over quick-xml through
//!   the [`xml::XmlSource`] and [`xml::XmlSink`] abstractions.
//!
//! ## Architecture
//!
//! - [`schema`]: declarations, the input of registration
//! - [`mapper`]: the registry that turns declarations into descriptors
//! - [`ser`] / [`de`]: write and read engines driven by the descriptors
//! - [`convert`]: text conversion for simple values, plus user converters
//! - [`typed`]: the [`XmlMapped`] bridge for plain Rust types
//!
//! ## Example
//!
//! ```
//! use xmlmap::{
//!     Mapper, MapperOptions, MemberDecl, Object, Schema, SimpleType, TypeDecl, TypeRef, Value,
//! };
//!
//! let mut schema = Schema::new();
//! schema.declare(
//!     TypeDecl::object("Acme.Person")
//!         .default_constructor()
//!         .member(MemberDecl::attribute("Id", SimpleType::I32).default_value(0))
//!         .element("Name", SimpleType::String)
//!         .element("Tags", TypeRef::list(SimpleType::String)),
//! );
//!
//! let mut mapper = Mapper::new(schema, MapperOptions::default());
//! mapper.register("Acme.Person")?;
//! let mappings = mapper.seal();
//!
//! let person = Object::new("Acme.Person")
//!     .with("Id", 0)
//!     .with("Tags", Value::List(vec!["a".into(), "b".into()]));
//! let xml = mappings.to_xml_string(&person.clone().into())?;
//! assert_eq!(xml, "<Person><Tags><string>a</string><string>b</string></Tags></Person>");
//! assert_eq!(mappings.from_xml_str(&xml)?, Value::Object(person));
//! # Ok::<(), xmlmap::MapError>(())
//! ```

pub mod convert;
pub mod de;
pub mod descriptor;
pub mod error;
pub mod mapper;
pub mod name;
pub mod namespace;
pub mod options;
pub mod schema;
pub mod ser;
pub mod typed;
pub mod utils;
pub mod value;
pub mod xml;

pub use convert::{Converter, StreamConverter, TextConverter};
pub use de::{ObjectReader, UnknownAction, UnknownMember, UnknownMemberHandler};
pub use descriptor::{MemberDescriptor, TypeDescriptor, TypeHandle, TypeKind};
pub use error::{ConversionError, MapError, ReadError, RegistrationError, Result, WriteError};
pub use mapper::{Mapper, Mappings};
pub use name::{QualifiedName, Tag};
pub use options::{MapperOptions, NameCase};
pub use schema::{
    CollectionDecl, DictionaryDecl, ItemTag, MemberDecl, MemberRole, Schema, TypeDecl, TypeRef,
};
pub use ser::ObjectWriter;
pub use typed::XmlMapped;
pub use value::{EnumValue, Object, Scalar, SimpleType, Value};
