//! Declarative configuration surface.
//!
//! A [`Schema`] is the set of type declarations a mapper introspects: for
//! each type, which members exist and what serialization role each one plays.
//! Declarations are plain data built in code at startup; the mapper turns them
//! into immutable descriptors exactly once.
//!
//! ```
//! use xmlmap::schema::{MemberDecl, Schema, TypeDecl, TypeRef};
//! use xmlmap::value::{SimpleType, Value};
//!
//! let mut schema = Schema::new();
//! schema.declare(
//!     TypeDecl::object("Acme.Person")
//!         .default_constructor()
//!         .member(MemberDecl::attribute("Id", SimpleType::I32).default_value(Value::from(0)))
//!         .member(MemberDecl::element("Tags", TypeRef::list(SimpleType::String))),
//! );
//! assert!(schema.contains(&"Acme.Person".into()));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::convert::Converter;
use crate::name::QualifiedName;
use crate::value::{Object, SimpleType, Value};

/// Reference to a type from a member, item, key or value declaration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeRef {
    /// The root type every value is assignable to.
    Any,
    Simple(SimpleType),
    Named(QualifiedName),
    /// Anonymous ordered collection.
    List(Box<TypeRef>),
    /// Anonymous dictionary.
    Map(Box<TypeRef>, Box<TypeRef>),
}

impl TypeRef {
    pub fn named(name: impl Into<QualifiedName>) -> Self {
        TypeRef::Named(name.into())
    }

    pub fn list(item: impl Into<TypeRef>) -> Self {
        TypeRef::List(Box::new(item.into()))
    }

    pub fn map(key: impl Into<TypeRef>, value: impl Into<TypeRef>) -> Self {
        TypeRef::Map(Box::new(key.into()), Box::new(value.into()))
    }
}

impl From<SimpleType> for TypeRef {
    fn from(s: SimpleType) -> Self {
        TypeRef::Simple(s)
    }
}

impl From<QualifiedName> for TypeRef {
    fn from(n: QualifiedName) -> Self {
        TypeRef::Named(n)
    }
}

impl From<&str> for TypeRef {
    fn from(dotted: &str) -> Self {
        TypeRef::Named(QualifiedName::parse(dotted))
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Any => f.write_str("Object"),
            TypeRef::Simple(s) => f.write_str(s.type_name()),
            TypeRef::Named(n) => write!(f, "{}", n),
            TypeRef::List(item) => write!(f, "List<{}>", item),
            TypeRef::Map(k, v) => write!(f, "Map<{}, {}>", k, v),
        }
    }
}

/// Factory producing an initialized instance of a type.
#[derive(Clone)]
pub struct Constructor(Arc<dyn Fn() -> Object + Send + Sync>);

impl Constructor {
    pub fn new(f: impl Fn() -> Object + Send + Sync + 'static) -> Self {
        Constructor(Arc::new(f))
    }

    pub fn construct(&self) -> Object {
        (self.0)()
    }
}

impl fmt::Debug for Constructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Constructor(..)")
    }
}

/// Named zero-argument check on an instance, such as `ShouldSerializeTags`.
#[derive(Clone)]
pub struct Predicate(Arc<dyn Fn(&Object) -> bool + Send + Sync>);

impl Predicate {
    pub fn new(f: impl Fn(&Object) -> bool + Send + Sync + 'static) -> Self {
        Predicate(Arc::new(f))
    }

    pub fn check(&self, obj: &Object) -> bool {
        (self.0)(obj)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Predicate(..)")
    }
}

/// Serialization role of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberRole {
    Attribute,
    /// A child element named after the member. Aggregate values are wrapped:
    /// the member element holds one element per item.
    Element,
    /// Collection items written directly under the owner, one element per item.
    CollectionElement,
    /// Dictionary entries written directly under the owner.
    DictionaryElement,
    /// Supplies the owner's structured child content without a member tag.
    Content,
    /// Written as the owner's inner text.
    Text,
    Ignore,
}

/// Known item element for a collection or dictionary: a wire name, a type, or
/// both. A name alone uses the declared item type; a type alone uses that
/// type's own wire name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ItemTag {
    pub name: Option<String>,
    pub namespace: Option<String>,
    pub ty: Option<TypeRef>,
}

impl ItemTag {
    pub fn named(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self {
            name: Some(name.into()),
            namespace: None,
            ty: Some(ty.into()),
        }
    }

    pub fn of_type(ty: impl Into<TypeRef>) -> Self {
        Self {
            name: None,
            namespace: None,
            ty: Some(ty.into()),
        }
    }

    pub fn name_only(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            namespace: None,
            ty: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Collection shape of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDecl {
    pub item: TypeRef,
    pub item_tags: Vec<ItemTag>,
    pub by_reference: bool,
}

impl CollectionDecl {
    pub fn of(item: impl Into<TypeRef>) -> Self {
        Self {
            item: item.into(),
            item_tags: Vec::new(),
            by_reference: false,
        }
    }

    pub fn item(mut self, tag: ItemTag) -> Self {
        self.item_tags.push(tag);
        self
    }

    /// Items are written as identifiers of the referenced objects.
    pub fn by_reference(mut self) -> Self {
        self.by_reference = true;
        self
    }
}

/// Dictionary shape of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictionaryDecl {
    pub key: TypeRef,
    pub value: TypeRef,
    pub key_attribute: Option<String>,
    pub item_tags: Vec<ItemTag>,
    pub by_reference: bool,
}

impl DictionaryDecl {
    pub fn of(key: impl Into<TypeRef>, value: impl Into<TypeRef>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            key_attribute: None,
            item_tags: Vec::new(),
            by_reference: false,
        }
    }

    pub fn key_attribute(mut self, name: impl Into<String>) -> Self {
        self.key_attribute = Some(name.into());
        self
    }

    pub fn item(mut self, tag: ItemTag) -> Self {
        self.item_tags.push(tag);
        self
    }

    pub fn by_reference(mut self) -> Self {
        self.by_reference = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateDecl {
    Collection(CollectionDecl),
    Dictionary(DictionaryDecl),
}

/// One member of a declared type.
#[derive(Debug, Clone)]
pub struct MemberDecl {
    pub name: String,
    pub role: MemberRole,
    pub ty: TypeRef,
    pub wire_name: Option<String>,
    pub namespace: Option<String>,
    pub order: Option<i64>,
    pub nullable: bool,
    pub reference: bool,
    pub read_only: bool,
    pub default: Option<Value>,
    pub converter: Option<Converter>,
    pub item_tags: Vec<ItemTag>,
    pub key_attribute: Option<String>,
}

impl MemberDecl {
    pub fn new(name: impl Into<String>, role: MemberRole, ty: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            role,
            ty: ty.into(),
            wire_name: None,
            namespace: None,
            order: None,
            nullable: false,
            reference: false,
            read_only: false,
            default: None,
            converter: None,
            item_tags: Vec::new(),
            key_attribute: None,
        }
    }

    pub fn attribute(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self::new(name, MemberRole::Attribute, ty)
    }

    pub fn element(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self::new(name, MemberRole::Element, ty)
    }

    pub fn collection_element(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self::new(name, MemberRole::CollectionElement, ty)
    }

    pub fn dictionary_element(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self::new(name, MemberRole::DictionaryElement, ty)
    }

    pub fn content(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self::new(name, MemberRole::Content, ty)
    }

    pub fn text(name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        Self::new(name, MemberRole::Text, ty)
    }

    pub fn ignore(name: impl Into<String>) -> Self {
        Self::new(name, MemberRole::Ignore, TypeRef::Any)
    }

    /// Explicit wire name; bypasses the configured name casing.
    pub fn wire_name(mut self, name: impl Into<String>) -> Self {
        self.wire_name = Some(name.into());
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Serialize the identifier of the value instead of the value itself.
    pub fn reference(mut self) -> Self {
        self.reference = true;
        self
    }

    /// Items read for this member are appended to the aggregate already held
    /// by the freshly constructed owner instead of replacing it.
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn converter(mut self, converter: Converter) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn item(mut self, tag: ItemTag) -> Self {
        self.item_tags.push(tag);
        self
    }

    pub fn key_attribute(mut self, name: impl Into<String>) -> Self {
        self.key_attribute = Some(name.into());
        self
    }
}

/// Kind of a declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeShape {
    Object,
    Enum(Vec<String>),
}

#[derive(Debug, Clone, Default)]
pub enum ConstructorDecl {
    #[default]
    None,
    /// An empty instance with member defaults applied.
    Default,
    Custom(Constructor),
}

/// Function listing known subtypes, evaluated at registration.
pub type SubtypeFactory = fn() -> Vec<QualifiedName>;

/// Declaration of one type.
#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: QualifiedName,
    pub shape: TypeShape,
    pub is_abstract: bool,
    pub base: Option<QualifiedName>,
    pub wire_name: Option<String>,
    pub namespace: Option<String>,
    pub constructor: ConstructorDecl,
    pub converter: Option<Converter>,
    pub known_subtypes: Vec<QualifiedName>,
    pub subtype_factories: Vec<SubtypeFactory>,
    pub aggregate: Option<AggregateDecl>,
    pub members: Vec<MemberDecl>,
    pub id_member: Option<String>,
    pub predicates: Vec<(String, Predicate)>,
}

impl TypeDecl {
    fn with_shape(name: impl Into<QualifiedName>, shape: TypeShape) -> Self {
        Self {
            name: name.into(),
            shape,
            is_abstract: false,
            base: None,
            wire_name: None,
            namespace: None,
            constructor: ConstructorDecl::None,
            converter: None,
            known_subtypes: Vec::new(),
            subtype_factories: Vec::new(),
            aggregate: None,
            members: Vec::new(),
            id_member: None,
            predicates: Vec::new(),
        }
    }

    pub fn object(name: impl Into<QualifiedName>) -> Self {
        Self::with_shape(name, TypeShape::Object)
    }

    /// An object type that is never instantiated directly.
    pub fn abstract_object(name: impl Into<QualifiedName>) -> Self {
        let mut decl = Self::with_shape(name, TypeShape::Object);
        decl.is_abstract = true;
        decl
    }

    pub fn enumeration<I, S>(name: impl Into<QualifiedName>, variants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_shape(
            name,
            TypeShape::Enum(variants.into_iter().map(Into::into).collect()),
        )
    }

    pub fn extends(mut self, base: impl Into<QualifiedName>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn wire_name(mut self, name: impl Into<String>) -> Self {
        self.wire_name = Some(name.into());
        self
    }

    /// Explicit wire namespace; overrides the origin-namespace mapping.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn default_constructor(mut self) -> Self {
        self.constructor = ConstructorDecl::Default;
        self
    }

    pub fn constructor(mut self, f: impl Fn() -> Object + Send + Sync + 'static) -> Self {
        self.constructor = ConstructorDecl::Custom(Constructor::new(f));
        self
    }

    pub fn converter(mut self, converter: Converter) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn known_subtype(mut self, name: impl Into<QualifiedName>) -> Self {
        self.known_subtypes.push(name.into());
        self
    }

    pub fn known_subtypes_from(mut self, factory: SubtypeFactory) -> Self {
        self.subtype_factories.push(factory);
        self
    }

    pub fn collection(mut self, collection: CollectionDecl) -> Self {
        self.aggregate = Some(AggregateDecl::Collection(collection));
        self
    }

    pub fn dictionary(mut self, dictionary: DictionaryDecl) -> Self {
        self.aggregate = Some(AggregateDecl::Dictionary(dictionary));
        self
    }

    /// Member holding the identifier written for reference-only uses.
    pub fn id_member(mut self, name: impl Into<String>) -> Self {
        self.id_member = Some(name.into());
        self
    }

    pub fn predicate(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&Object) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.predicates.push((name.into(), Predicate::new(f)));
        self
    }

    pub fn member(mut self, member: MemberDecl) -> Self {
        self.members.push(member);
        self
    }

    pub fn attribute(self, name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        self.member(MemberDecl::attribute(name, ty))
    }

    pub fn element(self, name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        self.member(MemberDecl::element(name, ty))
    }

    pub fn content(self, name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        self.member(MemberDecl::content(name, ty))
    }

    pub fn text(self, name: impl Into<String>, ty: impl Into<TypeRef>) -> Self {
        self.member(MemberDecl::text(name, ty))
    }

    pub fn ignore(self, name: impl Into<String>) -> Self {
        self.member(MemberDecl::ignore(name))
    }
}

/// The set of declarations a mapper draws from.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: BTreeMap<QualifiedName, TypeDecl>,
    namespace_map: BTreeMap<String, String>,
    preferred_prefixes: Vec<(String, String)>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a declaration. A later declaration of the same name replaces the
    /// earlier one.
    pub fn declare(&mut self, decl: TypeDecl) -> &mut Self {
        self.types.insert(decl.name.clone(), decl);
        self
    }

    /// Maps every type of an origin namespace to a wire namespace.
    pub fn map_namespace(
        &mut self,
        origin: impl Into<String>,
        wire: impl Into<String>,
    ) -> &mut Self {
        self.namespace_map.insert(origin.into(), wire.into());
        self
    }

    /// Prefers a prefix for a wire namespace.
    pub fn prefer_prefix(
        &mut self,
        wire: impl Into<String>,
        prefix: impl Into<String>,
    ) -> &mut Self {
        self.preferred_prefixes.push((wire.into(), prefix.into()));
        self
    }

    pub fn get(&self, name: &QualifiedName) -> Option<&TypeDecl> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &QualifiedName) -> bool {
        self.types.contains_key(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.types.values()
    }

    pub fn wire_namespace_for(&self, origin: &str) -> Option<&str> {
        self.namespace_map.get(origin).map(String::as_str)
    }

    pub fn preferred_prefix(&self, wire: &str) -> Option<&str> {
        self.preferred_prefixes
            .iter()
            .find(|(ns, _)| ns == wire)
            .map(|(_, prefix)| prefix.as_str())
    }

    /// Aggregate shape of a type reference, following base types.
    pub fn aggregate_of(&self, ty: &TypeRef) -> Option<AggregateDecl> {
        match ty {
            TypeRef::List(item) => Some(AggregateDecl::Collection(CollectionDecl::of(
                (**item).clone(),
            ))),
            TypeRef::Map(k, v) => Some(AggregateDecl::Dictionary(DictionaryDecl::of(
                (**k).clone(),
                (**v).clone(),
            ))),
            TypeRef::Named(name) => {
                let mut current = self.types.get(name);
                let mut depth = 0;
                while let Some(decl) = current {
                    if let Some(aggregate) = &decl.aggregate {
                        return Some(aggregate.clone());
                    }
                    depth += 1;
                    if depth > self.types.len() {
                        break;
                    }
                    current = decl.base.as_ref().and_then(|b| self.types.get(b));
                }
                None
            }
            TypeRef::Any | TypeRef::Simple(_) => None,
        }
    }

    /// Checks if a declared type has any subtype, declared or derived.
    pub fn has_subtypes(&self, name: &QualifiedName) -> bool {
        self.types.get(name).is_some_and(|decl| {
            !decl.known_subtypes.is_empty() || !decl.subtype_factories.is_empty()
        }) || self
            .types
            .values()
            .any(|decl| decl.base.as_ref() == Some(name))
    }
}
