//! Immutable serialization descriptors.
//!
//! The mapper turns each [`TypeDecl`](crate::schema::TypeDecl) into one
//! [`TypeDescriptor`] held in an arena and addressed by [`TypeHandle`].
//! Handles let mutually recursive types point at each other without shared
//! ownership; a descriptor is reserved before it is filled so a type that
//! (indirectly) mentions itself resolves to its own handle.

use crate::convert::Converter;
use crate::name::{QualifiedName, Tag};
use crate::schema::{Constructor, ConstructorDecl, MemberRole, Predicate};
use crate::value::{Object, SimpleType, Value};

/// Index of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeHandle(pub(crate) u32);

impl TypeHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Any,
    Simple(SimpleType),
    Enum(Vec<String>),
    Object,
    /// Anonymous list, see [`TypeDescriptor::aggregate`].
    List,
    /// Anonymous map, see [`TypeDescriptor::aggregate`].
    Map,
}

/// Wire tag to item type table of a collection or dictionary.
///
/// Lookups go both ways: by tag when reading, by item type when writing.
/// The first entry for a type wins when several tags map to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemTagTable {
    entries: Vec<(Tag, TypeHandle)>,
}

impl ItemTagTable {
    pub(crate) fn insert(&mut self, tag: Tag, ty: TypeHandle) {
        if self.entries.iter().any(|(t, _)| *t == tag) {
            tracing::trace!(tag = %tag, "duplicate item tag ignored");
            return;
        }
        self.entries.push((tag, ty));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn type_for(&self, tag: &Tag) -> Option<TypeHandle> {
        self.entries
            .iter()
            .find(|(t, _)| t == tag)
            .map(|(_, ty)| *ty)
    }

    pub fn tag_for(&self, ty: TypeHandle) -> Option<&Tag> {
        self.entries
            .iter()
            .find(|(_, h)| *h == ty)
            .map(|(tag, _)| tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Tag, TypeHandle)> {
        self.entries.iter().map(|(tag, ty)| (tag, *ty))
    }
}

#[derive(Debug, Clone)]
pub struct CollectionDescriptor {
    pub item: TypeHandle,
    pub by_reference: bool,
    pub item_tags: ItemTagTable,
}

#[derive(Debug, Clone)]
pub struct DictionaryDescriptor {
    pub key: TypeHandle,
    pub value: TypeHandle,
    /// Attribute carrying simple keys on the value element.
    pub key_attribute: String,
    pub by_reference: bool,
    pub item_tags: ItemTagTable,
}

#[derive(Debug, Clone)]
pub enum AggregateDescriptor {
    Collection(CollectionDescriptor),
    Dictionary(DictionaryDescriptor),
}

impl AggregateDescriptor {
    pub fn item_tags(&self) -> &ItemTagTable {
        match self {
            AggregateDescriptor::Collection(c) => &c.item_tags,
            AggregateDescriptor::Dictionary(d) => &d.item_tags,
        }
    }

    pub fn by_reference(&self) -> bool {
        match self {
            AggregateDescriptor::Collection(c) => c.by_reference,
            AggregateDescriptor::Dictionary(d) => d.by_reference,
        }
    }
}

/// How one member maps to the wire.
#[derive(Debug, Clone)]
pub struct MemberDescriptor {
    pub(crate) name: String,
    pub(crate) role: MemberRole,
    pub(crate) tag: Tag,
    pub(crate) order: i64,
    pub(crate) ty: TypeHandle,
    pub(crate) nullable: bool,
    pub(crate) reference: bool,
    pub(crate) read_only: bool,
    pub(crate) default: Option<Value>,
    pub(crate) converter: Option<Converter>,
    pub(crate) predicate: Option<Predicate>,
    pub(crate) item_tags: ItemTagTable,
    pub(crate) key_attribute: Option<String>,
}

impl MemberDescriptor {
    /// Declared member name, the key in [`Object`] member maps.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> MemberRole {
        self.role
    }

    /// Wire name of the attribute or element.
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn order(&self) -> i64 {
        self.order
    }

    pub fn value_type(&self) -> TypeHandle {
        self.ty
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_reference(&self) -> bool {
        self.reference
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn converter(&self) -> Option<&Converter> {
        self.converter.as_ref()
    }

    /// Item tags declared on the member itself. They take precedence over the
    /// item tags of the member's aggregate type.
    pub fn item_tags(&self) -> &ItemTagTable {
        &self.item_tags
    }

    pub fn key_attribute(&self) -> Option<&str> {
        self.key_attribute.as_deref()
    }

    /// Checks the `ShouldSerialize` predicate and the declared default.
    pub(crate) fn should_write(&self, owner: &Object, value: &Value) -> bool {
        if let Some(predicate) = &self.predicate {
            if !predicate.check(owner) {
                return false;
            }
        }
        match &self.default {
            Some(default) => value != default,
            None => true,
        }
    }
}

/// Everything the engines need to know about one type.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub(crate) handle: TypeHandle,
    pub(crate) name: QualifiedName,
    pub(crate) tag: Tag,
    pub(crate) origin_namespace: String,
    pub(crate) kind: TypeKind,
    pub(crate) is_abstract: bool,
    pub(crate) base: Option<TypeHandle>,
    pub(crate) constructor: ConstructorDecl,
    pub(crate) converter: Option<Converter>,
    pub(crate) attributes: Vec<MemberDescriptor>,
    pub(crate) elements: Vec<MemberDescriptor>,
    pub(crate) content: Option<MemberDescriptor>,
    pub(crate) text: Option<MemberDescriptor>,
    pub(crate) aggregate: Option<AggregateDescriptor>,
    pub(crate) known_subtypes: Vec<TypeHandle>,
    pub(crate) id_member: Option<String>,
    pub(crate) filled: bool,
}

impl TypeDescriptor {
    pub(crate) fn reserve(
        handle: TypeHandle,
        name: QualifiedName,
        tag: Tag,
        origin_namespace: String,
        kind: TypeKind,
    ) -> Self {
        Self {
            handle,
            name,
            tag,
            origin_namespace,
            kind,
            is_abstract: false,
            base: None,
            constructor: ConstructorDecl::None,
            converter: None,
            attributes: Vec::new(),
            elements: Vec::new(),
            content: None,
            text: None,
            aggregate: None,
            known_subtypes: Vec::new(),
            id_member: None,
            filled: false,
        }
    }

    pub fn handle(&self) -> TypeHandle {
        self.handle
    }

    /// Logical name.
    pub fn name(&self) -> &QualifiedName {
        &self.name
    }

    /// Default wire tag.
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    pub fn origin_namespace(&self) -> &str {
        &self.origin_namespace
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn base(&self) -> Option<TypeHandle> {
        self.base
    }

    pub fn converter(&self) -> Option<&Converter> {
        self.converter.as_ref()
    }

    /// Attribute members in write order.
    pub fn attributes(&self) -> &[MemberDescriptor] {
        &self.attributes
    }

    /// Element, collection-element and dictionary-element members in write
    /// order.
    pub fn elements(&self) -> &[MemberDescriptor] {
        &self.elements
    }

    pub fn content(&self) -> Option<&MemberDescriptor> {
        self.content.as_ref()
    }

    pub fn text(&self) -> Option<&MemberDescriptor> {
        self.text.as_ref()
    }

    pub fn aggregate(&self) -> Option<&AggregateDescriptor> {
        self.aggregate.as_ref()
    }

    pub fn known_subtypes(&self) -> &[TypeHandle] {
        &self.known_subtypes
    }

    pub fn id_member(&self) -> Option<&str> {
        self.id_member.as_deref()
    }

    /// Checks if values of this type are written as text: built-in simple
    /// types, enums, and types with a text converter.
    pub fn is_simple(&self) -> bool {
        matches!(self.kind, TypeKind::Simple(_) | TypeKind::Enum(_))
            || matches!(self.converter, Some(Converter::Text(_)))
    }

    pub fn is_deserializable(&self) -> bool {
        match self.kind {
            TypeKind::Object => {
                self.converter.is_some() || !matches!(self.constructor, ConstructorDecl::None)
            }
            _ => true,
        }
    }

    pub fn find_attribute(&self, tag: &Tag) -> Option<&MemberDescriptor> {
        self.attributes.iter().find(|m| m.tag == *tag)
    }

    /// Finds the wrapped element member with this tag.
    pub fn find_element(&self, tag: &Tag) -> Option<&MemberDescriptor> {
        self.elements
            .iter()
            .find(|m| m.role == MemberRole::Element && m.tag == *tag)
    }

    /// Finds any member by declared name.
    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.attributes
            .iter()
            .chain(self.elements.iter())
            .chain(self.content.iter())
            .chain(self.text.iter())
            .find(|m| m.name == name)
    }

    pub(crate) fn members(&self) -> impl Iterator<Item = &MemberDescriptor> {
        self.attributes
            .iter()
            .chain(self.elements.iter())
            .chain(self.content.iter())
            .chain(self.text.iter())
    }

    /// Creates a fresh instance with member defaults applied, or `None` when
    /// the type has no constructor.
    pub fn instantiate(&self) -> Option<Object> {
        let mut obj = match &self.constructor {
            ConstructorDecl::None => return None,
            ConstructorDecl::Default => Object::new(self.name.clone()),
            ConstructorDecl::Custom(ctor) => construct(ctor, &self.name),
        };
        for member in self.members() {
            if let Some(default) = &member.default {
                if !obj.contains(&member.name) {
                    obj.set(member.name.clone(), default.clone());
                }
            }
        }
        Some(obj)
    }
}

/// Runs a custom constructor. The instance always carries the type it was
/// constructed for.
fn construct(ctor: &Constructor, name: &QualifiedName) -> Object {
    let mut obj = ctor.construct();
    if obj.type_name() != name {
        tracing::trace!(
            declared = %name,
            constructed = %obj.type_name(),
            "constructor returned an instance of another type"
        );
        obj.set_type_name(name.clone());
    }
    obj
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, default: Option<Value>) -> MemberDescriptor {
        MemberDescriptor {
            name: name.to_string(),
            role: MemberRole::Attribute,
            tag: Tag::unqualified(name),
            order: 0,
            ty: TypeHandle(0),
            nullable: false,
            reference: false,
            read_only: false,
            default,
            converter: None,
            predicate: None,
            item_tags: ItemTagTable::default(),
            key_attribute: None,
        }
    }

    #[test]
    fn test_item_tag_table_first_wins() {
        let mut table = ItemTagTable::default();
        table.insert(Tag::unqualified("circle"), TypeHandle(3));
        table.insert(Tag::unqualified("circle"), TypeHandle(4));
        table.insert(Tag::unqualified("round"), TypeHandle(3));
        assert_eq!(table.type_for(&Tag::unqualified("circle")), Some(TypeHandle(3)));
        assert_eq!(table.tag_for(TypeHandle(3)), Some(&Tag::unqualified("circle")));
        assert_eq!(table.iter().count(), 2);
    }

    #[test]
    fn test_instantiate_applies_defaults() {
        let mut desc = TypeDescriptor::reserve(
            TypeHandle(0),
            "Acme.Person".into(),
            Tag::unqualified("Person"),
            "Acme".to_string(),
            TypeKind::Object,
        );
        assert!(desc.instantiate().is_none());
        assert!(!desc.is_deserializable());

        desc.constructor = ConstructorDecl::Custom(Constructor::new(|| {
            Object::new("Acme.Person").with("Name", "anonymous")
        }));
        desc.attributes.push(member("Id", Some(Value::from(0))));
        desc.attributes.push(member("Name", Some(Value::from("unset"))));

        let obj = desc.instantiate().unwrap();
        assert_eq!(obj.get("Id"), Some(&Value::from(0)));
        // Values set by the constructor win over declared defaults.
        assert_eq!(obj.get("Name"), Some(&Value::from("anonymous")));
    }

    #[test]
    fn test_custom_constructor_instance_takes_declared_type() {
        let mut desc = TypeDescriptor::reserve(
            TypeHandle(0),
            "Acme.Person".into(),
            Tag::unqualified("Person"),
            "Acme".to_string(),
            TypeKind::Object,
        );
        desc.constructor = ConstructorDecl::Custom(Constructor::new(|| {
            Object::new("Acme.Draft").with("Name", "anonymous")
        }));
        let obj = desc.instantiate().unwrap();
        assert_eq!(obj.type_name().to_string(), "Acme.Person");
        assert_eq!(obj.get("Name"), Some(&Value::from("anonymous")));
    }

    #[test]
    fn test_should_write_skips_default() {
        let m = member("Id", Some(Value::from(0)));
        let owner = Object::new("Acme.Person");
        assert!(!m.should_write(&owner, &Value::from(0)));
        assert!(m.should_write(&owner, &Value::from(7)));
    }
}
