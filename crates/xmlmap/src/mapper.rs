//! Type registry.
//!
//! A [`Mapper`] turns declarations into descriptors once per type and
//! memoizes them. Registration walks the type graph recursively: member,
//! item, key, value, base and subtype types are registered along the way.
//! A descriptor is reserved before it is filled, so recursive type graphs
//! terminate. If any type in a top-level [`Mapper::register`] call fails,
//! everything that call added is rolled back.
//!
//! [`Mapper::seal`] assigns namespace prefixes and returns the read-only
//! [`Mappings`], which the engines borrow and which may be shared between
//! threads.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::convert::{self, Converter, builtin};
use crate::descriptor::{
    AggregateDescriptor, CollectionDescriptor, DictionaryDescriptor, ItemTagTable,
    MemberDescriptor, TypeDescriptor, TypeHandle, TypeKind,
};
use crate::error::{RegistrationError, Result};
use crate::name::{QualifiedName, Tag};
use crate::namespace::NamespaceRegistry;
use crate::options::MapperOptions;
use crate::schema::{
    AggregateDecl, CollectionDecl, ConstructorDecl, DictionaryDecl, ItemTag, MemberDecl,
    MemberRole, Predicate, Schema, TypeDecl, TypeRef, TypeShape,
};
use crate::utils::{self, SYSTEM_ORIGIN, XSI_NAMESPACE, XSI_PREFIX};
use crate::value::{Scalar, SimpleType, Value};

/// Added to the declaration index of element members without an explicit
/// order, so attributes and elements never interleave.
pub const ELEMENT_ORDER_OFFSET: i64 = 10_000;

/// Attribute carrying simple dictionary keys when none is configured.
pub const DEFAULT_KEY_ATTRIBUTE: &str = "Key";

type RegResult<T> = std::result::Result<T, RegistrationError>;

/// Mutable type registry used during the registration phase.
#[derive(Debug)]
pub struct Mapper {
    schema: Schema,
    options: MapperOptions,
    types: Vec<TypeDescriptor>,
    by_ref: HashMap<TypeRef, TypeHandle>,
    namespaces: NamespaceRegistry,
}

impl Mapper {
    pub fn new(schema: Schema, options: MapperOptions) -> Self {
        let mut mapper = Self {
            schema,
            options,
            types: Vec::new(),
            by_ref: HashMap::new(),
            namespaces: NamespaceRegistry::new(),
        };
        mapper.push_builtin(TypeRef::Any, "Object", "anyType", TypeKind::Any);
        for simple in SimpleType::ALL {
            mapper.push_builtin(
                TypeRef::Simple(simple),
                simple.type_name(),
                simple.wire_name(),
                TypeKind::Simple(simple),
            );
        }
        mapper
    }

    pub fn with_options(options: MapperOptions) -> Self {
        Self::new(Schema::new(), options)
    }

    fn push_builtin(&mut self, ty: TypeRef, name: &str, wire_name: &str, kind: TypeKind) {
        let namespace = self
            .schema
            .wire_namespace_for(SYSTEM_ORIGIN)
            .map(str::to_string)
            .or_else(|| self.options.default_namespace.clone());
        if let Some(ns) = &namespace {
            self.add_namespace(ns, SYSTEM_ORIGIN);
        }
        let handle = self.next_handle();
        let mut desc = TypeDescriptor::reserve(
            handle,
            QualifiedName::new(SYSTEM_ORIGIN, name),
            Tag::new(namespace.as_deref(), wire_name),
            SYSTEM_ORIGIN.to_string(),
            kind,
        );
        desc.filled = true;
        self.types.push(desc);
        self.by_ref.insert(ty, handle);
    }

    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Adds a declaration to the schema. Already registered types keep the
    /// descriptor built from the earlier declaration.
    pub fn declare(&mut self, decl: TypeDecl) -> &mut Self {
        self.schema.declare(decl);
        self
    }

    pub(crate) fn schema_mut(&mut self) -> &mut Schema {
        &mut self.schema
    }

    pub fn get(&self, handle: TypeHandle) -> &TypeDescriptor {
        &self.types[handle.index()]
    }

    pub fn lookup(&self, ty: &TypeRef) -> Option<TypeHandle> {
        self.by_ref.get(ty).copied()
    }

    pub fn namespaces(&self) -> &NamespaceRegistry {
        &self.namespaces
    }

    /// Number of registered types, built-ins included.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registers a type and everything it references. Idempotent.
    pub fn register(&mut self, ty: impl Into<TypeRef>) -> Result<TypeHandle> {
        let ty = ty.into();
        if let Some(handle) = self.lookup(&ty) {
            return Ok(handle);
        }
        let types = self.types.len();
        let namespaces = self.namespaces.len();
        match self.resolve(&ty) {
            Ok(handle) => Ok(handle),
            Err(err) => {
                self.types.truncate(types);
                self.by_ref.retain(|_, handle| handle.index() < types);
                self.namespaces.truncate(namespaces);
                tracing::debug!(type_ref = %ty, error = %err, "registration rolled back");
                Err(err.into())
            }
        }
    }

    /// Registers every declared type, in name order.
    pub fn register_all(&mut self) -> Result<()> {
        let names: Vec<QualifiedName> = self.schema.types().map(|d| d.name.clone()).collect();
        for name in names {
            self.register(TypeRef::Named(name))?;
        }
        Ok(())
    }

    /// Finishes registration: assigns namespace prefixes and freezes the
    /// registry.
    pub fn seal(mut self) -> Mappings {
        if self.needs_xsi() {
            self.namespaces
                .add_with_prefix(XSI_NAMESPACE, "", XSI_PREFIX);
        }
        self.namespaces
            .assign_prefixes(self.options.default_namespace.as_deref());

        let mut by_tag = HashMap::new();
        let mut by_local: HashMap<String, Vec<TypeHandle>> = HashMap::new();
        for desc in &self.types {
            match by_tag.entry(desc.tag.clone()) {
                Entry::Vacant(e) => {
                    e.insert(desc.handle);
                }
                Entry::Occupied(e) => {
                    tracing::trace!(
                        tag = %desc.tag,
                        kept = %self.types[e.get().index()].name,
                        ignored = %desc.name,
                        "wire tag already taken"
                    );
                    continue;
                }
            }
            by_local
                .entry(desc.tag.local().to_string())
                .or_default()
                .push(desc.handle);
        }

        tracing::debug!(
            types = self.types.len(),
            namespaces = self.namespaces.len(),
            "mappings sealed"
        );
        Mappings {
            options: self.options,
            types: self.types,
            by_ref: self.by_ref,
            by_tag,
            by_local,
            namespaces: self.namespaces,
        }
    }

    fn needs_xsi(&self) -> bool {
        self.types.iter().any(|desc| {
            desc.elements.iter().chain(desc.content.iter()).any(|m| {
                (m.nullable && self.options.nil_markers) || self.is_polymorphic(m.ty)
            }) || desc
                .aggregate
                .as_ref()
                .is_some_and(|agg| self.aggregate_polymorphic(agg))
        })
    }

    fn is_polymorphic(&self, ty: TypeHandle) -> bool {
        let desc = &self.types[ty.index()];
        matches!(desc.kind, TypeKind::Any) || !desc.known_subtypes.is_empty()
    }

    fn aggregate_polymorphic(&self, agg: &AggregateDescriptor) -> bool {
        match agg {
            AggregateDescriptor::Collection(c) => self.is_polymorphic(c.item),
            AggregateDescriptor::Dictionary(d) => {
                self.is_polymorphic(d.key) || self.is_polymorphic(d.value)
            }
        }
    }

    fn next_handle(&self) -> TypeHandle {
        TypeHandle(u32::try_from(self.types.len()).unwrap_or(u32::MAX))
    }

    fn add_namespace(&mut self, wire: &str, origin: &str) {
        if self.namespaces.try_add(wire, origin) {
            if let Some(prefix) = self.schema.preferred_prefix(wire) {
                self.namespaces.add_with_prefix(wire, origin, prefix);
            }
        }
    }

    fn resolve(&mut self, ty: &TypeRef) -> RegResult<TypeHandle> {
        if let Some(&handle) = self.by_ref.get(ty) {
            return Ok(handle);
        }
        match ty {
            TypeRef::List(item) => self.resolve_list(ty, item),
            TypeRef::Map(key, value) => self.resolve_map(ty, key, value),
            TypeRef::Named(name) => self.resolve_named(name),
            TypeRef::Any | TypeRef::Simple(_) => Err(RegistrationError::UndeclaredType {
                type_name: QualifiedName::new(SYSTEM_ORIGIN, ty.to_string()),
            }),
        }
    }

    fn reserve_anonymous(&mut self, ty: &TypeRef, kind: TypeKind) -> TypeHandle {
        let handle = self.next_handle();
        self.types.push(TypeDescriptor::reserve(
            handle,
            QualifiedName::new(SYSTEM_ORIGIN, ty.to_string()),
            Tag::unqualified(""),
            SYSTEM_ORIGIN.to_string(),
            kind,
        ));
        self.by_ref.insert(ty.clone(), handle);
        handle
    }

    fn anonymous_tag(&self, local: String) -> Tag {
        Tag::new(self.options.default_namespace.as_deref(), local)
    }

    fn resolve_list(&mut self, ty: &TypeRef, item: &TypeRef) -> RegResult<TypeHandle> {
        let handle = self.reserve_anonymous(ty, TypeKind::List);
        let item = self.resolve(item)?;
        let tag = self.anonymous_tag(format!(
            "ArrayOf{}",
            utils::capitalize(self.types[item.index()].tag.local())
        ));
        let desc = &mut self.types[handle.index()];
        desc.tag = tag;
        desc.aggregate = Some(AggregateDescriptor::Collection(CollectionDescriptor {
            item,
            by_reference: false,
            item_tags: ItemTagTable::default(),
        }));
        desc.filled = true;
        Ok(handle)
    }

    fn resolve_map(
        &mut self,
        ty: &TypeRef,
        key: &TypeRef,
        value: &TypeRef,
    ) -> RegResult<TypeHandle> {
        let handle = self.reserve_anonymous(ty, TypeKind::Map);
        let key = self.resolve(key)?;
        let value = self.resolve(value)?;
        let tag = self.anonymous_tag(format!(
            "MapOf{}{}",
            utils::capitalize(self.types[key.index()].tag.local()),
            utils::capitalize(self.types[value.index()].tag.local())
        ));
        let desc = &mut self.types[handle.index()];
        desc.tag = tag;
        desc.aggregate = Some(AggregateDescriptor::Dictionary(DictionaryDescriptor {
            key,
            value,
            key_attribute: DEFAULT_KEY_ATTRIBUTE.to_string(),
            by_reference: false,
            item_tags: ItemTagTable::default(),
        }));
        desc.filled = true;
        Ok(handle)
    }

    fn resolve_named(&mut self, name: &QualifiedName) -> RegResult<TypeHandle> {
        let decl = self
            .schema
            .get(name)
            .cloned()
            .ok_or_else(|| RegistrationError::UndeclaredType {
                type_name: name.clone(),
            })?;

        let origin = name.namespace().unwrap_or_default().to_string();
        let wire_namespace = decl
            .namespace
            .clone()
            .or_else(|| self.schema.wire_namespace_for(&origin).map(str::to_string))
            .or_else(|| self.options.default_namespace.clone());
        if let Some(ns) = &wire_namespace {
            self.add_namespace(ns, &origin);
        }

        let kind = match &decl.shape {
            TypeShape::Object => TypeKind::Object,
            TypeShape::Enum(variants) if variants.is_empty() => {
                return Err(RegistrationError::invalid(name, "enumeration declares no variants"));
            }
            TypeShape::Enum(variants) => TypeKind::Enum(variants.clone()),
        };
        let local = decl
            .wire_name
            .clone()
            .unwrap_or_else(|| name.name().to_string());
        let tag = Tag::new(wire_namespace.as_deref(), local);
        tracing::debug!(type_name = %name, tag = %tag, "registering type");

        let handle = self.next_handle();
        let mut desc = TypeDescriptor::reserve(handle, name.clone(), tag, origin, kind);
        desc.is_abstract = decl.is_abstract;
        desc.converter = decl.converter.clone();
        self.types.push(desc);
        self.by_ref.insert(TypeRef::Named(name.clone()), handle);

        self.fill(handle, &decl)?;
        Ok(handle)
    }

    fn fill(&mut self, handle: TypeHandle, decl: &TypeDecl) -> RegResult<()> {
        let base = match &decl.base {
            Some(base_name) => Some(self.resolve_base(decl, base_name)?),
            None => None,
        };
        let is_object = self.types[handle.index()].kind == TypeKind::Object;

        let mut members = match base {
            Some(b) => MemberSet::inherit(&self.types[b.index()]),
            None => MemberSet::default(),
        };
        let mut index = members.len();
        for member in &decl.members {
            members.remove(&member.name);
            if member.role == MemberRole::Ignore {
                continue;
            }
            if !is_object {
                return Err(RegistrationError::invalid(
                    &decl.name,
                    format!("enumerations cannot declare member '{}'", member.name),
                ));
            }
            let descriptor = self.build_member(handle, decl, member, index)?;
            index += 1;
            members.add(&decl.name, descriptor)?;
        }
        for member in members.iter_mut() {
            if let Some(predicate) = self.find_predicate(decl, &member.name) {
                member.predicate = Some(predicate);
            }
        }

        let aggregate = match &decl.aggregate {
            Some(AggregateDecl::Collection(c)) => {
                Some(AggregateDescriptor::Collection(self.collection(handle, decl, c)?))
            }
            Some(AggregateDecl::Dictionary(d)) => {
                Some(AggregateDescriptor::Dictionary(self.dictionary(handle, decl, d)?))
            }
            None => base.and_then(|b| self.types[b.index()].aggregate.clone()),
        };

        if members.content.is_some() && members.text.is_some() {
            return Err(RegistrationError::invalid(
                &decl.name,
                "a type cannot have both a content member and a text member",
            ));
        }
        if members.content.is_some() && aggregate.is_some() {
            return Err(RegistrationError::invalid(
                &decl.name,
                "a collection or dictionary type cannot have a content member",
            ));
        }

        let id_member = decl
            .id_member
            .clone()
            .or_else(|| base.and_then(|b| self.types[b.index()].id_member.clone()));
        if let Some(id) = &id_member {
            if !members.contains(id) {
                return Err(RegistrationError::invalid(
                    &decl.name,
                    format!("identifier member '{}' is not declared", id),
                ));
            }
        }

        let needs_constructor = is_object && !decl.is_abstract && decl.converter.is_none();
        if needs_constructor && matches!(decl.constructor, ConstructorDecl::None) {
            if self.options.tolerate_missing_constructor {
                tracing::trace!(type_name = %decl.name, "registered without constructor");
            } else {
                return Err(RegistrationError::MissingConstructor {
                    type_name: decl.name.clone(),
                });
            }
        }

        members.sort();
        let desc = &mut self.types[handle.index()];
        desc.base = base;
        desc.constructor = decl.constructor.clone();
        desc.attributes = members.attributes;
        desc.elements = members.elements;
        desc.content = members.content;
        desc.text = members.text;
        desc.aggregate = aggregate;
        desc.id_member = id_member;
        desc.filled = true;

        // Subtypes are resolved last so their base is already complete.
        let mut names = decl.known_subtypes.clone();
        for factory in &decl.subtype_factories {
            names.extend(factory());
        }
        for other in self.schema.types() {
            if other.base.as_ref() == Some(&decl.name) && !names.contains(&other.name) {
                names.push(other.name.clone());
            }
        }
        let mut subtypes = Vec::with_capacity(names.len());
        for name in names {
            let sub = self.resolve(&TypeRef::Named(name))?;
            if !subtypes.contains(&sub) {
                subtypes.push(sub);
            }
        }
        self.types[handle.index()].known_subtypes = subtypes;
        Ok(())
    }

    fn resolve_base(
        &mut self,
        decl: &TypeDecl,
        base_name: &QualifiedName,
    ) -> RegResult<TypeHandle> {
        let base = self.resolve(&TypeRef::Named(base_name.clone()))?;
        let base_desc = &self.types[base.index()];
        if !base_desc.filled {
            return Err(RegistrationError::invalid(
                &decl.name,
                format!("inheritance cycle through '{}'", base_name),
            ));
        }
        if base_desc.kind != TypeKind::Object || decl.shape != TypeShape::Object {
            return Err(RegistrationError::invalid(
                &decl.name,
                "only object types can extend object types",
            ));
        }
        Ok(base)
    }

    fn find_predicate(&self, decl: &TypeDecl, member: &str) -> Option<Predicate> {
        let wanted = format!("ShouldSerialize{}", member);
        let mut current = Some(decl);
        let mut depth = 0;
        while let Some(d) = current {
            if let Some((_, predicate)) = d.predicates.iter().find(|(name, _)| *name == wanted) {
                return Some(predicate.clone());
            }
            depth += 1;
            if depth > self.types.len() {
                break;
            }
            current = d.base.as_ref().and_then(|b| self.schema.get(b));
        }
        None
    }

    fn build_member(
        &mut self,
        owner: TypeHandle,
        decl: &TypeDecl,
        member: &MemberDecl,
        index: usize,
    ) -> RegResult<MemberDescriptor> {
        let ty = self.resolve(&member.ty)?;
        let owner_desc = &self.types[owner.index()];
        let owner_namespace = owner_desc.tag.namespace().map(str::to_string);
        let origin = owner_desc.origin_namespace.clone();

        let (case, namespace) = match member.role {
            MemberRole::Attribute => (self.options.attribute_case, member.namespace.clone()),
            _ => (
                self.options.element_case,
                member.namespace.clone().or(owner_namespace),
            ),
        };
        if let Some(ns) = &member.namespace {
            self.add_namespace(ns, &origin);
        }
        let local = member
            .wire_name
            .clone()
            .unwrap_or_else(|| utils::apply_case(&member.name, case));

        let aggregate = self.schema.aggregate_of(&member.ty);
        match member.role {
            MemberRole::CollectionElement
                if !matches!(aggregate, Some(AggregateDecl::Collection(_))) =>
            {
                return Err(RegistrationError::invalid(
                    &decl.name,
                    format!("collection element member '{}' needs a collection type", member.name),
                ));
            }
            MemberRole::DictionaryElement
                if !matches!(aggregate, Some(AggregateDecl::Dictionary(_))) =>
            {
                return Err(RegistrationError::invalid(
                    &decl.name,
                    format!("dictionary element member '{}' needs a dictionary type", member.name),
                ));
            }
            MemberRole::Attribute => {
                let value_desc = &self.types[ty.index()];
                let has_text_form = value_desc.is_simple()
                    || value_desc.kind == TypeKind::Any
                    || matches!(member.converter, Some(Converter::Text(_)));
                if !has_text_form && !member.reference {
                    return Err(RegistrationError::invalid(
                        &decl.name,
                        format!(
                            "attribute member '{}' needs a simple type or a text converter",
                            member.name
                        ),
                    ));
                }
            }
            _ => {}
        }

        let mut item_tags = ItemTagTable::default();
        if !member.item_tags.is_empty() {
            let item_ty = match &aggregate {
                Some(AggregateDecl::Collection(c)) => c.item.clone(),
                Some(AggregateDecl::Dictionary(d)) => d.value.clone(),
                None => {
                    return Err(RegistrationError::invalid(
                        &decl.name,
                        format!(
                            "member '{}' declares item tags but is not a collection or dictionary",
                            member.name
                        ),
                    ));
                }
            };
            self.fill_item_tags(
                &mut item_tags,
                &member.item_tags,
                &item_ty,
                namespace.as_deref(),
                decl,
                &origin,
            )?;
        }

        if let Some(key_attribute) = &member.key_attribute {
            match &aggregate {
                Some(AggregateDecl::Dictionary(d)) => {
                    let key = self.resolve(&d.key)?;
                    self.check_simple_key(decl, key, key_attribute)?;
                }
                _ => {
                    return Err(RegistrationError::invalid(
                        &decl.name,
                        format!(
                            "member '{}' declares a key attribute but is not a dictionary",
                            member.name
                        ),
                    ));
                }
            }
        }

        let default = match &member.default {
            Some(Value::Scalar(scalar)) if member.converter.is_none() => {
                Some(self.coerce_default(decl, &member.name, ty, scalar)?)
            }
            other => other.clone(),
        };

        let offset = match member.role {
            MemberRole::Attribute => 0,
            _ => ELEMENT_ORDER_OFFSET,
        };
        let order = member
            .order
            .unwrap_or_else(|| i64::try_from(index).unwrap_or(i64::MAX) + offset);

        Ok(MemberDescriptor {
            name: member.name.clone(),
            role: member.role,
            tag: Tag::new(namespace.as_deref(), local),
            order,
            ty,
            nullable: member.nullable,
            reference: member.reference,
            read_only: member.read_only,
            default,
            converter: member.converter.clone(),
            predicate: None,
            item_tags,
            key_attribute: member.key_attribute.clone(),
        })
    }

    /// Brings a scalar default to the member's own type, so that suppression
    /// compares like with like and a constructed instance holds the declared
    /// type.
    fn coerce_default(
        &self,
        decl: &TypeDecl,
        member: &str,
        ty: TypeHandle,
        scalar: &Scalar,
    ) -> RegResult<Value> {
        let desc = &self.types[ty.index()];
        let exact = match desc.kind() {
            TypeKind::Any => true,
            TypeKind::Simple(simple) => scalar.simple_type() == Some(*simple),
            TypeKind::Enum(_) => {
                matches!(scalar, Scalar::Enum(e) if e.type_name == *desc.name())
            }
            TypeKind::Object | TypeKind::List | TypeKind::Map => {
                return Err(RegistrationError::invalid(
                    &decl.name,
                    format!("default of member '{}' is not a '{}'", member, desc.name()),
                ));
            }
        };
        if exact {
            return Ok(Value::Scalar(scalar.clone()));
        }
        let text = builtin::format_scalar(scalar, &self.options.culture);
        convert::from_text(&text, None, desc, &self.options).map_err(|err| {
            RegistrationError::invalid(
                &decl.name,
                format!("default of member '{}' does not convert: {}", member, err),
            )
        })
    }

    fn check_simple_key(&self, decl: &TypeDecl, key: TypeHandle, attribute: &str) -> RegResult<()> {
        if self.types[key.index()].is_simple() {
            Ok(())
        } else {
            Err(RegistrationError::invalid(
                &decl.name,
                format!("key attribute '{}' needs a simple key type", attribute),
            ))
        }
    }

    fn fill_item_tags(
        &mut self,
        table: &mut ItemTagTable,
        tags: &[ItemTag],
        item_ty: &TypeRef,
        default_namespace: Option<&str>,
        decl: &TypeDecl,
        origin: &str,
    ) -> RegResult<()> {
        for item in tags {
            if item.name.is_none() && item.ty.is_none() {
                return Err(RegistrationError::invalid(
                    &decl.name,
                    "item declaration needs a name or a type",
                ));
            }
            let ty = item.ty.clone().unwrap_or_else(|| item_ty.clone());
            let handle = self.resolve(&ty)?;
            let type_tag = self.types[handle.index()].tag.clone();
            if let Some(ns) = &item.namespace {
                self.add_namespace(ns, origin);
            }
            let tag = match (&item.name, &item.namespace) {
                (Some(name), Some(ns)) => Tag::new(Some(ns), name.clone()),
                (Some(name), None) => Tag::new(default_namespace, name.clone()),
                (None, Some(ns)) => Tag::new(Some(ns), type_tag.local()),
                (None, None) => type_tag,
            };
            table.insert(tag, handle);
        }
        Ok(())
    }

    fn collection(
        &mut self,
        owner: TypeHandle,
        decl: &TypeDecl,
        c: &CollectionDecl,
    ) -> RegResult<CollectionDescriptor> {
        let item = self.resolve(&c.item)?;
        let owner_desc = &self.types[owner.index()];
        let namespace = owner_desc.tag.namespace().map(str::to_string);
        let origin = owner_desc.origin_namespace.clone();
        let mut item_tags = ItemTagTable::default();
        self.fill_item_tags(
            &mut item_tags,
            &c.item_tags,
            &c.item,
            namespace.as_deref(),
            decl,
            &origin,
        )?;
        Ok(CollectionDescriptor {
            item,
            by_reference: c.by_reference,
            item_tags,
        })
    }

    fn dictionary(
        &mut self,
        owner: TypeHandle,
        decl: &TypeDecl,
        d: &DictionaryDecl,
    ) -> RegResult<DictionaryDescriptor> {
        let key = self.resolve(&d.key)?;
        let value = self.resolve(&d.value)?;
        if let Some(attribute) = &d.key_attribute {
            self.check_simple_key(decl, key, attribute)?;
        }
        let owner_desc = &self.types[owner.index()];
        let namespace = owner_desc.tag.namespace().map(str::to_string);
        let origin = owner_desc.origin_namespace.clone();
        let mut item_tags = ItemTagTable::default();
        self.fill_item_tags(
            &mut item_tags,
            &d.item_tags,
            &d.value,
            namespace.as_deref(),
            decl,
            &origin,
        )?;
        Ok(DictionaryDescriptor {
            key,
            value,
            key_attribute: d
                .key_attribute
                .clone()
                .unwrap_or_else(|| DEFAULT_KEY_ATTRIBUTE.to_string()),
            by_reference: d.by_reference,
            item_tags,
        })
    }
}

/// Members of a type while it is being filled.
#[derive(Default)]
struct MemberSet {
    attributes: Vec<MemberDescriptor>,
    elements: Vec<MemberDescriptor>,
    content: Option<MemberDescriptor>,
    text: Option<MemberDescriptor>,
}

impl MemberSet {
    fn inherit(base: &TypeDescriptor) -> Self {
        Self {
            attributes: base.attributes.clone(),
            elements: base.elements.clone(),
            content: base.content.clone(),
            text: base.text.clone(),
        }
    }

    fn len(&self) -> usize {
        self.attributes.len()
            + self.elements.len()
            + usize::from(self.content.is_some())
            + usize::from(self.text.is_some())
    }

    fn contains(&self, name: &str) -> bool {
        self.iter().any(|m| m.name == name)
    }

    fn iter(&self) -> impl Iterator<Item = &MemberDescriptor> {
        self.attributes
            .iter()
            .chain(self.elements.iter())
            .chain(self.content.iter())
            .chain(self.text.iter())
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut MemberDescriptor> {
        self.attributes
            .iter_mut()
            .chain(self.elements.iter_mut())
            .chain(self.content.iter_mut())
            .chain(self.text.iter_mut())
    }

    /// Drops an inherited member that a derived declaration redeclares.
    fn remove(&mut self, name: &str) {
        self.attributes.retain(|m| m.name != name);
        self.elements.retain(|m| m.name != name);
        if self.content.as_ref().is_some_and(|m| m.name == name) {
            self.content = None;
        }
        if self.text.as_ref().is_some_and(|m| m.name == name) {
            self.text = None;
        }
    }

    fn add(&mut self, owner: &QualifiedName, member: MemberDescriptor) -> RegResult<()> {
        match member.role {
            MemberRole::Attribute => push_unique(&mut self.attributes, member),
            MemberRole::Element => push_unique(&mut self.elements, member),
            MemberRole::CollectionElement | MemberRole::DictionaryElement => {
                self.elements.push(member)
            }
            MemberRole::Content => {
                if self.content.is_some() {
                    return Err(RegistrationError::invalid(owner, "more than one content member"));
                }
                self.content = Some(member);
            }
            MemberRole::Text => {
                if self.text.is_some() {
                    return Err(RegistrationError::invalid(owner, "more than one text member"));
                }
                self.text = Some(member);
            }
            MemberRole::Ignore => {}
        }
        Ok(())
    }

    fn sort(&mut self) {
        let key = |m: &MemberDescriptor| (m.order, m.name.clone());
        self.attributes.sort_by_key(key);
        self.elements.sort_by_key(key);
    }
}

/// First registration of a wire name within a category wins.
fn push_unique(members: &mut Vec<MemberDescriptor>, member: MemberDescriptor) {
    if let Some(existing) = members
        .iter()
        .find(|m| m.role == member.role && m.tag == member.tag)
    {
        tracing::trace!(
            tag = %member.tag,
            kept = %existing.name,
            ignored = %member.name,
            "duplicate wire name ignored"
        );
        return;
    }
    members.push(member);
}

/// Read-only registry shared by the engines.
#[derive(Debug)]
pub struct Mappings {
    options: MapperOptions,
    types: Vec<TypeDescriptor>,
    by_ref: HashMap<TypeRef, TypeHandle>,
    by_tag: HashMap<Tag, TypeHandle>,
    by_local: HashMap<String, Vec<TypeHandle>>,
    namespaces: NamespaceRegistry,
}

impl Mappings {
    pub fn options(&self) -> &MapperOptions {
        &self.options
    }

    pub fn namespaces(&self) -> &NamespaceRegistry {
        &self.namespaces
    }

    pub fn get(&self, handle: TypeHandle) -> &TypeDescriptor {
        &self.types[handle.index()]
    }

    pub fn lookup(&self, ty: &TypeRef) -> Option<TypeHandle> {
        self.by_ref.get(ty).copied()
    }

    pub fn descriptor(&self, ty: impl Into<TypeRef>) -> Option<&TypeDescriptor> {
        self.lookup(&ty.into()).map(|h| self.get(h))
    }

    pub fn descriptors(&self) -> &[TypeDescriptor] {
        &self.types
    }

    /// Handle of the root type every value is assignable to.
    pub fn any(&self) -> TypeHandle {
        TypeHandle(0)
    }

    /// Bindings (prefix, namespace) declared on every document root, in
    /// registration order.
    pub fn root_declarations(&self) -> Vec<(String, String)> {
        self.namespaces
            .entries()
            .iter()
            .filter_map(|e| {
                e.prefix
                    .as_ref()
                    .map(|p| (p.clone(), e.wire_namespace.clone()))
            })
            .collect()
    }

    /// Resolves a wire tag to a type.
    ///
    /// Tries, in order: the exact tag; the same local name in progressively
    /// shorter namespaces (`http://acme.com/shapes/v2`, then
    /// `http://acme.com/shapes`, ...); no namespace; and finally the only
    /// type with that local name, if exactly one exists.
    pub fn resolve_tag(&self, tag: &Tag) -> Option<TypeHandle> {
        if let Some(&handle) = self.by_tag.get(tag) {
            return Some(handle);
        }
        if let Some(mut namespace) = tag.namespace() {
            while let Some(shorter) = utils::truncate_namespace(namespace) {
                if let Some(&handle) = self.by_tag.get(&tag.with_namespace(Some(shorter))) {
                    tracing::trace!(
                        tag = %tag,
                        namespace = shorter,
                        "resolved by truncated namespace"
                    );
                    return Some(handle);
                }
                namespace = shorter;
            }
            if let Some(&handle) = self.by_tag.get(&tag.with_namespace(None)) {
                tracing::trace!(tag = %tag, "resolved without namespace");
                return Some(handle);
            }
        }
        match self.by_local.get(tag.local()).map(Vec::as_slice) {
            Some([only]) => {
                tracing::trace!(tag = %tag, "resolved by local name");
                Some(*only)
            }
            _ => None,
        }
    }

    /// Checks if values of `actual` may stand where `expected` is declared.
    pub fn is_assignable(&self, actual: TypeHandle, expected: TypeHandle) -> bool {
        if actual == expected || expected == self.any() {
            return true;
        }
        let (a, e) = (self.get(actual), self.get(expected));
        match (&a.kind, &e.kind, &a.aggregate, &e.aggregate) {
            (
                TypeKind::List,
                TypeKind::List,
                Some(AggregateDescriptor::Collection(ac)),
                Some(AggregateDescriptor::Collection(ec)),
            ) => self.is_assignable(ac.item, ec.item),
            (
                TypeKind::Map,
                TypeKind::Map,
                Some(AggregateDescriptor::Dictionary(ad)),
                Some(AggregateDescriptor::Dictionary(ed)),
            ) => self.is_assignable(ad.key, ed.key) && self.is_assignable(ad.value, ed.value),
            _ => {
                let mut current = a.base;
                let mut depth = 0;
                while let Some(base) = current {
                    if base == expected {
                        return true;
                    }
                    depth += 1;
                    if depth > self.types.len() {
                        break;
                    }
                    current = self.get(base).base;
                }
                false
            }
        }
    }

    /// Runtime type of a value. Anonymous lists and maps take the expected
    /// type when it has the same shape.
    pub fn type_of(&self, value: &Value, expected: TypeHandle) -> Option<TypeHandle> {
        match value {
            Value::Null | Value::Ref(_) => Some(expected),
            Value::Scalar(Scalar::Enum(e)) => self.lookup(&TypeRef::Named(e.type_name.clone())),
            Value::Scalar(scalar) => scalar
                .simple_type()
                .and_then(|s| self.lookup(&TypeRef::Simple(s))),
            Value::Object(obj) => self.lookup(&TypeRef::Named(obj.type_name().clone())),
            Value::List(_) => match self.get(expected).kind {
                TypeKind::List => Some(expected),
                _ => self.lookup(&TypeRef::list(TypeRef::Any)),
            },
            Value::Map(_) => match self.get(expected).kind {
                TypeKind::Map => Some(expected),
                _ => self.lookup(&TypeRef::map(TypeRef::Any, TypeRef::Any)),
            },
        }
    }
}
