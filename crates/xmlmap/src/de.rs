//! Read engine.
//!
//! [`ObjectReader`] is the inverse of [`ObjectWriter`](crate::ser::ObjectWriter):
//! it pulls tokens from an [`XmlSource`], resolves each element to a
//! descriptor and rebuilds the [`Value`] graph.
//!
//! Child elements of an object are matched in this order:
//!
//! 1. a wrapped element member with the same tag;
//! 2. the item tables of flattened collection and dictionary members, then
//!    the same members again by global tag resolution;
//! 3. the content member;
//! 4. the items of the type's own collection or dictionary shape;
//! 5. the unknown-element policy: the [`UnknownMemberHandler`] if one is
//!    installed, else skip with a warning when unknown members are ignored,
//!    else [`ReadError::UnknownElement`].
//!
//! Items of an aggregate always resolve against the member's own item tags
//! before the global registry, so one element name can mean different
//! things in different collections.

use std::io::Read;

use crate::convert::{self, escape};
use crate::descriptor::{
    AggregateDescriptor, ItemTagTable, MemberDescriptor, TypeDescriptor, TypeHandle, TypeKind,
};
use crate::error::{ConversionError, MapError, ReadError, Result};
use crate::mapper::Mappings;
use crate::name::{QualifiedName, Tag};
use crate::schema::MemberRole;
use crate::utils::{self, XML_NAMESPACE, XSI_NAMESPACE};
use crate::value::{Aggregate, Object, Value};
use crate::xml::{QuickXmlSource, StartElement, XmlAttribute, XmlSource, XmlToken};

/// An attribute or element no member accounts for.
#[derive(Debug, Clone, Copy)]
pub enum UnknownMember<'a> {
    Attribute {
        owner: &'a QualifiedName,
        attribute: &'a XmlAttribute,
    },
    Element {
        owner: &'a QualifiedName,
        element: &'a StartElement,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownAction {
    /// Drop the attribute, or skip the element with its subtree.
    Skip,
    /// Abort the read with a structural error.
    Fail,
}

/// Callback deciding what happens to unknown attributes and elements.
pub trait UnknownMemberHandler {
    fn handle(&mut self, member: UnknownMember<'_>) -> UnknownAction;
}

impl<F> UnknownMemberHandler for F
where
    F: FnMut(UnknownMember<'_>) -> UnknownAction,
{
    fn handle(&mut self, member: UnknownMember<'_>) -> UnknownAction {
        self(member)
    }
}

/// Items collected for one aggregate while its owner is being read.
struct Pending<'m> {
    /// `None` for the owner's own collection or dictionary shape.
    member: Option<&'m MemberDescriptor>,
    items: Vec<Value>,
    entries: Vec<(Value, Value)>,
    /// Complex dictionary key waiting for its value element.
    key: Option<Value>,
}

/// Where the items of an aggregate go.
#[derive(Clone, Copy)]
enum Site<'m> {
    /// A flattened or content member of the object being read.
    Member(&'m MemberDescriptor),
    /// The object's own collection or dictionary shape, held by the given
    /// member when there is one.
    Own(Option<&'m MemberDescriptor>),
}

impl<'m> Site<'m> {
    fn target(self) -> Option<&'m MemberDescriptor> {
        match self {
            Site::Member(member) => Some(member),
            Site::Own(_) => None,
        }
    }

    /// Member whose item tags and key attribute apply.
    fn holder(self) -> Option<&'m MemberDescriptor> {
        match self {
            Site::Member(member) => Some(member),
            Site::Own(holder) => holder,
        }
    }
}

fn slot<'p, 'm>(
    pending: &'p mut Vec<Pending<'m>>,
    member: Option<&'m MemberDescriptor>,
) -> &'p mut Pending<'m> {
    let name = member.map(MemberDescriptor::name);
    let idx = match pending
        .iter()
        .position(|p| p.member.map(MemberDescriptor::name) == name)
    {
        Some(idx) => idx,
        None => {
            pending.push(Pending {
                member,
                items: Vec::new(),
                entries: Vec::new(),
                key: None,
            });
            pending.len() - 1
        }
    };
    &mut pending[idx]
}

/// Assigns a member value; read-only members append to the aggregate the
/// constructor already put there.
fn assign(obj: &mut Object, member: &MemberDescriptor, value: Value) {
    let read_only = member.is_read_only();
    let value = match (obj.get_mut(member.name()), value) {
        (Some(Value::List(items)), Value::List(more)) if read_only => {
            items.extend(more);
            return;
        }
        (Some(Value::Map(entries)), Value::Map(more)) if read_only => {
            entries.extend(more);
            return;
        }
        (Some(Value::Object(existing)), Value::Object(more)) if read_only => {
            for item in more.items() {
                existing.push_item(item.clone());
            }
            for (k, v) in more.entries() {
                existing.push_entry(k.clone(), v.clone());
            }
            return;
        }
        (_, value) => value,
    };
    obj.set(member.name(), value);
}

/// `xsi:` and `xml:` attributes, and the key attribute of a dictionary
/// entry, are never members.
fn is_reserved(attr: &XmlAttribute, exclude: Option<&Tag>) -> bool {
    matches!(attr.name.namespace(), Some(XSI_NAMESPACE | XML_NAMESPACE))
        || exclude == Some(&attr.name)
}

/// Reads object graphs from one source.
pub struct ObjectReader<'m, S: XmlSource> {
    mappings: &'m Mappings,
    source: S,
    handler: Option<Box<dyn UnknownMemberHandler + 'm>>,
}

impl<'m, S: XmlSource> ObjectReader<'m, S> {
    pub fn new(mappings: &'m Mappings, source: S) -> Self {
        Self {
            mappings,
            source,
            handler: None,
        }
    }

    /// Installs a callback for unknown attributes and elements. It takes
    /// precedence over the ignore-unknown option.
    pub fn with_unknown_handler(mut self, handler: impl UnknownMemberHandler + 'm) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn into_inner(self) -> S {
        self.source
    }

    /// Reads the document root as any registered type.
    pub fn read(&mut self) -> Result<Value> {
        self.read_as(self.mappings.any())
    }

    /// Reads the document root, which must be assignable to `expected`.
    pub fn read_as(&mut self, expected: TypeHandle) -> Result<Value> {
        let start = loop {
            match self.source.next_token()? {
                XmlToken::Start(start) => break start,
                XmlToken::Text(_) | XmlToken::End(_) => continue,
                XmlToken::Eof => return Err(ReadError::EmptyDocument.into()),
            }
        };
        let ty = self.mappings.resolve_tag(&start.tag).ok_or_else(|| {
            ReadError::UnrecognizedElement {
                tag: start.tag.clone(),
                location: start.position.into(),
            }
        })?;
        self.check_assignable(&start, ty, expected)?;
        tracing::debug!(type_name = %self.mappings.get(ty).name(), "reading document");
        self.read_element(&start, ty, None, None)
    }

    /// Reads the element whose start tag was just consumed, through its end
    /// tag.
    fn read_element(
        &mut self,
        start: &StartElement,
        expected: TypeHandle,
        member: Option<&'m MemberDescriptor>,
        exclude: Option<&Tag>,
    ) -> Result<Value> {
        if self.mappings.options().nil_markers && start.is_nil() {
            self.source.skip_subtree()?;
            return Ok(Value::Null);
        }
        let ty = match &start.type_hint {
            Some(hint) => {
                let actual = self.mappings.resolve_tag(hint).ok_or_else(|| {
                    ReadError::UnrecognizedElement {
                        tag: hint.clone(),
                        location: start.position.into(),
                    }
                })?;
                self.check_assignable(start, actual, expected)?;
                actual
            }
            None => expected,
        };
        self.read_body(start, ty, member, exclude)
    }

    fn read_body(
        &mut self,
        start: &StartElement,
        ty: TypeHandle,
        member: Option<&'m MemberDescriptor>,
        exclude: Option<&Tag>,
    ) -> Result<Value> {
        let mappings = self.mappings;
        let options = mappings.options();
        let desc = mappings.get(ty);
        let converter = member.and_then(MemberDescriptor::converter);

        if let Some(stream) = convert::stream_converter(converter, desc) {
            let value = stream.read(start, &mut self.source)?;
            self.finish_element()?;
            return Ok(value);
        }
        let has_text_form = convert::text_converter(converter, desc).is_some()
            || desc.is_simple()
            || matches!(desc.kind(), TypeKind::Any);
        if has_text_form {
            self.unmatched_attributes(desc.name(), start, exclude)?;
            let text = self.read_text(desc.name())?;
            return convert::from_text(&text, converter, desc, options)
                .map_err(|err| err.at(start.position).into());
        }

        match desc.kind() {
            TypeKind::List | TypeKind::Map => {
                let Some(aggregate) = desc.aggregate() else {
                    return Err(MapError::syntax(
                        format!("'{}' has no item shape", desc.name()),
                        start.position,
                    ));
                };
                self.unmatched_attributes(desc.name(), start, exclude)?;
                let mut pending = Vec::new();
                loop {
                    match self.source.next_token()? {
                        XmlToken::Start(child) => {
                            let site = Site::Own(member);
                            if !self.read_item(&mut pending, site, aggregate, &child, true)? {
                                self.unknown_element(desc.name(), &child)?;
                            }
                        }
                        XmlToken::Text(text) => self.stray_text(desc.name(), &text)?,
                        XmlToken::End(_) => break,
                        XmlToken::Eof => return Err(self.unexpected_eof()),
                    }
                }
                let Pending {
                    items, mut entries, key, ..
                } = match pending.pop() {
                    Some(p) => p,
                    None => Pending {
                        member,
                        items: Vec::new(),
                        entries: Vec::new(),
                        key: None,
                    },
                };
                if let Some(key) = key {
                    entries.push((key, Value::Null));
                }
                Ok(match desc.kind() {
                    TypeKind::Map => Value::Map(entries),
                    _ => Value::List(items),
                })
            }
            _ => {
                let mut obj = desc.instantiate().ok_or_else(|| ReadError::MissingConstructor {
                    type_name: desc.name().clone(),
                    location: start.position.into(),
                })?;
                self.read_interior(start, desc, &mut obj, member, exclude)?;
                Ok(Value::Object(obj))
            }
        }
    }

    /// Fills an instance from the attributes and children of its element.
    /// `holder` is the member the instance is read into, if any.
    fn read_interior(
        &mut self,
        start: &StartElement,
        desc: &'m TypeDescriptor,
        obj: &mut Object,
        holder: Option<&'m MemberDescriptor>,
        exclude: Option<&Tag>,
    ) -> Result<()> {
        let mappings = self.mappings;
        let options = mappings.options();

        for attr in start.attributes.iter().filter(|a| !is_reserved(a, exclude)) {
            match desc.find_attribute(&attr.name) {
                Some(member) => {
                    let value = self.attribute_value(member, &attr.value, start)?;
                    obj.set(member.name(), value);
                }
                None => self.unknown_attribute(desc.name(), attr, start)?,
            }
        }

        let mut text: Option<String> = None;
        // `<a></a>` carries an empty text member, `<a/>` none.
        let mut bare = !start.self_closing;
        let mut pending: Vec<Pending<'m>> = Vec::new();
        loop {
            match self.source.next_token()? {
                XmlToken::Start(child) => {
                    bare = false;
                    self.read_child(desc, obj, holder, &child, &mut pending)?
                }
                XmlToken::Text(t) => {
                    if desc.text().is_some() {
                        text.get_or_insert_with(String::new).push_str(&t);
                    } else {
                        self.stray_text(desc.name(), &t)?;
                    }
                }
                XmlToken::End(_) => break,
                XmlToken::Eof => return Err(self.unexpected_eof()),
            }
        }

        let text = text.or_else(|| bare.then(String::new));
        if let (Some(member), Some(text)) = (desc.text(), text) {
            let ty = mappings.get(member.value_type());
            let value = convert::from_text(&text, member.converter(), ty, options)
                .map_err(|err| err.at(start.position))?;
            obj.set(member.name(), value);
        }

        for p in pending {
            let mut entries = p.entries;
            if let Some(key) = p.key {
                entries.push((key, Value::Null));
            }
            match p.member {
                Some(member) => {
                    let value = self.materialize(start, member, p.items, entries)?;
                    assign(obj, member, value);
                }
                None => match desc.aggregate() {
                    Some(AggregateDescriptor::Dictionary(_)) => {
                        obj.set_aggregate(Aggregate::Entries(entries))
                    }
                    _ => obj.set_aggregate(Aggregate::Items(p.items)),
                },
            }
        }
        Ok(())
    }

    fn read_child(
        &mut self,
        desc: &'m TypeDescriptor,
        obj: &mut Object,
        holder: Option<&'m MemberDescriptor>,
        child: &StartElement,
        pending: &mut Vec<Pending<'m>>,
    ) -> Result<()> {
        let mappings = self.mappings;

        if let Some(member) = desc.find_element(&child.tag) {
            let value = if member.is_reference() {
                self.read_reference(child)?
            } else {
                self.read_element(child, member.value_type(), Some(member), None)?
            };
            assign(obj, member, value);
            return Ok(());
        }

        let flattened = || {
            desc.elements().iter().filter(|m| {
                matches!(
                    m.role(),
                    MemberRole::CollectionElement | MemberRole::DictionaryElement
                )
            })
        };
        for global in [false, true] {
            for member in flattened() {
                if let Some(aggregate) = mappings.get(member.value_type()).aggregate() {
                    if self.read_item(pending, Site::Member(member), aggregate, child, global)? {
                        return Ok(());
                    }
                }
            }
        }

        if let Some(member) = desc.content() {
            let content = mappings.get(member.value_type());
            match (content.kind(), content.aggregate()) {
                (TypeKind::List | TypeKind::Map, Some(aggregate)) => {
                    if self.read_item(pending, Site::Member(member), aggregate, child, true)? {
                        return Ok(());
                    }
                }
                _ => {
                    if let Some(ty) = self.match_type(&child.tag, member.value_type(), true) {
                        let value = self.read_element(child, ty, Some(member), None)?;
                        assign(obj, member, value);
                        return Ok(());
                    }
                }
            }
        }

        if let Some(aggregate) = desc.aggregate() {
            if self.read_item(pending, Site::Own(holder), aggregate, child, true)? {
                return Ok(());
            }
        }

        self.unknown_element(desc.name(), child)
    }

    /// Reads `child` as the next item of an aggregate. Returns false without
    /// consuming anything when the tag does not belong to it.
    fn read_item(
        &mut self,
        pending: &mut Vec<Pending<'m>>,
        site: Site<'m>,
        aggregate: &'m AggregateDescriptor,
        child: &StartElement,
        global: bool,
    ) -> Result<bool> {
        let mappings = self.mappings;
        let member = site.target();
        let member_tags = site.holder().map(MemberDescriptor::item_tags);
        match aggregate {
            AggregateDescriptor::Collection(c) => {
                let tags = &c.item_tags;
                let Some(ty) = self.match_item(&child.tag, member_tags, tags, c.item, global) else {
                    return Ok(false);
                };
                let value = if c.by_reference {
                    self.read_reference(child)?
                } else {
                    self.read_element(child, ty, None, None)?
                };
                slot(pending, member).items.push(value);
            }
            AggregateDescriptor::Dictionary(d) => {
                let key_desc = mappings.get(d.key);
                if !key_desc.is_simple() && slot(pending, member).key.is_none() {
                    let Some(key_type) = self.match_type(&child.tag, d.key, global) else {
                        return Ok(false);
                    };
                    let key = self.read_element(child, key_type, None, None)?;
                    slot(pending, member).key = Some(key);
                    return Ok(true);
                }
                let (tags, item) = (&d.item_tags, d.value);
                let Some(ty) = self.match_item(&child.tag, member_tags, tags, item, global) else {
                    return Ok(false);
                };
                let mut exclude = None;
                let key = if key_desc.is_simple() {
                    let attribute = Tag::unqualified(
                        site.holder()
                            .and_then(MemberDescriptor::key_attribute)
                            .unwrap_or(d.key_attribute.as_str()),
                    );
                    let text = child.attribute(&attribute).ok_or_else(|| {
                        ConversionError::new(
                            "",
                            key_desc.name().to_string(),
                            format!("missing key attribute '{}'", attribute),
                        )
                        .at(child.position)
                    })?;
                    let key = convert::from_text(text, None, key_desc, mappings.options())
                        .map_err(|err| err.at(child.position))?;
                    exclude = Some(attribute);
                    key
                } else {
                    slot(pending, member).key.take().unwrap_or(Value::Null)
                };
                let value = if d.by_reference {
                    self.read_reference(child)?
                } else {
                    self.read_element(child, ty, None, exclude.as_ref())?
                };
                slot(pending, member).entries.push((key, value));
            }
        }
        Ok(true)
    }

    /// Item type for a tag: member table, aggregate table, the declared item
    /// type's own tag, then (when `global`) any assignable registered type.
    fn match_item(
        &self,
        tag: &Tag,
        member_tags: Option<&ItemTagTable>,
        tags: &ItemTagTable,
        item: TypeHandle,
        global: bool,
    ) -> Option<TypeHandle> {
        member_tags
            .and_then(|t| t.type_for(tag))
            .or_else(|| tags.type_for(tag))
            .or_else(|| self.match_type(tag, item, global))
    }

    fn match_type(&self, tag: &Tag, expected: TypeHandle, global: bool) -> Option<TypeHandle> {
        if self.mappings.get(expected).tag() == tag {
            return Some(expected);
        }
        if !global {
            return None;
        }
        self.mappings
            .resolve_tag(tag)
            .filter(|&ty| self.mappings.is_assignable(ty, expected))
    }

    /// Builds the value of an aggregate member from the collected items.
    fn materialize(
        &self,
        start: &StartElement,
        member: &MemberDescriptor,
        items: Vec<Value>,
        entries: Vec<(Value, Value)>,
    ) -> Result<Value> {
        let desc = self.mappings.get(member.value_type());
        match desc.kind() {
            TypeKind::List => Ok(Value::List(items)),
            TypeKind::Map => Ok(Value::Map(entries)),
            _ => {
                let mut obj = desc.instantiate().ok_or_else(|| ReadError::MissingConstructor {
                    type_name: desc.name().clone(),
                    location: start.position.into(),
                })?;
                match desc.aggregate() {
                    Some(AggregateDescriptor::Dictionary(_)) => {
                        obj.set_aggregate(Aggregate::Entries(entries))
                    }
                    _ => obj.set_aggregate(Aggregate::Items(items)),
                }
                Ok(Value::Object(obj))
            }
        }
    }

    fn attribute_value(
        &self,
        member: &MemberDescriptor,
        text: &str,
        start: &StartElement,
    ) -> Result<Value> {
        if member.is_reference() {
            let id = escape::unescape(text).map_err(|err| err.at(start.position))?;
            return Ok(Value::Ref(id.into_owned()));
        }
        let ty = self.mappings.get(member.value_type());
        convert::from_text(text, member.converter(), ty, self.mappings.options())
            .map_err(|err| err.at(start.position).into())
    }

    /// Reads the identifier text of a reference-only element.
    fn read_reference(&mut self, start: &StartElement) -> Result<Value> {
        if self.mappings.options().nil_markers && start.is_nil() {
            self.source.skip_subtree()?;
            return Ok(Value::Null);
        }
        let text = self.read_text(&QualifiedName::local(start.tag.local()))?;
        let id = escape::unescape(&text).map_err(|err| err.at(start.position))?;
        Ok(Value::Ref(id.into_owned()))
    }

    /// Collects text up to the end tag, applying the unknown-element policy
    /// to child elements.
    fn read_text(&mut self, owner: &QualifiedName) -> Result<String> {
        let mut text = String::new();
        loop {
            match self.source.next_token()? {
                XmlToken::Text(t) => text.push_str(&t),
                XmlToken::Start(child) => self.unknown_element(owner, &child)?,
                XmlToken::End(_) => return Ok(text),
                XmlToken::Eof => return Err(self.unexpected_eof()),
            }
        }
    }

    /// Skips whatever a stream converter left unread.
    fn finish_element(&mut self) -> Result<()> {
        loop {
            match self.source.next_token()? {
                XmlToken::End(_) => return Ok(()),
                XmlToken::Start(child) => {
                    tracing::trace!(tag = %child.tag, "skipping element left by converter");
                    self.source.skip_subtree()?;
                }
                XmlToken::Text(_) => {}
                XmlToken::Eof => return Err(self.unexpected_eof()),
            }
        }
    }

    fn stray_text(&self, owner: &QualifiedName, text: &str) -> Result<()> {
        if utils::is_whitespace(text) {
            return Ok(());
        }
        if self.mappings.options().ignore_unknown {
            tracing::warn!(owner = %owner, "text content ignored");
            return Ok(());
        }
        Err(ReadError::UnexpectedText {
            owner: owner.clone(),
            location: self.source.position().into(),
        }
        .into())
    }

    /// Applies the unknown-attribute policy to every attribute of an element
    /// whose type has no attribute members.
    fn unmatched_attributes(
        &mut self,
        owner: &QualifiedName,
        start: &StartElement,
        exclude: Option<&Tag>,
    ) -> Result<()> {
        for attr in start.attributes.iter().filter(|a| !is_reserved(a, exclude)) {
            self.unknown_attribute(owner, attr, start)?;
        }
        Ok(())
    }

    fn unknown_attribute(
        &mut self,
        owner: &QualifiedName,
        attribute: &XmlAttribute,
        start: &StartElement,
    ) -> Result<()> {
        let action = match self.handler.as_mut() {
            Some(handler) => handler.handle(UnknownMember::Attribute { owner, attribute }),
            None if self.mappings.options().ignore_unknown => UnknownAction::Skip,
            None => UnknownAction::Fail,
        };
        match action {
            UnknownAction::Skip => {
                tracing::trace!(
                    owner = %owner,
                    attribute = %attribute.name,
                    "unknown attribute skipped"
                );
                Ok(())
            }
            UnknownAction::Fail => Err(ReadError::UnknownAttribute {
                owner: owner.clone(),
                name: attribute.name.clone(),
                location: start.position.into(),
            }
            .into()),
        }
    }

    fn unknown_element(&mut self, owner: &QualifiedName, element: &StartElement) -> Result<()> {
        let action = match self.handler.as_mut() {
            Some(handler) => handler.handle(UnknownMember::Element { owner, element }),
            None if self.mappings.options().ignore_unknown => {
                tracing::warn!(owner = %owner, tag = %element.tag, "unknown element skipped");
                UnknownAction::Skip
            }
            None => UnknownAction::Fail,
        };
        match action {
            UnknownAction::Skip => self.source.skip_subtree(),
            UnknownAction::Fail => Err(ReadError::UnknownElement {
                owner: owner.clone(),
                tag: element.tag.clone(),
                location: element.position.into(),
            }
            .into()),
        }
    }

    fn check_assignable(
        &self,
        start: &StartElement,
        actual: TypeHandle,
        expected: TypeHandle,
    ) -> Result<()> {
        if self.mappings.is_assignable(actual, expected) {
            return Ok(());
        }
        Err(ReadError::TypeMismatch {
            element: start.tag.clone(),
            expected: self.mappings.get(expected).name().clone(),
            actual: self.mappings.get(actual).name().clone(),
            location: start.position.into(),
        }
        .into())
    }

    fn unexpected_eof(&self) -> MapError {
        ReadError::UnexpectedEof {
            location: self.source.position().into(),
        }
        .into()
    }
}

impl Mappings {
    /// Starts a reader over an in-memory document.
    pub fn reader<'a>(&'a self, xml: &'a str) -> ObjectReader<'a, QuickXmlSource<'a>> {
        ObjectReader::new(self, QuickXmlSource::new(xml))
    }

    pub fn from_xml_str(&self, xml: &str) -> Result<Value> {
        self.reader(xml).read()
    }

    /// Reads a whole document from an I/O source.
    pub fn read_from<R: Read>(&self, mut input: R) -> Result<Value> {
        let mut xml = String::new();
        input.read_to_string(&mut xml)?;
        self.from_xml_str(&xml)
    }
}
