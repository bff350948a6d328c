//! Write engine.
//!
//! [`ObjectWriter`] walks a [`Value`] graph depth-first and drives an
//! [`XmlSink`] from the descriptors in [`Mappings`]. Per object it emits, in
//! order: attribute members, the text member, element members, the content
//! member, and finally the items of the type's own collection or dictionary
//! shape.

use std::io::Write;

use crate::convert;
use crate::descriptor::{
    AggregateDescriptor, CollectionDescriptor, DictionaryDescriptor, ItemTagTable,
    MemberDescriptor, TypeDescriptor, TypeHandle, TypeKind,
};
use crate::error::{MapError, Result, WriteError};
use crate::mapper::Mappings;
use crate::name::Tag;
use crate::schema::MemberRole;
use crate::utils::XSI_NAMESPACE;
use crate::value::{Object, Value};
use crate::xml::{QuickXmlSink, XmlSink};

static NULL: Value = Value::Null;

const ROOT: &str = "(root)";

/// Writes object graphs to one sink.
pub struct ObjectWriter<'m, S: XmlSink> {
    mappings: &'m Mappings,
    sink: S,
}

impl<'m, S: XmlSink> ObjectWriter<'m, S> {
    pub fn new(mappings: &'m Mappings, sink: S) -> Self {
        Self { mappings, sink }
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_inner(self) -> S {
        self.sink
    }

    /// Writes a value as the document root, tagged with its runtime type.
    pub fn write(&mut self, value: &Value) -> Result<()> {
        self.write_as(value, self.mappings.any())
    }

    /// Writes a value as the document root. Anonymous lists and maps take
    /// the tag of `expected`; other values must be assignable to it.
    pub fn write_as(&mut self, value: &Value, expected: TypeHandle) -> Result<()> {
        let mappings = self.mappings;
        if value.is_null() {
            return Err(WriteError::ShapeMismatch {
                member: ROOT.to_string(),
                expected: mappings.get(expected).name().clone(),
                kind: value.kind(),
            }
            .into());
        }
        let ty = self.runtime_type(ROOT, value, expected)?;
        let desc = mappings.get(ty);
        tracing::debug!(type_name = %desc.name(), "writing document");
        self.sink.declare_namespaces(&mappings.root_declarations());
        self.write_tagged(ROOT, desc.tag(), None, value, ty, ty)?;
        self.sink.flush()
    }

    /// Writes the members and items of an object without an enclosing tag,
    /// for objects embedded in content produced elsewhere.
    pub fn write_interior(&mut self, obj: &Object) -> Result<()> {
        let mappings = self.mappings;
        let ty = mappings
            .lookup(&obj.type_name().clone().into())
            .ok_or_else(|| WriteError::Unregistered {
                type_name: obj.type_name().to_string(),
            })?;
        self.write_object(obj, mappings.get(ty), None)
    }

    /// `holder` is the member holding `obj`; its item tags take precedence
    /// for the items of the type's own collection or dictionary shape.
    fn write_object(
        &mut self,
        obj: &Object,
        desc: &'m TypeDescriptor,
        holder: Option<&'m MemberDescriptor>,
    ) -> Result<()> {
        for member in desc.attributes() {
            let value = obj.get(member.name()).unwrap_or(&NULL);
            if value.is_null() || !member.should_write(obj, value) {
                continue;
            }
            let text = if member.is_reference() {
                self.identity(member, value)?
            } else {
                self.member_text(member, value)?
            };
            self.sink.attribute(member.tag(), &text)?;
        }

        if let Some(member) = desc.text() {
            let value = obj.get(member.name()).unwrap_or(&NULL);
            if !value.is_null() && member.should_write(obj, value) {
                let text = self.member_text(member, value)?;
                self.sink.text(&text)?;
            }
        }

        for member in desc.elements() {
            self.write_member(obj, member)?;
        }

        if let Some(member) = desc.content() {
            let value = obj.get(member.name()).unwrap_or(&NULL);
            if !value.is_null() && member.should_write(obj, value) {
                self.write_content(member, value)?;
            }
        }

        let context = desc.name().to_string();
        match desc.aggregate() {
            Some(AggregateDescriptor::Collection(c)) => {
                self.write_items(&context, obj.items(), c, holder)?
            }
            Some(AggregateDescriptor::Dictionary(d)) => {
                self.write_entries(&context, obj.entries(), d, holder)?
            }
            None => {}
        }
        Ok(())
    }

    fn write_member(&mut self, obj: &Object, member: &'m MemberDescriptor) -> Result<()> {
        let value = obj.get(member.name()).unwrap_or(&NULL);
        if !member.should_write(obj, value) {
            tracing::trace!(member = member.name(), "member suppressed");
            return Ok(());
        }
        if value.is_null() {
            if member.is_nullable()
                && member.role() == MemberRole::Element
                && self.mappings.options().nil_markers
            {
                self.write_nil(member.tag())?;
            }
            return Ok(());
        }
        match member.role() {
            MemberRole::CollectionElement | MemberRole::DictionaryElement => {
                self.write_flattened(member, value)
            }
            _ if member.is_reference() => {
                let id = self.identity(member, value)?;
                self.sink.start_element(member.tag())?;
                self.sink.text(&id)?;
                self.sink.end_element()
            }
            _ => {
                let declared = member.value_type();
                let actual = self.runtime_type(member.name(), value, declared)?;
                let tag = member.tag();
                self.write_tagged(member.name(), tag, Some(member), value, declared, actual)
            }
        }
    }

    /// Items of a collection or dictionary member, directly under the owner.
    fn write_flattened(&mut self, member: &'m MemberDescriptor, value: &Value) -> Result<()> {
        let mappings = self.mappings;
        let declared = member.value_type();
        let actual = self.runtime_type(member.name(), value, declared)?;
        let desc = mappings.get(actual);
        match (desc.aggregate(), value) {
            (Some(AggregateDescriptor::Collection(c)), Value::List(items)) => {
                self.write_items(member.name(), items, c, Some(member))
            }
            (Some(AggregateDescriptor::Collection(c)), Value::Object(obj)) => {
                self.write_items(member.name(), obj.items(), c, Some(member))
            }
            (Some(AggregateDescriptor::Dictionary(d)), Value::Map(entries)) => {
                self.write_entries(member.name(), entries, d, Some(member))
            }
            (Some(AggregateDescriptor::Dictionary(d)), Value::Object(obj)) => {
                self.write_entries(member.name(), obj.entries(), d, Some(member))
            }
            _ => Err(self.shape_mismatch(member.name(), declared, value)),
        }
    }

    /// Content is written as child elements tagged by runtime type: one per
    /// item for list and map values, a single one otherwise.
    fn write_content(&mut self, member: &'m MemberDescriptor, value: &Value) -> Result<()> {
        let mappings = self.mappings;
        let declared = member.value_type();
        let desc = mappings.get(declared);
        match (desc.kind(), desc.aggregate(), value) {
            (TypeKind::List, Some(AggregateDescriptor::Collection(c)), Value::List(items)) => {
                self.write_items(member.name(), items, c, Some(member))
            }
            (TypeKind::Map, Some(AggregateDescriptor::Dictionary(d)), Value::Map(entries)) => {
                self.write_entries(member.name(), entries, d, Some(member))
            }
            _ => {
                let actual = self.runtime_type(member.name(), value, declared)?;
                let tag = mappings.get(actual).tag();
                self.write_tagged(member.name(), tag, Some(member), value, actual, actual)
            }
        }
    }

    fn write_items(
        &mut self,
        context: &str,
        items: &[Value],
        c: &'m CollectionDescriptor,
        member: Option<&'m MemberDescriptor>,
    ) -> Result<()> {
        for item in items {
            if item.is_null() {
                let tag = self.item_tag(c.item, member, &c.item_tags);
                if self.mappings.options().nil_markers {
                    self.write_nil(&tag)?;
                }
                continue;
            }
            let actual = self.runtime_type(context, item, c.item)?;
            let tag = self.item_tag(actual, member, &c.item_tags);
            if c.by_reference {
                let id = self.identity_of(context, item, actual)?;
                self.sink.start_element(&tag)?;
                self.sink.text(&id)?;
                self.sink.end_element()?;
            } else {
                self.write_tagged(context, &tag, None, item, actual, actual)?;
            }
        }
        Ok(())
    }

    fn write_entries(
        &mut self,
        context: &str,
        entries: &[(Value, Value)],
        d: &'m DictionaryDescriptor,
        member: Option<&'m MemberDescriptor>,
    ) -> Result<()> {
        let mappings = self.mappings;
        let options = mappings.options();
        let simple_key = mappings.get(d.key).is_simple();
        let key_attribute = Tag::unqualified(
            member
                .and_then(MemberDescriptor::key_attribute)
                .unwrap_or(d.key_attribute.as_str()),
        );

        for (key, value) in entries {
            let key_type = self.runtime_type(context, key, d.key)?;
            let value_type = self.runtime_type(context, value, d.value)?;
            let tag = self.item_tag(value_type, member, &d.item_tags);

            if !simple_key {
                let key_tag = mappings.get(key_type).tag();
                self.write_tagged(context, key_tag, None, key, key_type, key_type)?;
            }

            self.sink.start_element(&tag)?;
            if simple_key {
                let text = convert::to_text(key, None, mappings.get(key_type), options)?;
                self.sink.attribute(&key_attribute, &text)?;
            }
            if value.is_null() {
                if options.nil_markers {
                    self.sink.attribute(&xsi("nil"), "true")?;
                }
            } else if d.by_reference {
                let id = self.identity_of(context, value, value_type)?;
                self.sink.text(&id)?;
            } else {
                self.write_body(context, None, value, value_type)?;
            }
            self.sink.end_element()?;
        }
        Ok(())
    }

    fn write_tagged(
        &mut self,
        context: &str,
        tag: &Tag,
        member: Option<&'m MemberDescriptor>,
        value: &Value,
        declared: TypeHandle,
        actual: TypeHandle,
    ) -> Result<()> {
        self.sink.start_element(tag)?;
        if actual != declared {
            let qname = self.sink.qualify(self.mappings.get(actual).tag())?;
            self.sink.attribute(&xsi("type"), &qname)?;
        }
        self.write_body(context, member, value, actual)?;
        self.sink.end_element()
    }

    fn write_body(
        &mut self,
        context: &str,
        member: Option<&'m MemberDescriptor>,
        value: &Value,
        ty: TypeHandle,
    ) -> Result<()> {
        let mappings = self.mappings;
        let desc = mappings.get(ty);
        let converter = member.and_then(MemberDescriptor::converter);
        if let Some(stream) = convert::stream_converter(converter, desc) {
            return stream.write(value, &mut self.sink);
        }
        if let Some(text) = convert::text_converter(converter, desc) {
            let text = text.to_text(value)?;
            return self.sink.text(&text);
        }
        match value {
            Value::Null => Ok(()),
            Value::Scalar(_) | Value::Ref(_) => {
                let text = convert::to_text(value, None, desc, mappings.options())?;
                self.sink.text(&text)
            }
            Value::Object(obj) if desc.kind() == &TypeKind::Object => {
                self.write_object(obj, desc, member)
            }
            Value::List(items) => match desc.aggregate() {
                Some(AggregateDescriptor::Collection(c)) => {
                    self.write_items(context, items, c, member)
                }
                _ => Err(self.shape_mismatch(context, ty, value)),
            },
            Value::Map(entries) => match desc.aggregate() {
                Some(AggregateDescriptor::Dictionary(d)) => {
                    self.write_entries(context, entries, d, member)
                }
                _ => Err(self.shape_mismatch(context, ty, value)),
            },
            Value::Object(_) => Err(self.shape_mismatch(context, ty, value)),
        }
    }

    fn write_nil(&mut self, tag: &Tag) -> Result<()> {
        self.sink.start_element(tag)?;
        self.sink.attribute(&xsi("nil"), "true")?;
        self.sink.end_element()
    }

    /// Tag of an item: the member's table, then the aggregate's table, then
    /// the item type's own tag.
    fn item_tag(
        &self,
        ty: TypeHandle,
        member: Option<&MemberDescriptor>,
        table: &'m ItemTagTable,
    ) -> Tag {
        member
            .and_then(|m| m.item_tags().tag_for(ty))
            .or_else(|| table.tag_for(ty))
            .unwrap_or_else(|| self.mappings.get(ty).tag())
            .clone()
    }

    /// Text form of an attribute or text member, checked against the
    /// declared type unless a converter takes over.
    fn member_text(&self, member: &MemberDescriptor, value: &Value) -> Result<String> {
        let mappings = self.mappings;
        let options = mappings.options();
        let declared = mappings.get(member.value_type());
        if convert::text_converter(member.converter(), declared).is_some() {
            return Ok(convert::to_text(value, member.converter(), declared, options)?);
        }
        let actual = self.runtime_type(member.name(), value, member.value_type())?;
        Ok(convert::to_text(value, None, mappings.get(actual), options)?)
    }

    /// Identity text written for a reference-only member.
    fn identity(&self, member: &MemberDescriptor, value: &Value) -> Result<String> {
        let actual = self.runtime_type(member.name(), value, member.value_type())?;
        if let Value::Scalar(_) = value {
            let desc = self.mappings.get(actual);
            return Ok(convert::to_text(value, member.converter(), desc, self.mappings.options())?);
        }
        self.identity_of(member.name(), value, actual)
    }

    fn identity_of(&self, context: &str, value: &Value, ty: TypeHandle) -> Result<String> {
        let options = self.mappings.options();
        let desc = self.mappings.get(ty);
        match value {
            Value::Ref(_) | Value::Scalar(_) => Ok(convert::to_text(value, None, desc, options)?),
            Value::Object(obj) => {
                let id = desc
                    .id_member()
                    .and_then(|name| desc.member(name))
                    .ok_or_else(|| WriteError::MissingIdentifier {
                        member: context.to_string(),
                        type_name: desc.name().clone(),
                    })?;
                let id_value = obj.get(id.name()).unwrap_or(&NULL);
                let id_type = self.mappings.get(id.value_type());
                Ok(convert::to_text(id_value, id.converter(), id_type, options)?)
            }
            _ => Err(self.shape_mismatch(context, ty, value)),
        }
    }

    /// Runtime type of a value, checked against the declared type.
    fn runtime_type(
        &self,
        context: &str,
        value: &Value,
        declared: TypeHandle,
    ) -> Result<TypeHandle> {
        let actual = match self.mappings.type_of(value, declared) {
            Some(actual) => actual,
            None => {
                return Err(match value {
                    Value::Object(obj) => WriteError::Unregistered {
                        type_name: obj.type_name().to_string(),
                    }
                    .into(),
                    Value::Scalar(crate::value::Scalar::Enum(e)) => WriteError::Unregistered {
                        type_name: e.type_name.to_string(),
                    }
                    .into(),
                    _ => self.shape_mismatch(context, declared, value),
                });
            }
        };
        if !self.mappings.is_assignable(actual, declared) {
            return Err(WriteError::TypeMismatch {
                member: context.to_string(),
                expected: self.mappings.get(declared).name().clone(),
                actual: self.mappings.get(actual).name().clone(),
            }
            .into());
        }
        Ok(actual)
    }

    fn shape_mismatch(&self, context: &str, expected: TypeHandle, value: &Value) -> MapError {
        WriteError::ShapeMismatch {
            member: context.to_string(),
            expected: self.mappings.get(expected).name().clone(),
            kind: value.kind(),
        }
        .into()
    }
}

fn xsi(local: &str) -> Tag {
    Tag::new(Some(XSI_NAMESPACE), local)
}

impl Mappings {
    /// Starts a writer over an I/O sink, honoring the indent and declaration
    /// options.
    pub fn writer<W: Write>(&self, inner: W) -> ObjectWriter<'_, QuickXmlSink<W>> {
        let options = self.options();
        ObjectWriter::new(
            self,
            QuickXmlSink::with_options(inner, options.indent, options.xml_declaration),
        )
    }

    pub fn write_to<W: Write>(&self, inner: W, value: &Value) -> Result<()> {
        self.writer(inner).write(value)
    }

    pub fn to_xml_string(&self, value: &Value) -> Result<String> {
        self.render(value, self.any())
    }

    pub(crate) fn render(&self, value: &Value, expected: TypeHandle) -> Result<String> {
        let mut writer = self.writer(Vec::new());
        writer.write_as(value, expected)?;
        String::from_utf8(writer.into_inner().into_inner())
            .map_err(|err| MapError::syntax(err, None))
    }
}
