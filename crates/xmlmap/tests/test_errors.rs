use xmlmap::error::Position;
use xmlmap::{
    DictionaryDecl, ItemTag, MapError, Mapper, MapperOptions, Mappings, MemberDecl, Object,
    ReadError, RegistrationError, Result, Schema, SimpleType, TypeDecl, TypeRef, UnknownAction,
    UnknownMember, Value, WriteError,
};

fn contact_schema() -> Schema {
    let mut schema = Schema::new();
    schema.declare(
        TypeDecl::object("Crm.Contact")
            .default_constructor()
            .attribute("Id", SimpleType::I32)
            .element("Name", SimpleType::String)
            .element("Email", SimpleType::String),
    );
    schema
}

fn contact_mappings(options: MapperOptions) -> Result<Mappings> {
    let mut mapper = Mapper::new(contact_schema(), options);
    mapper.register("Crm.Contact")?;
    Ok(mapper.seal())
}

const WITH_UNKNOWN: &str = concat!(
    "<Contact Id=\"4\">\n",
    "  <Name>Ann</Name>\n",
    "  <Fax><Number>123</Number></Fax>\n",
    "  <Email>ann@example.com</Email>\n",
    "</Contact>"
);

#[test]
fn test_unknown_element_is_fatal_by_default() -> Result<()> {
    let mappings = contact_mappings(MapperOptions::default())?;
    let err = mappings.from_xml_str(WITH_UNKNOWN).unwrap_err();
    assert_eq!(
        err.to_string(),
        "unknown element 'Fax' in 'Crm.Contact' at line 3, column 3"
    );
    assert_eq!(err.position(), Some(Position { line: 3, column: 3 }));
    Ok(())
}

#[test]
fn test_unknown_element_is_skipped_when_ignored() -> Result<()> {
    let mappings = contact_mappings(MapperOptions::default().with_ignore_unknown(true))?;
    let value = mappings.from_xml_str(WITH_UNKNOWN)?;
    let expected = Object::new("Crm.Contact")
        .with("Id", 4)
        .with("Name", "Ann")
        .with("Email", "ann@example.com");
    assert_eq!(value, Value::Object(expected));
    Ok(())
}

#[test]
fn test_callback_can_skip_or_fail() -> Result<()> {
    let mappings = contact_mappings(MapperOptions::default())?;
    let mut skipped = Vec::new();
    let value = mappings
        .reader(WITH_UNKNOWN)
        .with_unknown_handler(|member: UnknownMember<'_>| {
            if let UnknownMember::Element { owner, element } = member {
                skipped.push(format!("{}/{}", owner, element.tag));
            }
            UnknownAction::Skip
        })
        .read()?;
    assert_eq!(skipped, vec!["Crm.Contact/Fax"]);
    assert!(value.as_object().is_some_and(|o| o.contains("Email")));

    // The callback wins over the ignore option.
    let tolerant = contact_mappings(MapperOptions::default().with_ignore_unknown(true))?;
    let err = tolerant
        .reader(r#"<Contact Id="4" Nick="a"/>"#)
        .with_unknown_handler(|_: UnknownMember<'_>| UnknownAction::Fail)
        .read()
        .unwrap_err();
    assert!(matches!(
        err,
        MapError::Read(ReadError::UnknownAttribute { ref name, .. }) if name.local() == "Nick"
    ));
    Ok(())
}

#[test]
fn test_conversion_error_names_value_and_type() -> Result<()> {
    let mappings = contact_mappings(MapperOptions::default())?;
    let err = mappings
        .from_xml_str("<Contact Id=\"four\"/>")
        .unwrap_err();
    match &err {
        MapError::Conversion(conversion) => {
            assert_eq!(conversion.text, "four");
            assert_eq!(conversion.expected, "Int32");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.position(), Some(Position { line: 1, column: 1 }));
    Ok(())
}

#[test]
fn test_malformed_document_is_a_syntax_error() -> Result<()> {
    let mappings = contact_mappings(MapperOptions::default())?;
    let err = mappings
        .from_xml_str("<Contact>\n<Name>Ann</Contact>")
        .unwrap_err();
    assert!(matches!(err, MapError::Syntax { .. }), "unexpected error: {err}");
    assert!(err.position().is_some());

    let err = mappings.from_xml_str("<Contact><Name>Ann</Name>").unwrap_err();
    assert!(matches!(
        err,
        MapError::Read(ReadError::UnexpectedEof { .. }) | MapError::Syntax { .. }
    ));
    Ok(())
}

#[test]
fn test_registration_errors() {
    let mut schema = Schema::new();
    schema
        .declare(TypeDecl::object("Crm.NoCtor").attribute("X", SimpleType::I32))
        .declare(
            TypeDecl::object("Crm.BadItems")
                .default_constructor()
                .dictionary(
                    DictionaryDecl::of(SimpleType::String, SimpleType::I32)
                        .item(ItemTag::default()),
                ),
        )
        .declare(
            TypeDecl::object("Crm.Point")
                .default_constructor()
                .attribute("X", SimpleType::I32),
        )
        .declare(
            TypeDecl::object("Crm.ComplexKey")
                .default_constructor()
                .member(
                    MemberDecl::dictionary_element(
                        "Map",
                        TypeRef::map("Crm.Point", SimpleType::I32),
                    )
                    .key_attribute("K"),
                ),
        );
    let mut mapper = Mapper::new(schema, MapperOptions::default());

    let err = mapper.register("Crm.NoCtor").unwrap_err();
    assert!(matches!(
        err,
        MapError::Registration(RegistrationError::MissingConstructor { .. })
    ));
    assert_eq!(
        err.to_string(),
        "type 'Crm.NoCtor' requires a default constructor to be deserializable"
    );

    for name in ["Crm.BadItems", "Crm.ComplexKey"] {
        let err = mapper.register(name).unwrap_err();
        assert!(
            matches!(
                err,
                MapError::Registration(RegistrationError::InvalidConfiguration { .. })
            ),
            "unexpected error for {name}: {err}"
        );
    }
}

#[test]
fn test_write_errors() -> Result<()> {
    let mappings = contact_mappings(MapperOptions::default())?;

    let err = mappings
        .to_xml_string(&Object::new("Crm.Unknown").into())
        .unwrap_err();
    assert!(matches!(err, MapError::Write(WriteError::Unregistered { .. })));
    assert_eq!(err.to_string(), "no type is registered for 'Crm.Unknown'");

    let contact: Value = Object::new("Crm.Contact").with("Id", "four").into();
    let err = mappings.to_xml_string(&contact).unwrap_err();
    assert!(matches!(
        err,
        MapError::Write(WriteError::TypeMismatch { ref member, .. }) if member == "Id"
    ));

    let err = mappings.to_xml_string(&Value::Null).unwrap_err();
    assert!(matches!(err, MapError::Write(WriteError::ShapeMismatch { .. })));
    Ok(())
}
