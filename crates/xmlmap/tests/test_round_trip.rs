use chrono::DateTime;
use rust_decimal_macros::dec;
use xmlmap::{
    EnumValue, Mapper, MapperOptions, Mappings, MemberDecl, Object, Result, Schema, SimpleType,
    TypeDecl, TypeRef, Value,
};

fn person_mappings() -> Result<Mappings> {
    let mut schema = Schema::new();
    schema.declare(
        TypeDecl::object("Acme.Person")
            .default_constructor()
            .member(MemberDecl::attribute("Id", SimpleType::I32).default_value(0))
            .element("Tags", TypeRef::list(SimpleType::String)),
    );
    let mut mapper = Mapper::new(schema, MapperOptions::default());
    mapper.register("Acme.Person")?;
    Ok(mapper.seal())
}

fn shop_mappings(options: MapperOptions) -> Result<Mappings> {
    let mut schema = Schema::new();
    schema
        .declare(TypeDecl::enumeration("Shop.Status", ["Open", "Shipped"]))
        .declare(
            TypeDecl::object("Shop.Line")
                .default_constructor()
                .attribute("Sku", SimpleType::String)
                .attribute("Qty", SimpleType::I32),
        )
        .declare(
            TypeDecl::object("Shop.Order")
                .default_constructor()
                .attribute("Id", SimpleType::I64)
                .member(
                    MemberDecl::attribute("Status", "Shop.Status")
                        .default_value(EnumValue::new("Shop.Status", "Open")),
                )
                .element("Customer", SimpleType::String)
                .element("Placed", SimpleType::DateTime)
                .member(MemberDecl::collection_element("Line", TypeRef::list("Shop.Line")))
                .element("Total", SimpleType::Decimal),
        );
    let mut mapper = Mapper::new(schema, options);
    mapper.register("Shop.Order")?;
    Ok(mapper.seal())
}

fn line(sku: &str, qty: i32) -> Value {
    Object::new("Shop.Line").with("Sku", sku).with("Qty", qty).into()
}

fn order() -> Value {
    let placed = DateTime::parse_from_rfc3339("2024-03-01T10:15:30+02:00").unwrap();
    Object::new("Shop.Order")
        .with("Id", 42i64)
        .with("Status", EnumValue::new("Shop.Status", "Shipped"))
        .with("Customer", "Ann")
        .with("Placed", placed)
        .with("Line", Value::List(vec![line("A-1", 2), line("B-7", 1)]))
        .with("Total", dec!(12.50))
        .into()
}

#[test]
fn test_person_example() -> Result<()> {
    let mappings = person_mappings()?;
    let person = Object::new("Acme.Person")
        .with("Id", 0)
        .with("Tags", Value::List(vec!["a".into(), "b".into()]));

    let xml = mappings.to_xml_string(&person.clone().into())?;
    assert_eq!(xml, "<Person><Tags><string>a</string><string>b</string></Tags></Person>");

    let read = mappings.from_xml_str(&xml)?;
    assert_eq!(read, Value::Object(person));
    Ok(())
}

#[test]
fn test_order_round_trip() -> Result<()> {
    let mappings = shop_mappings(MapperOptions::default())?;
    let xml = mappings.to_xml_string(&order())?;
    assert_eq!(
        xml,
        concat!(
            r#"<Order Id="42" Status="Shipped"><Customer>Ann</Customer>"#,
            r#"<Placed>2024-03-01T10:15:30+02:00</Placed>"#,
            r#"<Line Sku="A-1" Qty="2"/><Line Sku="B-7" Qty="1"/>"#,
            r#"<Total>12.50</Total></Order>"#
        )
    );
    assert_eq!(mappings.from_xml_str(&xml)?, order());
    Ok(())
}

#[test]
fn test_reserialization_is_byte_identical() -> Result<()> {
    let mappings = shop_mappings(MapperOptions::default().with_indent(2))?;
    let first = mappings.to_xml_string(&order())?;
    println!("XML output:\n{}", first);
    assert!(first.contains("\n  <Customer>Ann</Customer>"));

    let second = mappings.to_xml_string(&mappings.from_xml_str(&first)?)?;
    assert_eq!(first, second);
    Ok(())
}

#[test]
fn test_default_values_are_suppressed_and_restored() -> Result<()> {
    let mappings = shop_mappings(MapperOptions::default())?;
    let open = Object::new("Shop.Order")
        .with("Id", 1i64)
        .with("Status", EnumValue::new("Shop.Status", "Open"));
    let xml = mappings.to_xml_string(&open.clone().into())?;
    assert_eq!(xml, r#"<Order Id="1"/>"#);
    assert_eq!(mappings.from_xml_str(&xml)?, Value::Object(open));
    Ok(())
}

#[test]
fn test_escaped_text_survives() -> Result<()> {
    let mut schema = Schema::new();
    schema.declare(
        TypeDecl::object("Acme.Note")
            .default_constructor()
            .attribute("Title", SimpleType::String)
            .text("Body", SimpleType::String),
    );
    let mut mapper = Mapper::new(schema, MapperOptions::default());
    mapper.register("Acme.Note")?;
    let mappings = mapper.seal();

    let body = "tab\there\nline two e\u{301} <&>";
    let note = Object::new("Acme.Note")
        .with("Title", " padded ")
        .with("Body", body);
    let xml = mappings.to_xml_string(&note.clone().into())?;
    assert_eq!(
        xml,
        "<Note Title=\"\\spadded\\s\">tab\\there\\nline two e\u{301} &lt;&amp;&gt;</Note>"
    );
    assert_eq!(mappings.from_xml_str(&xml)?, Value::Object(note));
    Ok(())
}

#[test]
fn test_defaults_match_the_member_type() -> Result<()> {
    let mut schema = Schema::new();
    schema.declare(
        TypeDecl::object("Acme.Counter")
            .default_constructor()
            .member(MemberDecl::attribute("Id", SimpleType::I64).default_value(0))
            .element("Name", SimpleType::String),
    );
    let mut mapper = Mapper::new(schema, MapperOptions::default());
    mapper.register("Acme.Counter")?;
    let mappings = mapper.seal();

    let counter = Object::new("Acme.Counter").with("Id", 0i64).with("Name", "hits");
    let xml = mappings.to_xml_string(&counter.clone().into())?;
    assert_eq!(xml, "<Counter><Name>hits</Name></Counter>");
    assert_eq!(mappings.from_xml_str(&xml)?, Value::Object(counter));

    let empty = mappings.from_xml_str("<Counter/>")?;
    assert_eq!(
        empty.as_object().and_then(|o| o.get("Id")),
        Some(&Value::from(0i64))
    );
    Ok(())
}

#[test]
fn test_empty_text_member_is_kept() -> Result<()> {
    let mut schema = Schema::new();
    schema.declare(
        TypeDecl::object("Acme.Note")
            .default_constructor()
            .attribute("Lang", SimpleType::String)
            .text("Body", SimpleType::String),
    );
    let mut mapper = Mapper::new(schema, MapperOptions::default());
    mapper.register("Acme.Note")?;
    let mappings = mapper.seal();

    let blank = Object::new("Acme.Note").with("Lang", "en").with("Body", "");
    let xml = mappings.to_xml_string(&blank.clone().into())?;
    assert_eq!(xml, r#"<Note Lang="en"></Note>"#);
    assert_eq!(mappings.from_xml_str(&xml)?, Value::Object(blank));

    let absent = Object::new("Acme.Note").with("Lang", "en");
    let xml = mappings.to_xml_string(&absent.clone().into())?;
    assert_eq!(xml, r#"<Note Lang="en"/>"#);
    assert_eq!(mappings.from_xml_str(&xml)?, Value::Object(absent));
    Ok(())
}

#[test]
fn test_content_member_takes_runtime_tag() -> Result<()> {
    let mut schema = Schema::new();
    schema
        .declare(
            TypeDecl::object("Shop.Line")
                .default_constructor()
                .attribute("Sku", SimpleType::String)
                .attribute("Qty", SimpleType::I32),
        )
        .declare(
            TypeDecl::object("Shop.Envelope")
                .default_constructor()
                .attribute("Kind", SimpleType::String)
                .content("Payload", TypeRef::Any),
        );
    let mut mapper = Mapper::new(schema, MapperOptions::default());
    mapper.register_all()?;
    let mappings = mapper.seal();

    let envelope: Value = Object::new("Shop.Envelope")
        .with("Kind", "line")
        .with("Payload", line("C-3", 5))
        .into();
    let xml = mappings.to_xml_string(&envelope)?;
    assert!(xml.contains(r#"<Line Sku="C-3" Qty="5"/></Envelope>"#));
    assert_eq!(mappings.from_xml_str(&xml)?, envelope);
    Ok(())
}

#[test]
fn test_read_from_io() -> Result<()> {
    let mappings = person_mappings()?;
    let xml = b"<?xml version=\"1.0\"?>\n<!-- exported -->\n<Person Id=\"3\"><Tags/></Person>";
    let value = mappings.read_from(&xml[..])?;
    let expected = Object::new("Acme.Person")
        .with("Id", 3)
        .with("Tags", Value::List(Vec::new()));
    assert_eq!(value, Value::Object(expected));

    let mut out = Vec::new();
    mappings.write_to(&mut out, &value)?;
    assert_eq!(String::from_utf8(out).unwrap(), r#"<Person Id="3"><Tags/></Person>"#);
    Ok(())
}
