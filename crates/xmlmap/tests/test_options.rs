use std::sync::Arc;
use std::thread;

use rust_decimal_macros::dec;
use xmlmap::{
    EnumValue, MapError, Mapper, MapperOptions, Mappings, NameCase, Object, Result, Schema,
    SimpleType, TypeDecl, TypeRef, Value,
};

fn person_schema() -> Schema {
    let mut schema = Schema::new();
    schema
        .declare(TypeDecl::enumeration("Hr.Color", ["Red", "Green"]))
        .declare(
            TypeDecl::object("Hr.Person")
                .default_constructor()
                .attribute("BirthYear", SimpleType::I32)
                .attribute("FavoriteColor", "Hr.Color")
                .element("FirstName", SimpleType::String)
                .element("Salary", SimpleType::Decimal)
                .element("Nicknames", TypeRef::list(SimpleType::String)),
        );
    schema
}

fn seal(options: MapperOptions) -> Result<Mappings> {
    let mut mapper = Mapper::new(person_schema(), options);
    mapper.register("Hr.Person")?;
    Ok(mapper.seal())
}

#[test]
fn test_options_from_json() -> Result<()> {
    let options = MapperOptions::from_json_str(
        r#"{
            "attributeCase": "kebab",
            "elementCase": "camel",
            "xmlDeclaration": true,
            "culture": { "decimalSeparator": "," }
        }"#,
    )?;
    assert_eq!(options.attribute_case, NameCase::Kebab);
    assert!(!options.ignore_unknown);
    assert!(options.nil_markers);

    let mappings = seal(options)?;
    let person: Value = Object::new("Hr.Person")
        .with("BirthYear", 1990)
        .with("FirstName", "Ann")
        .with("Salary", dec!(1200.50))
        .into();
    let xml = mappings.to_xml_string(&person)?;
    assert_eq!(
        xml,
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<Person birth-year="1990"><firstName>Ann</firstName>"#,
            r#"<salary>1200,50</salary></Person>"#
        )
    );
    assert_eq!(mappings.from_xml_str(&xml)?, person);
    Ok(())
}

#[test]
fn test_invalid_options_document() {
    let err = MapperOptions::from_json_str(r#"{ "elementCase": "shouting" }"#).unwrap_err();
    assert!(matches!(err, MapError::Options(_)));
}

#[test]
fn test_enum_case_sensitivity() -> Result<()> {
    let xml = r#"<Person FavoriteColor="green"/>"#;
    let strict = seal(MapperOptions::default())?;
    assert!(matches!(strict.from_xml_str(xml).unwrap_err(), MapError::Conversion(_)));

    let lenient = seal(MapperOptions {
        enum_case_insensitive: true,
        ..MapperOptions::default()
    })?;
    let value = lenient.from_xml_str(xml)?;
    assert_eq!(
        value.as_object().and_then(|o| o.get("FavoriteColor")),
        Some(&Value::from(EnumValue::new("Hr.Color", "Green")))
    );
    Ok(())
}

#[test]
fn test_sealed_mappings_are_shared_across_threads() -> Result<()> {
    let mappings = Arc::new(seal(MapperOptions::default())?);
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let mappings = Arc::clone(&mappings);
            thread::spawn(move || -> Result<Value> {
                let person: Value = Object::new("Hr.Person")
                    .with("BirthYear", 1980 + i)
                    .with(
                        "Nicknames",
                        Value::List((0..i).map(|n| Value::from(format!("n{n}"))).collect()),
                    )
                    .into();
                let xml = mappings.to_xml_string(&person)?;
                let read = mappings.from_xml_str(&xml)?;
                assert_eq!(read, person);
                Ok(read)
            })
        })
        .collect();

    for handle in handles {
        let value = handle.join().expect("thread panicked")?;
        assert!(value.as_object().is_some_and(|o| o.contains("BirthYear")));
    }
    Ok(())
}
