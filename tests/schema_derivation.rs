use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use structured_json_output::validation::validate;
use structured_json_output::{FieldType, Schema, ViolationKind};

#[derive(Debug, Deserialize, JsonSchema)]
struct Address {
    /// city name
    city: String,
    postcode: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct Contact {
    /// full name
    name: String,
    age: u32,
    vip: bool,
    score: f64,
    emails: Vec<String>,
    address: Address,
    nickname: Option<String>,
    previous: Vec<Address>,
}

#[test]
fn derived_schema_maps_rust_types() {
    let schema = Schema::for_type::<Contact>().unwrap();

    let ty = |name: &str| schema.field(name).unwrap().field_type().clone();
    assert_eq!(ty("name"), FieldType::String);
    assert_eq!(ty("age"), FieldType::Integer);
    assert_eq!(ty("vip"), FieldType::Boolean);
    assert_eq!(ty("score"), FieldType::Number);
    assert_eq!(ty("emails"), FieldType::array_of(FieldType::String));
    assert_eq!(ty("nickname"), FieldType::String);

    assert_eq!(schema.field("name").unwrap().description(), Some("full name"));
    assert!(schema.field("name").unwrap().is_required());
    assert!(!schema.field("nickname").unwrap().is_required());

    match ty("address") {
        FieldType::Object(Some(nested)) => {
            assert_eq!(nested.field("city").unwrap().description(), Some("city name"));
            assert!(!nested.field("postcode").unwrap().is_required());
        }
        other => panic!("expected nested object, got {other:?}"),
    }
    match ty("previous") {
        FieldType::Array(Some(item)) => assert!(matches!(*item, FieldType::Object(Some(_)))),
        other => panic!("expected array of objects, got {other:?}"),
    }
}

#[test]
fn derived_schema_validates_nested_values() {
    let schema = Schema::for_type::<Contact>().unwrap();
    let value = json!({
        "name": "Ada",
        "age": 36,
        "vip": "yes",
        "score": 9.5,
        "emails": ["ada@example.com"],
        "address": {"postcode": "N1"},
        "previous": [{"city": "London"}, {"city": 7}]
    });

    let violations = validate(&schema, &value);
    let messages: Vec<String> = violations.iter().map(ToString::to_string).collect();
    assert_eq!(
        messages,
        vec![
            "field 'vip' expected boolean, got string",
            "field 'address.city' missing",
            "field 'previous[1].city' expected string, got number",
        ]
    );
    assert!(violations
        .iter()
        .all(|v| v.kind() != ViolationKind::Parse));
}

#[test]
fn exported_json_schema_agrees_with_validation() {
    let schema = Schema::builder()
        .field("setup", FieldType::String, "question to set up a joke")
        .field("punchline", FieldType::String, "answer to resolve the joke")
        .optional_field("rating", FieldType::Integer, "")
        .build()
        .unwrap();
    let exported = schema.to_json_schema();
    let validator = jsonschema::validator_for(&exported).unwrap();

    let cases = [
        json!({"setup": "a", "punchline": "b"}),
        json!({"setup": "a", "punchline": "b", "extra": true}),
        json!({"setup": "a"}),
        json!({"setup": "a", "punchline": 3}),
        json!({"setup": "a", "punchline": "b", "rating": 4}),
        json!({"setup": "a", "punchline": "b", "rating": "four"}),
    ];
    for case in cases {
        assert_eq!(
            validator.is_valid(&case),
            validate(&schema, &case).is_empty(),
            "disagreement on {case}"
        );
    }
}

#[test]
fn round_trip_through_json_schema_keeps_fields() {
    let original = Schema::for_type::<Contact>().unwrap();
    let reparsed = Schema::from_json_schema(&original.to_json_schema()).unwrap();
    assert_eq!(original.fields(), reparsed.fields());
}
