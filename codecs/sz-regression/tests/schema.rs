#![expect(missing_docs)]

use ::{
    log as _, ndarray as _, ndarray_rand as _, numcodecs as _, postcard as _, serde as _,
    simple_logger as _, thiserror as _,
};

use numcodecs_sz_regression::SzRegressionCodec;
use schemars::schema_for;
use serde_json::Value;

fn property<'a>(schema: &'a Value, name: &str) -> &'a Value {
    let property = schema
        .pointer(&format!("/properties/{name}"))
        .unwrap_or(&Value::Null);

    match property
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|reference| reference.strip_prefix('#'))
    {
        Some(pointer) => schema.pointer(pointer).unwrap_or(&Value::Null),
        None => property,
    }
}

#[test]
fn schema() {
    let schema = schema_for!(SzRegressionCodec).to_value();

    assert_eq!(schema.get("required"), Some(&serde_json::json!(["eb_abs"])));
    assert_eq!(
        schema.get("additionalProperties"),
        Some(&Value::Bool(false))
    );

    let precision = property(&schema, "eb_abs");
    assert_eq!(
        precision.get("exclusiveMinimum").and_then(Value::as_f64),
        Some(0.0),
        "{precision:#}"
    );

    let block_size = property(&schema, "block_size");
    assert_eq!(
        block_size.get("minimum").and_then(Value::as_f64),
        Some(2.0),
        "{block_size:#}"
    );
    assert_eq!(
        block_size.get("maximum").and_then(Value::as_f64),
        Some(64.0),
        "{block_size:#}"
    );

    for name in ["intervals", "size_type"] {
        assert!(
            schema.pointer(&format!("/properties/{name}")).is_some(),
            "{name} is missing from the schema"
        );
    }
}
