use serde_json::{Value, json};
use tableport::backend::ColumnMeta;
use tableport::records::{decode_cell, to_records};

#[test]
fn test_records_keep_column_order() {
    let columns = vec![
        ColumnMeta::new("zeta", "STRING"),
        ColumnMeta::new("alpha", "INT"),
    ];
    let rows = vec![vec![Some("z".to_string()), Some("1".to_string())]];
    let records = to_records(&columns, &rows);

    let keys: Vec<_> = records[0].keys().cloned().collect();
    assert_eq!(keys, vec!["zeta", "alpha"]);
    assert_eq!(Value::Object(records[0].clone()), json!({ "zeta": "z", "alpha": 1 }));
}

#[test]
fn test_short_rows_fill_with_null() {
    let columns = vec![ColumnMeta::new("a", "INT"), ColumnMeta::new("b", "INT")];
    let rows = vec![vec![Some("1".to_string())]];
    let records = to_records(&columns, &rows);
    assert_eq!(records[0]["b"], Value::Null);
}

#[test]
fn test_decode_scalar_types() {
    assert_eq!(decode_cell("INT", Some("42")), json!(42));
    assert_eq!(decode_cell("bigint", Some("-7")), json!(-7));
    assert_eq!(decode_cell("DOUBLE", Some("2.5")), json!(2.5));
    assert_eq!(decode_cell("BOOLEAN", Some("true")), json!(true));
    assert_eq!(decode_cell("STRING", Some("42")), json!("42"));
    assert_eq!(decode_cell("INT", None), Value::Null);
}

#[test]
fn test_decimal_and_timestamps_stay_text() {
    assert_eq!(decode_cell("DECIMAL(38,2)", Some("12.30")), json!("12.30"));
    assert_eq!(
        decode_cell("TIMESTAMP", Some("2024-01-01T00:00:00.000Z")),
        json!("2024-01-01T00:00:00.000Z")
    );
}

#[test]
fn test_complex_types_parse_as_json() {
    assert_eq!(decode_cell("ARRAY<INT>", Some("[1,2]")), json!([1, 2]));
    assert_eq!(
        decode_cell("STRUCT<a: INT>", Some(r#"{"a":1}"#)),
        json!({ "a": 1 })
    );
}

#[test]
fn test_unparseable_values_fall_back_to_text() {
    assert_eq!(decode_cell("INT", Some("NaN")), json!("NaN"));
    assert_eq!(decode_cell("DOUBLE", Some("Infinity")), json!("Infinity"));
    assert_eq!(decode_cell("ARRAY<INT>", Some("not json")), json!("not json"));
}
