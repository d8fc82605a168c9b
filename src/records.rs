use crate::backend::{ColumnMeta, RawRow};
use serde_json::{Map, Number, Value};

/// One result row keyed by column name, in column order.
pub type Record = Map<String, Value>;

/// Zip rows with column names. Missing trailing cells become null.
pub fn to_records(columns: &[ColumnMeta], rows: &[RawRow]) -> Vec<Record> {
    rows.iter()
        .map(|row| {
            let mut record = Map::with_capacity(columns.len());
            for (i, col) in columns.iter().enumerate() {
                let cell = row.get(i).and_then(|c| c.as_deref());
                record.insert(col.name.clone(), decode_cell(&col.type_name, cell));
            }
            record
        })
        .collect()
}

/// Decode one `JSON_ARRAY` cell according to its column type.
///
/// Text that does not parse as the declared type is returned unchanged.
pub fn decode_cell(type_name: &str, cell: Option<&str>) -> Value {
    let Some(text) = cell else {
        return Value::Null;
    };

    let base = type_name
        .split(['(', '<', ' '])
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    let decoded = match base.as_str() {
        "INT" | "INTEGER" | "BIGINT" | "LONG" | "SMALLINT" | "SHORT" | "TINYINT" | "BYTE" => {
            text.parse::<i64>().ok().map(Value::from)
        }
        "FLOAT" | "DOUBLE" | "REAL" => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        "BOOLEAN" => match text {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        "ARRAY" | "MAP" | "STRUCT" => serde_json::from_str(text).ok(),
        _ => None,
    };

    decoded.unwrap_or_else(|| Value::String(text.to_string()))
}
