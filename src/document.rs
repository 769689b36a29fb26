//! Helpers over the CBOR document model.
//!
//! A document is a `Value::Map` whose keys are text. Lookups compare text keys
//! only; entries with non-text keys are never addressed by a field name.

use ciborium::Value;

/// Key under which documents carry their identifier.
pub const ID_KEY: &str = "_id";

/// Short name of a value's shape, for error messages.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Integer(_) => "integer",
        Value::Float(_) => "float",
        Value::Text(_) => "text",
        Value::Bytes(_) => "binary",
        Value::Array(_) => "list",
        Value::Map(_) => "map",
        Value::Tag(_, _) => "tagged value",
        _ => "unknown",
    }
}

/// The value stored under `key`, if `doc` is a map holding it.
pub fn get<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    match doc {
        Value::Map(entries) => entries
            .iter()
            .find(|(k, _)| matches!(k, Value::Text(text) if text == key))
            .map(|(_, v)| v),
        _ => None,
    }
}

/// Mutable lookup over map entries.
pub fn get_mut<'a>(entries: &'a mut [(Value, Value)], key: &str) -> Option<&'a mut Value> {
    entries
        .iter_mut()
        .find(|(k, _)| matches!(k, Value::Text(text) if text == key))
        .map(|(_, v)| v)
}

/// Render a map key as a path segment.
pub fn key_segment(key: &Value) -> String {
    match key {
        Value::Text(text) => text.clone(),
        Value::Integer(int) => i128::from(*int).to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => format!("{other:?}"),
    }
}

/// The document's `_id`, cloned for error reporting.
pub fn document_id(doc: &Value) -> Option<Value> {
    get(doc, ID_KEY).cloned()
}

/// Build a document from text keys, preserving order.
pub fn doc<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::Text(k.into()), v))
            .collect(),
    )
}
