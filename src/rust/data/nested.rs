use serde_json::Value as JsonValue;

use super::pickle::PickleValue;

/// Capability view over a decoded, dynamically typed document.
///
/// The loader never guesses a value's shape from its type name. It asks two questions
/// instead: can this value be iterated as key/value pairs, and is it an ordered collection
/// of numbers. Each decoder the loader supports implements this trait once.
pub trait NestedValue {
    /// Key/value pairs in iteration order, or `None` if the value is not a mapping.
    fn entries(&self) -> Option<Vec<(String, &Self)>>;

    /// The values as `f64`, or `None` unless this is a sequence whose items are all numbers.
    fn numbers(&self) -> Option<Vec<f64>>;

    /// Short name of the value's kind, used in warnings and error messages.
    fn kind(&self) -> &'static str;
}

impl NestedValue for JsonValue {
    fn entries(&self) -> Option<Vec<(String, &Self)>> {
        self.as_object()
            .map(|map| map.iter().map(|(key, value)| (key.clone(), value)).collect())
    }

    fn numbers(&self) -> Option<Vec<f64>> {
        self.as_array()?.iter().map(JsonValue::as_f64).collect()
    }

    fn kind(&self) -> &'static str {
        match self {
            JsonValue::Null => "null",
            JsonValue::Bool(_) => "boolean",
            JsonValue::Number(_) => "number",
            JsonValue::String(_) => "string",
            JsonValue::Array(_) => "sequence",
            JsonValue::Object(_) => "mapping",
        }
    }
}

impl NestedValue for PickleValue {
    fn entries(&self) -> Option<Vec<(String, &Self)>> {
        match self {
            PickleValue::Dict(pairs) => Some(
                pairs
                    .iter()
                    .map(|(key, value)| (key_to_string(key), value))
                    .collect(),
            ),
            _ => None,
        }
    }

    fn numbers(&self) -> Option<Vec<f64>> {
        let items = match self {
            PickleValue::List(items) | PickleValue::Tuple(items) => items,
            PickleValue::Array(array) if array.ndim() == 1 => {
                return Some(array.iter().copied().collect())
            }
            _ => return None,
        };
        items
            .iter()
            .map(|item| match item {
                PickleValue::Int(n) => Some(*n as f64),
                PickleValue::Float(x) => Some(*x),
                _ => None,
            })
            .collect()
    }

    fn kind(&self) -> &'static str {
        match self {
            PickleValue::None => "None",
            PickleValue::Bool(_) => "bool",
            PickleValue::Int(_) => "int",
            PickleValue::Float(_) => "float",
            PickleValue::Bytes(_) => "bytes",
            PickleValue::Str(_) => "str",
            PickleValue::List(_) => "list",
            PickleValue::Tuple(_) => "tuple",
            PickleValue::Set(_) => "set",
            PickleValue::Dict(_) => "dict",
            PickleValue::Array(array) if array.ndim() == 1 => "ndarray",
            PickleValue::Array(_) => "multi-dimensional ndarray",
            PickleValue::Global { .. } => "class",
            PickleValue::Object { .. } => "object",
            PickleValue::MemoRef(_) => "memo reference",
        }
    }
}

fn key_to_string(key: &PickleValue) -> String {
    match key {
        PickleValue::Str(s) => s.clone(),
        PickleValue::Int(n) => n.to_string(),
        PickleValue::Float(x) => x.to_string(),
        PickleValue::Bool(b) => b.to_string(),
        PickleValue::Bytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        other => format!("{:?}", other),
    }
}
