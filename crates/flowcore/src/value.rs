use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Step parameters: a flat, key-wise mergeable mapping
pub type Params = HashMap<String, Value>;

/// Per-instance overrides, keyed by flow key then step key
pub type StepParams = HashMap<String, HashMap<String, Params>>;

/// Dynamic value type for props and step parameters
///
/// Serialized untagged so persisted params and bundle files read as plain JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integral numbers only; `1.5` yields `None`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Field lookup on an object value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Human readable type name, used in parameter type errors
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

/// Shallow key-wise merge: later layers win per key.
///
/// Inputs are only borrowed, so merging never touches a registered definition.
pub fn merge_params<'a, I>(layers: I) -> Params
where
    I: IntoIterator<Item = &'a Params>,
{
    let mut merged = Params::new();
    for layer in layers {
        for (key, value) in layer {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<Params> for Value {
    fn from(map: Params) -> Self {
        Value::Object(map)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => Value::Array(arr.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(obj) => {
                Value::Object(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

/// Build a [`Params`] map from `key => value` pairs
#[macro_export]
macro_rules! params {
    () => { $crate::Params::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::Params::new();
        $( map.insert(($key).to_string(), $crate::Value::from($value)); )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn merge_is_shallow_and_ordered() {
        let action = params! { "a" => 1, "b" => 1 };
        let step = params! { "b" => 2 };
        let instance = params! { "b" => 3, "c" => 1 };
        let invocation = params! { "c" => 2 };

        let merged = merge_params([&action, &step, &instance, &invocation]);

        assert_eq!(merged, params! { "a" => 1, "b" => 3, "c" => 2 });
        assert_eq!(step, params! { "b" => 2 });
    }

    #[test]
    fn nested_objects_are_replaced_not_merged() {
        let base = params! { "pagination" => params! { "page" => 1, "size" => 10 } };
        let top = params! { "pagination" => params! { "page" => 2 } };

        let merged = merge_params([&base, &top]);

        assert_eq!(merged["pagination"], Value::from(params! { "page" => 2 }));
    }

    #[test]
    fn untagged_json_round_trip() {
        let json = serde_json::json!({ "fields": ["id", "name"], "height": 300, "visible": true });
        let value: Value = serde_json::from_value(json.clone()).unwrap();

        assert_eq!(value.get("height").and_then(Value::as_i64), Some(300));
        assert_eq!(value, Value::from(json));
    }
}
