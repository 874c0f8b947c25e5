use serde::{Deserialize, Serialize};

/// Configuration form description: field key -> JSON field schema.
///
/// The engine never interprets field schemas; it only merges them so a
/// generic settings form can be rendered from the result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSchema {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, key: impl Into<String>, schema: serde_json::Value) -> Self {
        self.fields.insert(key.into(), schema);
        self
    }

    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Layer `refinement` over `self`.
    ///
    /// A field present on both sides as a JSON object gets the refinement's
    /// keys written over the base keys; any other shape is replaced outright.
    pub fn merged_with(&self, refinement: &ConfigSchema) -> ConfigSchema {
        let mut fields = self.fields.clone();
        for (key, refined) in &refinement.fields {
            if let (Some(serde_json::Value::Object(base)), serde_json::Value::Object(over)) =
                (fields.get_mut(key), refined)
            {
                for (prop, value) in over {
                    base.insert(prop.clone(), value.clone());
                }
                continue;
            }
            fields.insert(key.clone(), refined.clone());
        }
        ConfigSchema { fields }
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for ConfigSchema {
    fn from(fields: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn step_refines_shared_action_field() {
        let action = ConfigSchema::new()
            .with_field("title", json!({ "type": "string", "title": "Table title", "x-component": "Input" }))
            .with_field("height", json!({ "type": "number" }));
        let step = ConfigSchema::new()
            .with_field("title", json!({ "title": "Heading" }))
            .with_field("color", json!({ "type": "string" }));

        let merged = action.merged_with(&step);

        assert_eq!(
            merged.field("title"),
            Some(&json!({ "type": "string", "title": "Heading", "x-component": "Input" }))
        );
        assert_eq!(merged.field("height"), Some(&json!({ "type": "number" })));
        assert_eq!(merged.field("color"), Some(&json!({ "type": "string" })));
        assert_eq!(action.field("title").and_then(|f| f.get("title")), Some(&json!("Table title")));
    }

    #[test]
    fn non_object_field_is_replaced() {
        let action = ConfigSchema::new().with_field("mode", json!(["a", "b"]));
        let step = ConfigSchema::new().with_field("mode", json!({ "enum": ["c"] }));

        assert_eq!(action.merged_with(&step).field("mode"), Some(&json!({ "enum": ["c"] })));
    }
}
