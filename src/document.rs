use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::value::Value;

/// An unordered mapping from field name to [`Value`].
///
/// Documents are immutable inputs to pipeline stages; stages build new
/// documents rather than mutating what they were given.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(value: &JsonValue) -> Result<Self> {
        match value {
            JsonValue::Object(map) => Ok(map
                .iter()
                .map(|(k, v)| (k.clone(), Value::from_json(v)))
                .collect()),
            _ => Err(Error::InvalidArgument(
                "document must be a JSON object".into(),
            )),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        JsonValue::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Resolve a field path with dot notation: `"company.location.country"`.
    ///
    /// A path segment that is a decimal integer indexes into an array, so
    /// `"tags.1"` is the second tag. Any segment that cannot be resolved
    /// (missing field, index on a non-array, out-of-range index) yields
    /// `Value::Absent`.
    pub fn get(&self, path: &str) -> Value {
        let mut parts = path.split('.');
        let Some(first) = parts.next() else {
            return Value::Absent;
        };
        let Some(mut current) = self.fields.get(first) else {
            return Value::Absent;
        };
        for part in parts {
            let next = match current {
                Value::Object(doc) => doc.fields.get(part),
                Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            match next {
                Some(v) => current = v,
                None => return Value::Absent,
            }
        }
        current.clone()
    }

    /// Write a field path, creating intermediate objects as needed. A
    /// non-object intermediate is replaced. Writing `Value::Absent` removes
    /// the target field.
    pub fn set(&mut self, path: &str, value: Value) {
        let mut parts: Vec<&str> = path.split('.').collect();
        let Some(last) = parts.pop() else { return };

        let mut fields = &mut self.fields;
        for part in parts {
            let entry = fields
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !matches!(entry, Value::Object(_)) {
                *entry = Value::Object(Document::new());
            }
            let Value::Object(doc) = entry else { return };
            fields = &mut doc.fields;
        }
        if value.is_absent() {
            fields.remove(last);
        } else {
            fields.insert(last.to_string(), value);
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(json: JsonValue) -> Document {
        Document::from_json(&json).unwrap()
    }

    #[test]
    fn get_top_level() {
        let d = doc(json!({"name": "Alice", "age": 30}));
        assert_eq!(d.get("name"), Value::Text("Alice".into()));
        assert_eq!(d.get("age"), Value::Int(30));
    }

    #[test]
    fn get_nested_dot_notation() {
        let d = doc(json!({"company": {"location": {"country": "USA"}}}));
        assert_eq!(
            d.get("company.location.country"),
            Value::Text("USA".into())
        );
    }

    #[test]
    fn get_missing_returns_absent() {
        let d = doc(json!({"name": "Alice"}));
        assert_eq!(d.get("missing"), Value::Absent);
        assert_eq!(d.get("name.deeper"), Value::Absent);
    }

    #[test]
    fn get_array_index() {
        let d = doc(json!({"tags": ["enim", "ad", "velit"]}));
        assert_eq!(d.get("tags.1"), Value::Text("ad".into()));
        assert_eq!(d.get("tags.0"), Value::Text("enim".into()));
    }

    #[test]
    fn get_array_index_out_of_range() {
        let d = doc(json!({"tags": ["enim"]}));
        assert_eq!(d.get("tags.5"), Value::Absent);
    }

    #[test]
    fn get_index_on_non_array() {
        let d = doc(json!({"name": "Alice"}));
        assert_eq!(d.get("name.1"), Value::Absent);
    }

    #[test]
    fn present_null_is_not_absent() {
        let d = doc(json!({"tags": null}));
        assert_eq!(d.get("tags"), Value::Null);
    }

    #[test]
    fn set_top_level() {
        let mut d = doc(json!({"a": 1}));
        d.set("b", Value::Int(2));
        assert_eq!(d.to_json(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn set_nested_creates_objects() {
        let mut d = Document::new();
        d.set("a.b.c", Value::Int(1));
        assert_eq!(d.to_json(), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn set_absent_removes_field() {
        let mut d = doc(json!({"a": 1, "b": 2}));
        d.set("b", Value::Absent);
        assert_eq!(d.to_json(), json!({"a": 1}));
    }

    #[test]
    fn set_overwrites() {
        let mut d = doc(json!({"status": "old"}));
        d.set("status", Value::Text("new".into()));
        assert_eq!(d.get("status"), Value::Text("new".into()));
    }

    #[test]
    fn from_json_rejects_non_object() {
        assert!(Document::from_json(&json!([1, 2])).is_err());
        assert!(Document::from_json(&json!("nope")).is_err());
    }
}
